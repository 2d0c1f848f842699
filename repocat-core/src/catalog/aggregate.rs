//! Grouping verified records into catalogs

use plist::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::metadata::MetadataRecord;
use crate::report::{DiagnosticKind, ErrorReport};

/// Name of the catalog that holds every included record
pub const ALL_CATALOG: &str = "all";

/// A loaded record together with its verification verdict.
#[derive(Debug, Clone)]
pub struct VerifiedRecord {
    pub reference: String,
    pub record: MetadataRecord,
    pub passed: bool,
}

/// Catalog name to records, in name order.
///
/// Records keep the order they were inserted in.
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    catalogs: BTreeMap<String, Vec<MetadataRecord>>,
}

impl CatalogSet {
    /// An empty set that already contains `all`.
    pub fn new() -> Self {
        let mut catalogs = BTreeMap::new();
        catalogs.insert(ALL_CATALOG.to_string(), Vec::new());
        Self { catalogs }
    }

    fn insert(&mut self, catalog: &str, record: &MetadataRecord) {
        self.catalogs
            .entry(catalog.to_string())
            .or_default()
            .push(record.clone());
    }

    pub fn get(&self, name: &str) -> Option<&[MetadataRecord]> {
        self.catalogs.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MetadataRecord])> {
        self.catalogs
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Names of the catalogs that have at least one record.
    ///
    /// Only these get written, so only these survive pruning.
    pub fn populated_names(&self) -> BTreeSet<String> {
        self.catalogs
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Build the catalog set from verified records.
///
/// Records that failed verification are dropped unless `force` is set.
/// Names that collide case-insensitively produce a single warning; both
/// catalogs are kept.
pub fn aggregate(records: &[VerifiedRecord], force: bool, report: &mut ErrorReport) -> CatalogSet {
    let mut set = CatalogSet::new();

    for item in records.iter().filter(|item| item.passed || force) {
        set.insert(ALL_CATALOG, &item.record);

        let declared = match item.record.get("catalogs") {
            None => continue,
            Some(Value::Array(declared)) => declared,
            Some(_) => {
                report.push(
                    DiagnosticKind::Malformed,
                    format!("WARNING: {} has a catalogs field that is not an array", item.reference),
                );
                continue;
            }
        };

        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(ALL_CATALOG);
        for entry in declared {
            match entry.as_string() {
                Some("") => report.push(
                    DiagnosticKind::Malformed,
                    format!("WARNING: {} has an empty catalog name!", item.reference),
                ),
                Some(name) => {
                    if seen.insert(name) {
                        set.insert(name, &item.record);
                    }
                }
                None => report.push(
                    DiagnosticKind::Malformed,
                    format!("WARNING: {} has a catalog name that is not a string", item.reference),
                ),
            }
        }
    }

    let collisions = case_collisions(set.catalogs.keys().map(String::as_str));
    if !collisions.is_empty() {
        report.push(
            DiagnosticKind::Anomaly,
            format!(
                "WARNING: There are catalogs with names that differ only by case. \
                 This may cause issues depending on the case-sensitivity of the \
                 underlying filesystem: {}",
                collisions.join(", ")
            ),
        );
    }

    set
}

/// Names that equal at least one other, distinct name when lower-cased.
pub fn case_collisions<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut groups: BTreeMap<String, BTreeSet<&'a str>> = BTreeMap::new();
    for name in names {
        groups.entry(name.to_lowercase()).or_default().insert(name);
    }
    groups
        .into_values()
        .filter(|group| group.len() > 1)
        .flatten()
        .map(str::to_string)
        .collect()
}
