//! Metadata (pkginfo) loading
//!
//! A pkginfo is a property list whose root is a dictionary. Admin-only
//! fields (`notes` and anything starting with `_`) are stripped on load so
//! they can never reach a published catalog.

use plist::{Dictionary, Value};
use std::io::Cursor;

use crate::report::{Diagnostic, DiagnosticKind};
use crate::store::{join_key, ObjectStore, PKGSINFO};

/// A single pkginfo, as an ordered field map.
pub type MetadataRecord = Dictionary;

/// Field holding free-form admin notes
pub const NOTES_FIELD: &str = "notes";

/// A pkginfo that loaded and parsed.
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    /// Identifier relative to `pkgsinfo/`
    pub reference: String,
    pub record: MetadataRecord,
    /// Set when the record has no `name`
    pub warning: Option<Diagnostic>,
}

/// Fetch, parse and sanitize `pkgsinfo/<identifier>`.
///
/// Failures are returned as a diagnostic for the report; they never abort
/// the build.
pub async fn load_pkginfo(
    store: &dyn ObjectStore,
    identifier: &str,
) -> Result<LoadedRecord, Diagnostic> {
    let key = join_key(PKGSINFO, identifier);
    let data = store.get(&key).await.map_err(|e| Diagnostic {
        kind: if e.is_not_found() {
            DiagnosticKind::NotFound
        } else {
            DiagnosticKind::Store
        },
        message: format!("WARNING: could not read {identifier}: {e}"),
    })?;

    let mut record = parse_record(&data).map_err(|reason| Diagnostic {
        kind: DiagnosticKind::Malformed,
        message: format!("WARNING: could not parse {identifier}: {reason}"),
    })?;
    sanitize(&mut record);

    let warning = if record_name(&record).is_none() {
        Some(Diagnostic {
            kind: DiagnosticKind::Malformed,
            message: format!("WARNING: {identifier} is missing name"),
        })
    } else {
        None
    };

    Ok(LoadedRecord {
        reference: identifier.to_string(),
        record,
        warning,
    })
}

/// Parse an XML or binary property list into a record.
pub fn parse_record(data: &[u8]) -> Result<MetadataRecord, String> {
    let value = Value::from_reader(Cursor::new(data)).map_err(|e| e.to_string())?;
    value
        .into_dictionary()
        .ok_or_else(|| "root object is not a dictionary".to_string())
}

/// Remove admin-only fields in place.
pub fn sanitize(record: &mut MetadataRecord) {
    let private: Vec<String> = record
        .keys()
        .filter(|key| key.as_str() == NOTES_FIELD || key.starts_with('_'))
        .cloned()
        .collect();
    for key in private {
        record.remove(&key);
    }
}

/// The record's `name`, when present and a string.
pub fn record_name(record: &MetadataRecord) -> Option<&str> {
    record.get("name").and_then(Value::as_string)
}
