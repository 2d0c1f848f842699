//! Persisting catalogs and the icon-hash manifest

use bytes::Bytes;
use plist::{Dictionary, Value};

use super::CatalogSet;
use crate::icons::{IconHashes, ICON_HASHES_MANIFEST};
use crate::metadata::MetadataRecord;
use crate::output::OutputSink;
use crate::report::{DiagnosticKind, ErrorReport, WrittenCatalog};
use crate::store::{join_key, ObjectStore, CATALOGS, ICONS};

/// Full key of the icon-hash manifest
pub const ICON_HASHES_KEY: &str = "icons/_icon_hashes.plist";

/// Serialize a catalog as an XML property-list array.
pub fn serialize_catalog(records: &[MetadataRecord]) -> Result<Vec<u8>, plist::Error> {
    let array = Value::Array(records.iter().cloned().map(Value::Dictionary).collect());
    let mut buffer = Vec::new();
    array.to_writer_xml(&mut buffer)?;
    Ok(buffer)
}

/// Serialize icon hashes as an XML property-list dictionary.
pub fn serialize_icon_hashes(hashes: &IconHashes) -> Result<Vec<u8>, plist::Error> {
    let mut dict = Dictionary::new();
    for (identifier, digest) in hashes {
        dict.insert(identifier.clone(), Value::String(digest.clone()));
    }
    let mut buffer = Vec::new();
    Value::Dictionary(dict).to_writer_xml(&mut buffer)?;
    Ok(buffer)
}

/// Write every non-empty catalog to `catalogs/<name>`.
///
/// Empty catalogs are reported instead of written. Serialization and store
/// failures are reported and the remaining catalogs are still written.
pub async fn write_catalogs(
    store: &dyn ObjectStore,
    catalogs: &CatalogSet,
    report: &mut ErrorReport,
    sink: &dyn OutputSink,
) -> Vec<WrittenCatalog> {
    let mut written = Vec::new();

    for (name, records) in catalogs.iter() {
        let key = join_key(CATALOGS, name);
        if records.is_empty() {
            report.push(
                DiagnosticKind::Anomaly,
                format!("WARNING: Did not create catalog {name} because it is empty"),
            );
            continue;
        }

        let data = match serialize_catalog(records) {
            Ok(data) => data,
            Err(e) => {
                report.push(
                    DiagnosticKind::Malformed,
                    format!("WARNING: could not serialize catalog {name}: {e}"),
                );
                continue;
            }
        };

        match store.put(&key, Bytes::from(data)).await {
            Ok(()) => {
                sink.output(&format!("Created {key}..."));
                written.push(WrittenCatalog {
                    name: name.to_string(),
                    records: records.len(),
                });
            }
            Err(e) => report.push(
                DiagnosticKind::Store,
                format!("WARNING: could not write {key}: {e}"),
            ),
        }
    }

    written
}

/// Write the icon-hash manifest, if there is anything in it.
///
/// Returns whether the manifest was written.
pub async fn write_icon_hashes(
    store: &dyn ObjectStore,
    hashes: &IconHashes,
    report: &mut ErrorReport,
    sink: &dyn OutputSink,
) -> bool {
    if hashes.is_empty() {
        return false;
    }

    let key = join_key(ICONS, ICON_HASHES_MANIFEST);
    let data = match serialize_icon_hashes(hashes) {
        Ok(data) => data,
        Err(e) => {
            report.push(
                DiagnosticKind::Malformed,
                format!("WARNING: could not serialize icon hashes: {e}"),
            );
            return false;
        }
    };

    match store.put(&key, Bytes::from(data)).await {
        Ok(()) => {
            sink.output(&format!("Created {key}..."));
            true
        }
        Err(e) => {
            report.push(
                DiagnosticKind::Store,
                format!("WARNING: could not write {key}: {e}"),
            );
            false
        }
    }
}
