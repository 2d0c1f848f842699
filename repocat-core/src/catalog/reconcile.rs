//! Removing catalogs that no longer have members

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::output::OutputSink;
use crate::report::{DiagnosticKind, ErrorReport};
use crate::store::{is_hidden, join_key, ObjectStore, CATALOGS};

/// Catalog names published by an earlier build.
///
/// A listing failure means "nothing published yet"; it is logged, never
/// reported as a build problem.
pub async fn previous_catalogs(store: &dyn ObjectStore) -> BTreeSet<String> {
    match store.list(CATALOGS).await {
        Ok(names) => names.into_iter().filter(|n| !is_hidden(n)).collect(),
        Err(e) if e.is_not_found() => {
            debug!("No catalogs published yet");
            BTreeSet::new()
        }
        Err(e) => {
            warn!("Could not list existing catalogs, skipping prune: {}", e);
            BTreeSet::new()
        }
    }
}

/// Delete every previously published catalog missing from `current`.
///
/// Returns the names that were actually deleted.
pub async fn prune_catalogs(
    store: &dyn ObjectStore,
    current: &BTreeSet<String>,
    report: &mut ErrorReport,
    sink: &dyn OutputSink,
) -> Vec<String> {
    let previous = previous_catalogs(store).await;
    let mut deleted = Vec::new();

    for name in previous.difference(current) {
        let key = join_key(CATALOGS, name);
        match store.delete(&key).await {
            Ok(()) => {
                sink.output(&format!("Removed {key}..."));
                deleted.push(name.clone());
            }
            Err(e) if e.is_not_found() => {
                debug!("Catalog {} already gone", key);
            }
            Err(e) => report.push(
                DiagnosticKind::Store,
                format!("WARNING: could not remove stale catalog {key}: {e}"),
            ),
        }
    }

    deleted
}
