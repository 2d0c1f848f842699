//! Icon content hashing
//!
//! Clients compare these digests against their cached copies to decide
//! whether an icon needs downloading again. Uses SHA-256.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::report::{Diagnostic, DiagnosticKind};
use crate::store::{is_hidden, join_key, ObjectStore, ICONS};

/// Identifier of the manifest itself, relative to `icons/`
pub const ICON_HASHES_MANIFEST: &str = "_icon_hashes.plist";

/// Icon identifier to lowercase hex digest, sorted by identifier.
pub type IconHashes = BTreeMap<String, String>;

/// Hash of one icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconHash {
    pub identifier: String,
    pub digest: String,
}

/// Whether an `icons/` identifier should be hashed at all.
pub fn should_hash(identifier: &str) -> bool {
    identifier != ICON_HASHES_MANIFEST && !is_hidden(identifier)
}

/// SHA-256 of `data` as lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fetch `icons/<identifier>` and hash it.
pub async fn hash_icon(store: &dyn ObjectStore, identifier: &str) -> Result<IconHash, Diagnostic> {
    let key = join_key(ICONS, identifier);
    let data = store.get(&key).await.map_err(|e| Diagnostic {
        kind: if e.is_not_found() {
            DiagnosticKind::NotFound
        } else {
            DiagnosticKind::Store
        },
        message: format!("WARNING: could not read icon {identifier}: {e}"),
    })?;

    Ok(IconHash {
        identifier: identifier.to_string(),
        digest: hash_bytes(&data),
    })
}
