//! Object store abstraction
//!
//! A repository is a flat, key-addressed blob store. Keys are `/`-separated
//! and conventionally start with a kind (`pkgsinfo`, `pkgs`, `icons`,
//! `catalogs`). Listing a kind returns identifiers relative to that kind,
//! so `pkgsinfo/apps/Firefox.plist` lists as `apps/Firefox.plist`.
//!
//! Backends:
//! - [`FilesystemStore`]: a directory tree on local disk
//! - [`MemoryStore`]: an in-process map, for tests and dry runs

mod filesystem;
mod memory;

pub use filesystem::FilesystemStore;
pub use memory::{InjectedFault, MemoryStore};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// Metadata descriptors
pub const PKGSINFO: &str = "pkgsinfo";
/// Installer and uninstaller payloads
pub const PKGS: &str = "pkgs";
/// Icon assets and the icon-hash manifest
pub const ICONS: &str = "icons";
/// Published catalogs
pub const CATALOGS: &str = "catalogs";

/// Key-addressed blob storage.
///
/// Implementations must be usable from many tasks at once; the build
/// fans out `get` calls across a bounded worker pool.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List identifiers under `kind`, relative to it.
    ///
    /// Fails with [`StoreError::NotFound`] if the kind itself is absent.
    async fn list(&self, kind: &str) -> StoreResult<Vec<String>>;

    /// Fetch the full content of `key`.
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Store `data` at `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;
}

/// Join a kind and a relative identifier into a full key.
pub fn join_key(kind: &str, identifier: &str) -> String {
    format!("{kind}/{identifier}")
}

/// Last `/`-separated segment of a key or identifier.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Whether an identifier points at a hidden file such as `.DS_Store`.
pub fn is_hidden(identifier: &str) -> bool {
    basename(identifier).starts_with('.')
}

/// Reject keys that could escape the repository root.
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(format!(
            "absolute or backslash path not allowed: {key}"
        )));
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(StoreError::InvalidKey(format!(
            "contains unsafe path segment: {key}"
        )));
    }
    Ok(())
}
