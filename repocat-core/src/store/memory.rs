//! In-memory object store.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use super::{validate_key, ObjectStore};
use crate::error::{StoreError, StoreResult};

/// Which kind of error an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    NotFound,
    Connectivity,
}

impl InjectedFault {
    fn to_error(self, target: &str) -> StoreError {
        match self {
            InjectedFault::NotFound => StoreError::NotFound(target.to_string()),
            InjectedFault::Connectivity => {
                StoreError::Connectivity(format!("injected failure for {target}"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    List,
    Get,
    Put,
    Delete,
}

/// Object store backed by a sorted map.
///
/// A kind counts as present once any object lives under it, or after
/// [`MemoryStore::create_kind`]. Faults can be injected per operation and
/// target to exercise failure paths.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
    kinds: RwLock<Vec<String>>,
    faults: RwLock<HashMap<(Op, String), InjectedFault>>,
    deletes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object without going through the async trait.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(key.into(), data.into());
        }
    }

    /// Mark a kind as present even when it holds no objects.
    pub fn create_kind(&self, kind: &str) {
        if let Ok(mut kinds) = self.kinds.write() {
            if !kinds.iter().any(|k| k == kind) {
                kinds.push(kind.to_string());
            }
        }
    }

    /// Snapshot of an object's content.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().ok()?.get(key).cloned()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys passed to `delete`, in call order, whether or not they existed.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.deletes.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn fail_list(&self, kind: &str, fault: InjectedFault) {
        self.inject(Op::List, kind, fault);
    }

    pub fn fail_get(&self, key: &str, fault: InjectedFault) {
        self.inject(Op::Get, key, fault);
    }

    pub fn fail_put(&self, key: &str, fault: InjectedFault) {
        self.inject(Op::Put, key, fault);
    }

    pub fn fail_delete(&self, key: &str, fault: InjectedFault) {
        self.inject(Op::Delete, key, fault);
    }

    fn inject(&self, op: Op, target: &str, fault: InjectedFault) {
        if let Ok(mut faults) = self.faults.write() {
            faults.insert((op, target.to_string()), fault);
        }
    }

    fn check_fault(&self, op: Op, target: &str) -> StoreResult<()> {
        let faults = self
            .faults
            .read()
            .map_err(|_| StoreError::Connectivity("memory store lock poisoned".to_string()))?;
        match faults.get(&(op, target.to_string())) {
            Some(fault) => Err(fault.to_error(target)),
            None => Ok(()),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Connectivity("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, kind: &str) -> StoreResult<Vec<String>> {
        self.check_fault(Op::List, kind)?;

        let prefix = format!("{kind}/");
        let objects = self.objects.read().map_err(|_| Self::poisoned())?;
        let identifiers: Vec<String> = objects
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();

        let declared = self
            .kinds
            .read()
            .map_err(|_| Self::poisoned())?
            .iter()
            .any(|k| k == kind);

        if identifiers.is_empty() && !declared {
            return Err(StoreError::NotFound(kind.to_string()));
        }
        Ok(identifiers)
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        validate_key(key)?;
        self.check_fault(Op::Get, key)?;
        self.objects
            .read()
            .map_err(|_| Self::poisoned())?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        validate_key(key)?;
        self.check_fault(Op::Put, key)?;
        self.objects
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        if let Ok(mut deletes) = self.deletes.lock() {
            deletes.push(key.to_string());
        }
        self.check_fault(Op::Delete, key)?;
        match self
            .objects
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(key)
        {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_relative_to_kind() {
        let store = MemoryStore::new();
        store.insert("pkgsinfo/apps/Firefox.plist", "a");
        store.insert("pkgsinfo/Chrome.plist", "b");
        store.insert("pkgs/apps/firefox.pkg", "c");

        let listed = store.list("pkgsinfo").await.unwrap();
        assert_eq!(listed, vec!["Chrome.plist", "apps/Firefox.plist"]);
    }

    #[tokio::test]
    async fn test_missing_kind_is_not_found() {
        let store = MemoryStore::new();
        let err = store.list("catalogs").await.unwrap_err();
        assert!(err.is_not_found());

        store.create_kind("catalogs");
        assert!(store.list("catalogs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_delete_removes() {
        let store = MemoryStore::new();
        store.put("catalogs/all", Bytes::from_static(b"one")).await.unwrap();
        store.put("catalogs/all", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.get("catalogs/all").await.unwrap(), Bytes::from_static(b"two"));

        store.delete("catalogs/all").await.unwrap();
        assert!(store.get("catalogs/all").await.unwrap_err().is_not_found());
        assert!(store.delete("catalogs/all").await.unwrap_err().is_not_found());
        assert_eq!(store.deleted_keys(), vec!["catalogs/all", "catalogs/all"]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new();
        store.insert("icons/a.png", "png");
        store.fail_get("icons/a.png", InjectedFault::Connectivity);
        store.fail_list("pkgs", InjectedFault::Connectivity);

        assert!(matches!(
            store.get("icons/a.png").await,
            Err(StoreError::Connectivity(_))
        ));
        assert!(matches!(store.list("pkgs").await, Err(StoreError::Connectivity(_))));
    }
}
