//! Test helpers shared by the integration tests
//!
//! Builds in-memory repositories from pkginfo fixtures.

#![allow(dead_code)]

use plist::{Dictionary, Value};
use repocat_core::{BuildOptions, CatalogBuilder, CollectingSink, MemoryStore};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Fluent builder for a pkginfo dictionary
pub struct Pkginfo {
    fields: Dictionary,
}

impl Pkginfo {
    pub fn named(name: &str) -> Self {
        let mut fields = Dictionary::new();
        fields.insert("name".to_string(), Value::String(name.to_string()));
        Self { fields }
    }

    pub fn nameless() -> Self {
        Self {
            fields: Dictionary::new(),
        }
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn installer(self, location: &str) -> Self {
        self.field("installer_item_location", location)
    }

    pub fn catalogs(mut self, names: &[&str]) -> Self {
        self.fields.insert(
            "catalogs".to_string(),
            Value::Array(names.iter().map(|n| Value::String(n.to_string())).collect()),
        );
        self
    }

    pub fn to_xml(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        Value::Dictionary(self.fields.clone())
            .to_writer_xml(&mut buffer)
            .expect("fixture serializes");
        buffer
    }
}

/// An in-memory repository plus the sink its builds report to
pub struct TestRepo {
    pub store: Arc<MemoryStore>,
    pub sink: Arc<CollectingSink>,
}

impl TestRepo {
    pub fn new() -> Self {
        init_test_logging();
        let store = MemoryStore::new();
        store.create_kind("pkgsinfo");
        store.create_kind("pkgs");
        Self {
            store: Arc::new(store),
            sink: Arc::new(CollectingSink::new()),
        }
    }

    pub fn add_pkginfo(&self, identifier: &str, pkginfo: Pkginfo) -> &Self {
        self.store
            .insert(format!("pkgsinfo/{identifier}"), pkginfo.to_xml());
        self
    }

    pub fn add_pkg(&self, identifier: &str) -> &Self {
        self.store
            .insert(format!("pkgs/{identifier}"), format!("payload for {identifier}"));
        self
    }

    pub fn add_icon(&self, identifier: &str, content: &'static str) -> &Self {
        self.store.insert(format!("icons/{identifier}"), content);
        self
    }

    pub fn builder(&self, options: BuildOptions) -> CatalogBuilder {
        CatalogBuilder::new(self.store.clone(), self.sink.clone(), options)
    }

    /// Names of the records stored in `catalogs/<catalog>`, in order.
    pub fn catalog_names(&self, catalog: &str) -> Option<Vec<String>> {
        let data = self.store.object(&format!("catalogs/{catalog}"))?;
        let value = Value::from_reader_xml(&data[..]).expect("catalog parses");
        let records = value.into_array().expect("catalog is an array");
        Some(
            records
                .iter()
                .filter_map(|r| r.as_dictionary())
                .filter_map(|d| d.get("name").and_then(Value::as_string))
                .map(str::to_string)
                .collect(),
        )
    }

    /// Published catalog identifiers, sorted.
    pub fn published_catalogs(&self) -> Vec<String> {
        self.store
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix("catalogs/").map(str::to_string))
            .collect()
    }
}

pub fn default_options() -> BuildOptions {
    BuildOptions {
        concurrency: 4,
        ..BuildOptions::default()
    }
}

pub fn forced_options() -> BuildOptions {
    BuildOptions {
        force: true,
        ..default_options()
    }
}
