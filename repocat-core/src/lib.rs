//! repocat core library
//!
//! Builds the derived index of a software distribution repository: the
//! per-audience catalogs under `catalogs/` and the icon-hash manifest under
//! `icons/`. The engine only talks to an [`ObjectStore`] and an
//! [`OutputSink`]; everything else (credentials, CLI, local mirrors) lives
//! outside.

pub mod build;
pub mod catalog;
pub mod config;
pub mod error;
pub mod icons;
pub mod metadata;
pub mod output;
pub mod report;
pub mod store;
pub mod verify;

pub use build::{make_catalogs, BuildOptions, BuildState, CatalogBuilder};
pub use error::{BuildError, StoreError, StoreResult};
pub use output::{CollectingSink, OutputSink, StdoutSink, TracingSink};
pub use report::{BuildReport, Diagnostic, DiagnosticKind, ErrorReport};
pub use store::{FilesystemStore, MemoryStore, ObjectStore};
