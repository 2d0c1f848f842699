//! Catalogs - grouping, pruning and publishing
//!
//! A catalog is a named list of pkginfo records. Every record that makes it
//! through verification lands in the synthetic `all` catalog plus each
//! catalog it lists in its `catalogs` field.
//!
//! ```text
//! verified records ──► aggregate ──► CatalogSet
//!                                       │
//!             catalogs/ (prior build) ──┤ prune orphans
//!                                       ▼
//!                              catalogs/<name> (write)
//! ```

mod aggregate;
mod reconcile;
mod writer;

pub use aggregate::{aggregate, case_collisions, CatalogSet, VerifiedRecord, ALL_CATALOG};
pub use reconcile::{previous_catalogs, prune_catalogs};
pub use writer::{
    serialize_catalog, serialize_icon_hashes, write_catalogs, write_icon_hashes, ICON_HASHES_KEY,
};
