//! # File Catalog Engine
//!
//! A personal file-cataloging engine: items (files and web links) are
//! classified under categories grouped into taxonomies, with relation
//! counts maintained transactionally in an SQLite-backed store.

pub mod context;
pub mod error;
pub mod files;
pub mod merge;
pub mod model;
pub mod query;
pub mod relations;
pub mod resolver;
pub mod snapshot;
pub mod sql;
pub mod store;
pub mod tree;

// Re-export main API types
pub use context::{CatalogContext, Options};
pub use error::{CatalogError, CatalogResult, StoreError, StoreResult};
pub use model::{Item, ItemId, ItemType, Taxonomy, Term, TermId};
pub use query::{ItemQuery, Page, TermQuery};
pub use store::Store;
