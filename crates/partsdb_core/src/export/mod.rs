//! Catalog export projections.
//!
//! # Responsibility
//! - Project the persisted catalog into serializable shapes for other
//!   tools.

pub mod taxonomy;

pub use taxonomy::{taxonomy_json, taxonomy_tree, ExportError, TaxonomyNode};
