//! Core domain logic for PartsDB.
//! This crate is the single source of truth for catalog invariants.

pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use export::{taxonomy_json, taxonomy_tree, ExportError, TaxonomyNode};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::attr::{
    Attr, AttrId, AttrType, AttrTypeId, AttrTypeValidationError, AttrValue, AttrValueError,
    Authorization, NewAttrType, ValueShape,
};
pub use model::part::{NewPart, Part, PartId, PartRef, MAX_TAXONOMY_DEPTH, STANDARD_NAME_SUFFIX};
pub use model::system::{
    ConnectionId, PartConnection, System, SystemId, SystemTreeNode, MAX_SYSTEM_DEPTH,
};
pub use model::unit::{NewUnit, Unit, UnitId, UnitValidationError};
pub use repo::attr_repo::{AttrRepository, AttributeRecord, SqliteAttrRepository};
pub use repo::part_repo::{PartRepository, SqlitePartRepository};
pub use repo::system_repo::{SystemRepository, SqliteSystemRepository};
pub use repo::{RepoError, RepoResult};
pub use service::attribute_service::{AttrError, AttributeService};
pub use service::import_service::{ImportError, ImportService};
pub use service::system_service::{SystemError, SystemService};
pub use service::taxonomy_service::{TaxonomyError, TaxonomyService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
