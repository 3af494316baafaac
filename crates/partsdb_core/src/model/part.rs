//! Part taxonomy node model.
//!
//! # Responsibility
//! - Define the self-referential part entity and its creation input.
//! - Name conventions shared by taxonomy and import code.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another part.
//! - Part names are not unique; lookups by name must detect ambiguity.
//! - The parent chain is acyclic, enforced at write time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for taxonomy parts.
pub type PartId = Uuid;

/// Upper bound for parent-chain walks.
///
/// Walks hitting the cap report an error instead of running unbounded.
pub const MAX_TAXONOMY_DEPTH: usize = 64;

/// Name suffix appended to standard parts, e.g. `DDR3 SDRAM (Standard)`.
pub const STANDARD_NAME_SUFFIX: &str = " (Standard)";

/// Reference to an existing part, by id or by unambiguous name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartRef {
    Id(PartId),
    Name(String),
}

impl From<PartId> for PartRef {
    fn from(value: PartId) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for PartRef {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for PartRef {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

/// Taxonomy node read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Stable part id.
    pub uuid: PartId,
    /// Display name. Not unique across the catalog.
    pub name: String,
    /// Optional free text.
    pub note: Option<String>,
    /// Parent taxonomy node. `None` means top-level category.
    pub parent_uuid: Option<PartId>,
    /// Marks standard parts, e.g. `DDR3 SDRAM (Standard)`.
    pub is_standard: bool,
    /// Marks connector parts, e.g. `Socket 478`.
    pub is_connector: bool,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp. Changes on reparenting.
    pub updated_at: i64,
}

/// Input shape for creating one part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPart {
    pub name: String,
    pub note: Option<String>,
    pub parent: Option<PartRef>,
    pub is_standard: bool,
    pub is_connector: bool,
}

impl NewPart {
    /// Creates a plain part input with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
