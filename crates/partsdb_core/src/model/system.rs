//! Systems and containment edges.
//!
//! # Responsibility
//! - Define the system read model, the containment edge row, and the
//!   expanded tree node returned by traversal.
//!
//! # Invariants
//! - Edges with a system id form each system's containment tree; edges with
//!   `system_uuid` of `None` record standard conformance and are never
//!   traversed as containment.
//! - `quantity` is at least 1.

use crate::model::part::{Part, PartId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for systems.
pub type SystemId = Uuid;

/// Stable identifier for containment edges.
pub type ConnectionId = Uuid;

/// Upper bound on containment depth walked per system.
///
/// Guards against edge data that escaped the insertion-time checks.
pub const MAX_SYSTEM_DEPTH: usize = 32;

/// Named assembly rooted at one part.
///
/// The root part is not unique across systems; several systems may share a
/// root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Stable system id.
    pub uuid: SystemId,
    /// Unique system name.
    pub name: String,
    /// Part the containment tree hangs from.
    pub root_part_uuid: PartId,
}

/// One containment or conformance edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartConnection {
    /// Stable edge id.
    pub uuid: ConnectionId,
    /// Owning system, or `None` for a conformance edge.
    pub system_uuid: Option<SystemId>,
    /// Containing part (the standard, for conformance edges).
    pub container_uuid: PartId,
    /// Contained part (the conforming part, for conformance edges).
    pub content_uuid: PartId,
    /// How many instances the container holds.
    pub quantity: u32,
}

/// One node of an expanded system tree.
///
/// Children carry both the system's own edges and, where a child part roots
/// another system, that system's expanded contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemTreeNode {
    /// Part at this node.
    pub part: Part,
    /// Instance count under the parent node; 1 at the root.
    pub quantity: u32,
    /// Contained nodes ordered by part name.
    pub children: Vec<SystemTreeNode>,
}
