//! System composition use-case service.
//!
//! # Responsibility
//! - Validate containment invariants above the repository layer.
//! - Provide system create, connect, conformance and tree expansion
//!   operations.
//!
//! # Invariants
//! - Within one system a part has at most one container, never contains
//!   itself, and the root is never re-contained.
//! - New containers must be reachable from the system root.
//! - Tree expansion inlines systems rooted at contained parts, skipping
//!   systems already open on the path.

use crate::model::part::{Part, PartId};
use crate::model::system::{PartConnection, System, SystemId, SystemTreeNode, MAX_SYSTEM_DEPTH};
use crate::repo::system_repo::SystemRepository;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from system service operations.
#[derive(Debug)]
pub enum SystemError {
    /// System name is blank after trim.
    InvalidName,
    /// Target system does not exist.
    SystemNotFound(SystemId),
    /// System name is already taken.
    SystemNameTaken(String),
    /// No system carries the requested name.
    SystemNameNotFound(String),
    /// Referenced part does not exist.
    UnknownPart(PartId),
    /// Quantity must be at least 1.
    InvalidQuantity { quantity: u32 },
    /// Container and content are the same part.
    InvalidSelfConnection(PartId),
    /// Content already sits under another container in this system.
    SingleContainerViolation {
        system_uuid: SystemId,
        content_uuid: PartId,
        existing_container_uuid: PartId,
    },
    /// The system root cannot become content of another part.
    RootReContainment {
        system_uuid: SystemId,
        part_uuid: PartId,
    },
    /// Container has no containment path up to the system root.
    RootUnreachable {
        system_uuid: SystemId,
        container_uuid: PartId,
    },
    /// Conformance target is not flagged as a standard.
    NotAStandard(PartId),
    /// Conformance edge already present.
    DuplicateConformance {
        standard_uuid: PartId,
        part_uuid: PartId,
    },
    /// Containment walk exceeded the system depth bound.
    DepthExceeded {
        system_uuid: SystemId,
        part_uuid: PartId,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for SystemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "system name must not be blank"),
            Self::SystemNotFound(id) => write!(f, "system not found: {id}"),
            Self::SystemNameTaken(name) => write!(f, "system name already taken: `{name}`"),
            Self::SystemNameNotFound(name) => write!(f, "no system named `{name}`"),
            Self::UnknownPart(id) => write!(f, "part not found: {id}"),
            Self::InvalidQuantity { quantity } => {
                write!(f, "quantity must be at least 1, got {quantity}")
            }
            Self::InvalidSelfConnection(id) => write!(f, "part {id} cannot contain itself"),
            Self::SingleContainerViolation {
                system_uuid,
                content_uuid,
                existing_container_uuid,
            } => write!(
                f,
                "part {content_uuid} already sits under {existing_container_uuid} in system {system_uuid}"
            ),
            Self::RootReContainment {
                system_uuid,
                part_uuid,
            } => write!(
                f,
                "root part {part_uuid} cannot be re-contained in system {system_uuid}"
            ),
            Self::RootUnreachable {
                system_uuid,
                container_uuid,
            } => write!(
                f,
                "container {container_uuid} is not reachable from the root of system {system_uuid}"
            ),
            Self::NotAStandard(id) => write!(f, "part {id} is not a standard"),
            Self::DuplicateConformance {
                standard_uuid,
                part_uuid,
            } => write!(
                f,
                "part {part_uuid} already conforms to standard {standard_uuid}"
            ),
            Self::DepthExceeded {
                system_uuid,
                part_uuid,
            } => write!(
                f,
                "containment depth bound exceeded at part {part_uuid} in system {system_uuid}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SystemError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "part", id } => Self::UnknownPart(id),
            RepoError::NotFound {
                entity: "system",
                id,
            } => Self::SystemNotFound(id),
            RepoError::NameConflict {
                entity: "system",
                name,
            } => Self::SystemNameTaken(name),
            RepoError::DuplicateConformance {
                standard_uuid,
                part_uuid,
            } => Self::DuplicateConformance {
                standard_uuid,
                part_uuid,
            },
            other => Self::Repo(other),
        }
    }
}

/// System service facade.
pub struct SystemService<R: SystemRepository> {
    repo: R,
}

impl<R: SystemRepository> SystemService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one system rooted at an existing part.
    pub fn create_system(&self, name: &str, root_part_uuid: PartId) -> Result<System, SystemError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SystemError::InvalidName);
        }
        self.require_part(root_part_uuid)?;
        self.repo
            .create_system(trimmed, root_part_uuid)
            .map_err(Into::into)
    }

    /// Gets the system carrying one exact name.
    pub fn system_by_name(&self, name: &str) -> Result<System, SystemError> {
        self.repo
            .find_system_by_name(name)?
            .ok_or_else(|| SystemError::SystemNameNotFound(name.to_string()))
    }

    /// Lists every system, ordered by name.
    pub fn list_systems(&self) -> Result<Vec<System>, SystemError> {
        self.repo.list_systems().map_err(Into::into)
    }

    /// Lists systems rooted at one part, ordered by name.
    ///
    /// Several systems may share a root; `tree_of` merges their contents.
    pub fn systems_by_root_part(&self, part_uuid: PartId) -> Result<Vec<System>, SystemError> {
        self.require_part(part_uuid)?;
        self.repo.systems_by_root_part(part_uuid).map_err(Into::into)
    }

    /// Places `quantity` instances of one part inside a container within
    /// one system.
    ///
    /// The container must already be part of the system (or be its root);
    /// the content must not be placed twice and must not be the root.
    pub fn connect(
        &self,
        system_uuid: SystemId,
        container_uuid: PartId,
        content_uuid: PartId,
        quantity: u32,
    ) -> Result<PartConnection, SystemError> {
        let system = self.require_system(system_uuid)?;
        self.require_part(container_uuid)?;
        self.require_part(content_uuid)?;

        if quantity == 0 {
            return Err(SystemError::InvalidQuantity { quantity });
        }
        if container_uuid == content_uuid {
            return Err(SystemError::InvalidSelfConnection(container_uuid));
        }
        if let Some(existing) = self.repo.container_of(system.uuid, content_uuid)? {
            return Err(SystemError::SingleContainerViolation {
                system_uuid: system.uuid,
                content_uuid,
                existing_container_uuid: existing.container_uuid,
            });
        }
        if content_uuid == system.root_part_uuid {
            return Err(SystemError::RootReContainment {
                system_uuid: system.uuid,
                part_uuid: content_uuid,
            });
        }
        self.ensure_reaches_root(&system, container_uuid)?;

        self.repo
            .insert_connection(system.uuid, container_uuid, content_uuid, quantity)
            .map_err(Into::into)
    }

    /// Records that one part implements one standard.
    pub fn declare_conformance(
        &self,
        standard_uuid: PartId,
        part_uuid: PartId,
    ) -> Result<PartConnection, SystemError> {
        let standard = self.require_part(standard_uuid)?;
        if !standard.is_standard {
            return Err(SystemError::NotAStandard(standard_uuid));
        }
        self.require_part(part_uuid)?;
        if standard_uuid == part_uuid {
            return Err(SystemError::InvalidSelfConnection(part_uuid));
        }

        self.repo
            .insert_conformance(standard_uuid, part_uuid)
            .map_err(Into::into)
    }

    /// Lists standards one part conforms to, ordered by name.
    pub fn standards_of(&self, part_uuid: PartId) -> Result<Vec<Part>, SystemError> {
        self.require_part(part_uuid)?;
        self.repo.standards_of(part_uuid).map_err(Into::into)
    }

    /// Lists parts conforming to one standard, ordered by name.
    pub fn conforming_parts(&self, standard_uuid: PartId) -> Result<Vec<Part>, SystemError> {
        let standard = self.require_part(standard_uuid)?;
        if !standard.is_standard {
            return Err(SystemError::NotAStandard(standard_uuid));
        }
        self.repo.conforming_parts(standard_uuid).map_err(Into::into)
    }

    /// Expands one system into its full containment tree.
    ///
    /// Parts that root other systems bring that system's contents along;
    /// conformance edges are never traversed.
    pub fn tree_of(&self, system_uuid: SystemId) -> Result<SystemTreeNode, SystemError> {
        let system = self.require_system(system_uuid)?;
        let root = self.require_part(system.root_part_uuid)?;

        let mut open_systems = vec![system.uuid];
        let mut children = self.node_children(&system, root.uuid, &mut open_systems, 0)?;

        // Other systems sharing this root merge their contents in.
        for nested in self.repo.systems_by_root_part(root.uuid)? {
            if open_systems.contains(&nested.uuid) {
                continue;
            }
            open_systems.push(nested.uuid);
            let nested_children = self.node_children(&nested, root.uuid, &mut open_systems, 0)?;
            open_systems.pop();
            children.extend(nested_children);
        }
        sort_nodes(&mut children);

        Ok(SystemTreeNode {
            part: root,
            quantity: 1,
            children,
        })
    }

    fn node_children(
        &self,
        system: &System,
        part_uuid: PartId,
        open_systems: &mut Vec<SystemId>,
        depth: usize,
    ) -> Result<Vec<SystemTreeNode>, SystemError> {
        if depth >= MAX_SYSTEM_DEPTH {
            return Err(SystemError::DepthExceeded {
                system_uuid: system.uuid,
                part_uuid,
            });
        }

        let mut children = Vec::new();
        for edge in self.repo.connections_from(system.uuid, part_uuid)? {
            let part = self.require_part(edge.content_uuid)?;
            let mut grandchildren =
                self.node_children(system, part.uuid, open_systems, depth + 1)?;

            for nested in self.repo.systems_by_root_part(part.uuid)? {
                if open_systems.contains(&nested.uuid) {
                    continue;
                }
                open_systems.push(nested.uuid);
                let nested_children =
                    self.node_children(&nested, part.uuid, open_systems, depth + 1)?;
                open_systems.pop();
                grandchildren.extend(nested_children);
            }
            sort_nodes(&mut grandchildren);

            children.push(SystemTreeNode {
                part,
                quantity: edge.quantity,
                children: grandchildren,
            });
        }
        Ok(children)
    }

    fn ensure_reaches_root(
        &self,
        system: &System,
        container_uuid: PartId,
    ) -> Result<(), SystemError> {
        let mut current = container_uuid;
        let mut steps = 0usize;

        loop {
            if current == system.root_part_uuid {
                return Ok(());
            }
            steps += 1;
            if steps > MAX_SYSTEM_DEPTH {
                return Err(SystemError::DepthExceeded {
                    system_uuid: system.uuid,
                    part_uuid: current,
                });
            }
            match self.repo.container_of(system.uuid, current)? {
                Some(edge) => current = edge.container_uuid,
                None => {
                    return Err(SystemError::RootUnreachable {
                        system_uuid: system.uuid,
                        container_uuid,
                    });
                }
            }
        }
    }

    fn require_system(&self, system_uuid: SystemId) -> Result<System, SystemError> {
        self.repo
            .get_system(system_uuid)?
            .ok_or(SystemError::SystemNotFound(system_uuid))
    }

    fn require_part(&self, part_uuid: PartId) -> Result<Part, SystemError> {
        self.repo
            .get_part(part_uuid)?
            .ok_or(SystemError::UnknownPart(part_uuid))
    }
}

fn sort_nodes(nodes: &mut [SystemTreeNode]) {
    nodes.sort_by(|a, b| {
        a.part
            .name
            .cmp(&b.part.name)
            .then_with(|| a.part.uuid.cmp(&b.part.uuid))
    });
}
