//! Part taxonomy use-case service.
//!
//! # Responsibility
//! - Validate taxonomy invariants above the repository layer.
//! - Provide part create, reparent, children and name lookup operations.
//!
//! # Invariants
//! - Part names are non-blank after trim.
//! - Reparent operations must not create parent-child cycles.
//! - Upward walks are bounded by `MAX_TAXONOMY_DEPTH`.

use crate::model::part::{NewPart, Part, PartId, PartRef, MAX_TAXONOMY_DEPTH};
use crate::repo::part_repo::{NewPartRow, PartRepository};
use crate::repo::RepoError;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from taxonomy service operations.
#[derive(Debug)]
pub enum TaxonomyError {
    /// Part name is blank after trim.
    InvalidName,
    /// Target part does not exist.
    PartNotFound(PartId),
    /// No part carries the requested name.
    NameNotFound(String),
    /// Several parts carry the requested name.
    AmbiguousName { name: String, matches: usize },
    /// Reparent would create a cycle.
    CycleDetected {
        part_uuid: PartId,
        parent_uuid: PartId,
    },
    /// Upward walk exceeded the taxonomy depth bound.
    DepthExceeded { part_uuid: PartId },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for TaxonomyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "part name must not be blank"),
            Self::PartNotFound(id) => write!(f, "part not found: {id}"),
            Self::NameNotFound(name) => write!(f, "no part named `{name}`"),
            Self::AmbiguousName { name, matches } => {
                write!(f, "part name `{name}` is ambiguous: {matches} matches")
            }
            Self::CycleDetected {
                part_uuid,
                parent_uuid,
            } => write!(
                f,
                "reparent would create cycle: part {part_uuid} under parent {parent_uuid}"
            ),
            Self::DepthExceeded { part_uuid } => {
                write!(f, "taxonomy depth bound exceeded at part {part_uuid}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaxonomyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TaxonomyError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "part", id } => Self::PartNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Lazy nearest-first ancestor walk.
///
/// Yields the parent chain of one part; stops after the first error.
pub struct Ancestors<'svc, R: PartRepository> {
    repo: &'svc R,
    cursor: Option<PartId>,
    steps: usize,
}

impl<R: PartRepository> Iterator for Ancestors<'_, R> {
    type Item = Result<Part, TaxonomyError>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor.take()?;
        self.steps += 1;
        if self.steps > MAX_TAXONOMY_DEPTH {
            return Some(Err(TaxonomyError::DepthExceeded { part_uuid: current }));
        }

        match self.repo.get_part(current) {
            Ok(Some(part)) => {
                self.cursor = part.parent_uuid;
                Some(Ok(part))
            }
            Ok(None) => Some(Err(TaxonomyError::PartNotFound(current))),
            Err(err) => Some(Err(err.into())),
        }
    }
}

/// Taxonomy service facade.
pub struct TaxonomyService<R: PartRepository> {
    repo: R,
}

impl<R: PartRepository> TaxonomyService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one part under an optional parent.
    pub fn create_part(&self, new_part: NewPart) -> Result<Part, TaxonomyError> {
        let name = normalize_name(&new_part.name)?;
        let parent_uuid = match &new_part.parent {
            Some(parent) => Some(self.resolve_part_ref(parent)?.uuid),
            None => None,
        };

        self.repo
            .create_part(&NewPartRow {
                name: name.as_str(),
                note: new_part.note.as_deref(),
                parent_uuid,
                is_standard: new_part.is_standard,
                is_connector: new_part.is_connector,
            })
            .map_err(Into::into)
    }

    /// Moves one part under a new parent (or to top level).
    pub fn reparent(
        &self,
        part: impl Into<PartRef>,
        new_parent: Option<PartRef>,
    ) -> Result<Part, TaxonomyError> {
        let part = self.resolve_part_ref(&part.into())?;
        let parent_uuid = match &new_parent {
            Some(parent) => Some(self.resolve_part_ref(parent)?.uuid),
            None => None,
        };

        if let Some(parent_uuid) = parent_uuid {
            if parent_uuid == part.uuid || self.would_create_cycle(part.uuid, parent_uuid)? {
                return Err(TaxonomyError::CycleDetected {
                    part_uuid: part.uuid,
                    parent_uuid,
                });
            }
        }

        self.repo.set_parent(part.uuid, parent_uuid)?;
        self.require_part(part.uuid)
    }

    /// Gets one part by reference.
    pub fn resolve_part(&self, part: impl Into<PartRef>) -> Result<Part, TaxonomyError> {
        self.resolve_part_ref(&part.into())
    }

    /// Lists direct children of one part, ordered by name.
    pub fn children_of(&self, part: impl Into<PartRef>) -> Result<Vec<Part>, TaxonomyError> {
        let part = self.resolve_part_ref(&part.into())?;
        self.repo.list_children(part.uuid).map_err(Into::into)
    }

    /// Walks ancestors of one part, nearest first.
    pub fn ancestors_of(
        &self,
        part: impl Into<PartRef>,
    ) -> Result<Ancestors<'_, R>, TaxonomyError> {
        let part = self.resolve_part_ref(&part.into())?;
        Ok(Ancestors {
            repo: &self.repo,
            cursor: part.parent_uuid,
            steps: 0,
        })
    }

    /// Gets the single part carrying one exact name.
    pub fn find_part_by_name(&self, name: &str) -> Result<Part, TaxonomyError> {
        let mut matches = self.repo.find_parts_by_name(name)?;
        match matches.len() {
            0 => Err(TaxonomyError::NameNotFound(name.to_string())),
            1 => Ok(matches.remove(0)),
            found => Err(TaxonomyError::AmbiguousName {
                name: name.to_string(),
                matches: found,
            }),
        }
    }

    /// Lists every part carrying one exact name.
    pub fn find_parts_by_name(&self, name: &str) -> Result<Vec<Part>, TaxonomyError> {
        self.repo.find_parts_by_name(name).map_err(Into::into)
    }

    /// Lists parts without a parent, ordered by name.
    pub fn top_level_parts(&self) -> Result<Vec<Part>, TaxonomyError> {
        self.repo.list_top_level().map_err(Into::into)
    }

    /// Lists parts heading at least one system and contained by no
    /// non-standard part.
    pub fn system_root_parts(&self) -> Result<Vec<Part>, TaxonomyError> {
        self.repo.system_root_parts().map_err(Into::into)
    }

    fn resolve_part_ref(&self, part: &PartRef) -> Result<Part, TaxonomyError> {
        match part {
            PartRef::Id(part_uuid) => self.require_part(*part_uuid),
            PartRef::Name(name) => self.find_part_by_name(name),
        }
    }

    fn require_part(&self, part_uuid: PartId) -> Result<Part, TaxonomyError> {
        self.repo
            .get_part(part_uuid)?
            .ok_or(TaxonomyError::PartNotFound(part_uuid))
    }

    fn would_create_cycle(
        &self,
        part_uuid: PartId,
        candidate_parent_uuid: PartId,
    ) -> Result<bool, TaxonomyError> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent_uuid);
        let mut steps = 0usize;

        while let Some(current) = cursor {
            if current == part_uuid {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Ok(true);
            }
            steps += 1;
            if steps > MAX_TAXONOMY_DEPTH {
                return Err(TaxonomyError::DepthExceeded { part_uuid: current });
            }

            let node = self.require_part(current)?;
            cursor = node.parent_uuid;
        }
        Ok(false)
    }
}

fn normalize_name(value: &str) -> Result<String, TaxonomyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TaxonomyError::InvalidName);
    }
    Ok(trimmed.to_string())
}
