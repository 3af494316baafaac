//! Attribute use-case service.
//!
//! # Responsibility
//! - Validate unit/attribute-type input and value shapes above the
//!   repository layer.
//! - Enforce authorization inheritance before any value assignment.
//!
//! # Invariants
//! - A part may only carry values of attribute types granted to it or to an
//!   ancestor.
//! - Values are normalized before shape validation and persistence.
//! - Assignment returns the persisted record read back from storage.

use crate::model::attr::{
    AttrId, AttrType, AttrTypeId, AttrTypeValidationError, AttrValue, AttrValueError,
    Authorization, NewAttrType,
};
use crate::model::part::{Part, PartId, MAX_TAXONOMY_DEPTH};
use crate::model::unit::{NewUnit, Unit, UnitId, UnitValidationError};
use crate::repo::attr_repo::{AttrRepository, AttributeRecord};
use crate::repo::RepoError;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from attribute service operations.
#[derive(Debug)]
pub enum AttrError {
    /// Unit input failed validation.
    InvalidUnit(UnitValidationError),
    /// Attribute type input failed validation.
    InvalidAttrType(AttrTypeValidationError),
    /// Value failed shape or content validation.
    InvalidValue(AttrValueError),
    /// Referenced unit does not exist.
    UnitNotFound(UnitId),
    /// Unit name is already taken.
    UnitNameTaken(String),
    /// No unit carries the requested name.
    UnitNameNotFound(String),
    /// Referenced attribute type does not exist.
    AttrTypeNotFound(AttrTypeId),
    /// No attribute type carries the requested name.
    AttrTypeNameNotFound(String),
    /// Several attribute types carry the requested name and the part's
    /// authorized set does not single one out.
    AmbiguousAttrTypeName { name: String, matches: usize },
    /// Target part does not exist.
    PartNotFound(PartId),
    /// Neither the part nor any ancestor holds the grant.
    UnauthorizedAttrType {
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    },
    /// Grant already present on this part.
    DuplicateAuthorization {
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    },
    /// Part already carries this attr.
    DuplicateAssignment { part_uuid: PartId, attr_uuid: AttrId },
    /// Upward walk exceeded the taxonomy depth bound.
    DepthExceeded { part_uuid: PartId },
    /// Read-back after write returned unexpected data.
    InconsistentState(&'static str),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for AttrError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUnit(err) => write!(f, "{err}"),
            Self::InvalidAttrType(err) => write!(f, "{err}"),
            Self::InvalidValue(err) => write!(f, "{err}"),
            Self::UnitNotFound(id) => write!(f, "unit not found: {id}"),
            Self::UnitNameTaken(name) => write!(f, "unit name already taken: `{name}`"),
            Self::UnitNameNotFound(name) => write!(f, "no unit named `{name}`"),
            Self::AttrTypeNotFound(id) => write!(f, "attribute type not found: {id}"),
            Self::AttrTypeNameNotFound(name) => {
                write!(f, "no attribute type named `{name}`")
            }
            Self::AmbiguousAttrTypeName { name, matches } => write!(
                f,
                "attribute type name `{name}` is ambiguous: {matches} matches"
            ),
            Self::PartNotFound(id) => write!(f, "part not found: {id}"),
            Self::UnauthorizedAttrType {
                part_uuid,
                attr_type_uuid,
            } => write!(
                f,
                "part {part_uuid} is not authorized for attribute type {attr_type_uuid}"
            ),
            Self::DuplicateAuthorization {
                part_uuid,
                attr_type_uuid,
            } => write!(
                f,
                "part {part_uuid} already authorizes attribute type {attr_type_uuid}"
            ),
            Self::DuplicateAssignment {
                part_uuid,
                attr_uuid,
            } => write!(f, "part {part_uuid} already carries attr {attr_uuid}"),
            Self::DepthExceeded { part_uuid } => {
                write!(f, "taxonomy depth bound exceeded at part {part_uuid}")
            }
            Self::InconsistentState(details) => {
                write!(f, "inconsistent attribute state: {details}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AttrError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidUnit(err) => Some(err),
            Self::InvalidAttrType(err) => Some(err),
            Self::InvalidValue(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UnitValidationError> for AttrError {
    fn from(value: UnitValidationError) -> Self {
        Self::InvalidUnit(value)
    }
}

impl From<AttrTypeValidationError> for AttrError {
    fn from(value: AttrTypeValidationError) -> Self {
        Self::InvalidAttrType(value)
    }
}

impl From<AttrValueError> for AttrError {
    fn from(value: AttrValueError) -> Self {
        Self::InvalidValue(value)
    }
}

impl From<RepoError> for AttrError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity: "part", id } => Self::PartNotFound(id),
            RepoError::NotFound {
                entity: "attr_type",
                id,
            } => Self::AttrTypeNotFound(id),
            RepoError::NotFound { entity: "unit", id } => Self::UnitNotFound(id),
            RepoError::NameConflict {
                entity: "unit",
                name,
            } => Self::UnitNameTaken(name),
            RepoError::DuplicateAuthorization {
                part_uuid,
                attr_type_uuid,
            } => Self::DuplicateAuthorization {
                part_uuid,
                attr_type_uuid,
            },
            RepoError::DuplicateAssignment {
                part_uuid,
                attr_uuid,
            } => Self::DuplicateAssignment {
                part_uuid,
                attr_uuid,
            },
            other => Self::Repo(other),
        }
    }
}

/// Attribute service facade.
pub struct AttributeService<R: AttrRepository> {
    repo: R,
}

impl<R: AttrRepository> AttributeService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one measurement unit.
    pub fn create_unit(&self, new_unit: NewUnit) -> Result<Unit, AttrError> {
        new_unit.validate()?;
        self.repo.create_unit(&new_unit).map_err(Into::into)
    }

    /// Gets the unit carrying one exact name.
    pub fn find_unit_by_name(&self, name: &str) -> Result<Unit, AttrError> {
        self.repo
            .find_unit_by_name(name)?
            .ok_or_else(|| AttrError::UnitNameNotFound(name.to_string()))
    }

    /// Lists every unit, ordered by name.
    pub fn list_units(&self) -> Result<Vec<Unit>, AttrError> {
        self.repo.list_units().map_err(Into::into)
    }

    /// Creates one attribute type bound to an existing unit.
    pub fn create_attr_type(&self, new_attr_type: NewAttrType) -> Result<AttrType, AttrError> {
        new_attr_type.validate()?;
        self.repo
            .get_unit(new_attr_type.unit_uuid)?
            .ok_or(AttrError::UnitNotFound(new_attr_type.unit_uuid))?;
        self.repo.create_attr_type(&new_attr_type).map_err(Into::into)
    }

    /// Lists every attribute type, ordered by name.
    pub fn list_attr_types(&self) -> Result<Vec<AttrType>, AttrError> {
        self.repo.list_attr_types().map_err(Into::into)
    }

    /// Resolves one attribute type by name from a part's point of view.
    ///
    /// A name shared by several types is narrowed through the part's
    /// authorized set; it must single out exactly one type.
    pub fn resolve_attr_type(
        &self,
        part_uuid: PartId,
        name: &str,
    ) -> Result<AttrType, AttrError> {
        let mut matches = self.repo.find_attr_types_by_name(name)?;
        match matches.len() {
            0 => Err(AttrError::AttrTypeNameNotFound(name.to_string())),
            1 => Ok(matches.remove(0)),
            found => {
                let authorized: HashSet<AttrTypeId> = self
                    .authorized_attr_types(part_uuid)?
                    .into_iter()
                    .map(|attr_type| attr_type.uuid)
                    .collect();
                let mut narrowed: Vec<AttrType> = matches
                    .into_iter()
                    .filter(|attr_type| authorized.contains(&attr_type.uuid))
                    .collect();
                if narrowed.len() == 1 {
                    return Ok(narrowed.remove(0));
                }
                Err(AttrError::AmbiguousAttrTypeName {
                    name: name.to_string(),
                    matches: found,
                })
            }
        }
    }

    /// Grants one attribute type on one part.
    pub fn authorize(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    ) -> Result<Authorization, AttrError> {
        self.require_part(part_uuid)?;
        self.require_attr_type(attr_type_uuid)?;
        self.repo
            .insert_authorization(part_uuid, attr_type_uuid)
            .map_err(Into::into)
    }

    /// Finds the grant covering one part, walking ancestors nearest first.
    ///
    /// Returns the owning authorization, which may sit on an ancestor.
    pub fn search_authorization(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    ) -> Result<Option<Authorization>, AttrError> {
        let mut cursor = Some(part_uuid);
        let mut steps = 0usize;

        while let Some(current) = cursor {
            if let Some(authorization) = self.repo.get_authorization(current, attr_type_uuid)? {
                return Ok(Some(authorization));
            }
            steps += 1;
            if steps > MAX_TAXONOMY_DEPTH {
                return Err(AttrError::DepthExceeded { part_uuid: current });
            }
            let part = self.require_part(current)?;
            cursor = part.parent_uuid;
        }
        Ok(None)
    }

    /// Lists attribute types usable by one part, direct and inherited.
    pub fn authorized_attr_types(&self, part_uuid: PartId) -> Result<Vec<AttrType>, AttrError> {
        self.require_part(part_uuid)?;
        self.repo.authorized_attr_types(part_uuid).map_err(Into::into)
    }

    /// Assigns one value of one attribute type to one part.
    ///
    /// The value is normalized, shape-checked and deduplicated; the part
    /// must hold the grant directly or through an ancestor.
    pub fn assign(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
        value: AttrValue,
    ) -> Result<AttributeRecord, AttrError> {
        let part = self.require_part(part_uuid)?;
        let attr_type = self.require_attr_type(attr_type_uuid)?;

        let value = value.normalized();
        value.validate_for(&attr_type)?;

        if self.search_authorization(part.uuid, attr_type.uuid)?.is_none() {
            return Err(AttrError::UnauthorizedAttrType {
                part_uuid: part.uuid,
                attr_type_uuid: attr_type.uuid,
            });
        }

        let attr = self.repo.assign_attr(part.uuid, &attr_type, &value)?;
        self.repo
            .attributes_of(part.uuid)?
            .into_iter()
            .find(|record| record.attr_uuid == attr.uuid)
            .ok_or(AttrError::InconsistentState(
                "assigned attr not found in read-back",
            ))
    }

    /// Lists attributes carried by one part, with unit rendering.
    pub fn attributes_of(&self, part_uuid: PartId) -> Result<Vec<AttributeRecord>, AttrError> {
        self.require_part(part_uuid)?;
        self.repo.attributes_of(part_uuid).map_err(Into::into)
    }

    fn require_part(&self, part_uuid: PartId) -> Result<Part, AttrError> {
        self.repo
            .get_part(part_uuid)?
            .ok_or(AttrError::PartNotFound(part_uuid))
    }

    fn require_attr_type(&self, attr_type_uuid: AttrTypeId) -> Result<AttrType, AttrError> {
        self.repo
            .get_attr_type(attr_type_uuid)?
            .ok_or(AttrError::AttrTypeNotFound(attr_type_uuid))
    }
}
