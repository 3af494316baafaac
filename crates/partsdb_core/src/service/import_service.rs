//! Bulk catalog import.
//!
//! # Responsibility
//! - Load dependency-ordered record batches (units, attribute types,
//!   categories, standards, connectors, subparts, systems) into one
//!   connection.
//! - Resolve cross-record references by name through the regular services,
//!   so every service invariant holds during import.
//!
//! # Invariants
//! - Each batch runs inside one immediate transaction; the first error
//!   rolls the whole batch back.
//! - Standards are stored with the `" (Standard)"` name suffix; later
//!   records reference the suffixed name.
//! - `via` targets and system root parts must exist before the record that
//!   names them (records are order-sensitive within a batch).

use crate::db::DbError;
use crate::model::attr::{AttrValue, AttrValueError, NewAttrType, ValueShape};
use crate::model::part::{NewPart, PartId, PartRef, STANDARD_NAME_SUFFIX};
use crate::model::system::System;
use crate::model::unit::NewUnit;
use crate::repo::attr_repo::{AttrRepository, SqliteAttrRepository};
use crate::repo::part_repo::{PartRepository, SqlitePartRepository};
use crate::repo::system_repo::{SqliteSystemRepository, SystemRepository};
use crate::repo::RepoError;
use crate::service::attribute_service::{AttrError, AttributeService};
use crate::service::system_service::{SystemError, SystemService};
use crate::service::taxonomy_service::{TaxonomyError, TaxonomyService};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from import operations.
#[derive(Debug)]
pub enum ImportError {
    Taxonomy(TaxonomyError),
    Attr(AttrError),
    System(SystemError),
    Repo(RepoError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Taxonomy(err) => write!(f, "{err}"),
            Self::Attr(err) => write!(f, "{err}"),
            Self::System(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Taxonomy(err) => Some(err),
            Self::Attr(err) => Some(err),
            Self::System(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<TaxonomyError> for ImportError {
    fn from(value: TaxonomyError) -> Self {
        Self::Taxonomy(value)
    }
}

impl From<AttrError> for ImportError {
    fn from(value: AttrError) -> Self {
        Self::Attr(value)
    }
}

impl From<SystemError> for ImportError {
    fn from(value: SystemError) -> Self {
        Self::System(value)
    }
}

impl From<RepoError> for ImportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<AttrValueError> for ImportError {
    fn from(value: AttrValueError) -> Self {
        Self::Attr(AttrError::InvalidValue(value))
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::Db(DbError::Sqlite(value)))
    }
}

/// One measurement unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitRecord {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// One attribute type, referencing its unit by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttrTypeRecord {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub from_to: bool,
    #[serde(default)]
    pub multi_value: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// One top-level part category with its authorized attribute type names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub attr_types: Vec<String>,
}

/// One node of a nested part tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartNodeRecord {
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    /// Attribute type names to authorize on this node.
    #[serde(default)]
    pub attr_types: Vec<String>,
    /// Attribute values keyed by attribute type name.
    #[serde(default)]
    pub attrs: BTreeMap<String, ValueRecord>,
    /// Suffixed standard names this node conforms to.
    #[serde(default)]
    pub standards: Vec<String>,
    #[serde(default)]
    pub children: Vec<PartNodeRecord>,
}

/// One part tree with an optional parent resolved by name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartTreeRecord {
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub node: PartNodeRecord,
}

/// New children for one existing parent part.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubpartsRecord {
    pub parent: String,
    pub children: Vec<PartNodeRecord>,
}

/// One system named after its (already imported) root part.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemRecord {
    pub name: String,
    #[serde(default)]
    pub contents: Vec<SystemNodeRecord>,
}

/// One placement inside a system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemNodeRecord {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Name of the actual container when it differs from the nesting
    /// parent, e.g. RAM contained via a DIMM connector.
    #[serde(default)]
    pub via: Option<String>,
    #[serde(default)]
    pub contents: Vec<SystemNodeRecord>,
}

fn default_quantity() -> u32 {
    1
}

/// Loose attribute value as written in import data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ValueRecord {
    Flag(bool),
    Number(f64),
    Text(String),
    Many(Vec<String>),
    Span { from: f64, to: f64 },
}

impl ValueRecord {
    /// Maps the loose record onto the owning attribute type's shape.
    fn to_attr_value(&self, shape: ValueShape) -> Result<AttrValue, AttrValueError> {
        match (shape, self) {
            (ValueShape::Scalar, Self::Text(text)) => Ok(AttrValue::Scalar(text.clone())),
            (ValueShape::Scalar, Self::Number(number)) => {
                Ok(AttrValue::Scalar(format_number(*number)))
            }
            (ValueShape::Scalar, Self::Flag(flag)) => Ok(AttrValue::Scalar(flag.to_string())),
            (ValueShape::Range, Self::Span { from, to }) => Ok(AttrValue::Range {
                from: *from,
                to: *to,
            }),
            (ValueShape::Multi, Self::Many(values)) => Ok(AttrValue::Multi(values.clone())),
            (ValueShape::Multi, Self::Text(text)) => Ok(AttrValue::Multi(vec![text.clone()])),
            (expected, other) => Err(AttrValueError::ShapeMismatch {
                expected,
                got: other.shape_hint(),
            }),
        }
    }

    fn shape_hint(&self) -> ValueShape {
        match self {
            Self::Flag(_) | Self::Number(_) | Self::Text(_) => ValueShape::Scalar,
            Self::Many(_) => ValueShape::Multi,
            Self::Span { .. } => ValueShape::Range,
        }
    }
}

/// Renders whole numbers without a trailing fraction, e.g. `2800`.
fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 9e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartNodeKind {
    Plain,
    Standard,
    Connector,
}

/// Import facade over one migrated connection.
pub struct ImportService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ImportService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Imports measurement units. Returns the record count.
    pub fn import_units(&self, records: &[UnitRecord]) -> Result<usize, ImportError> {
        let tx = self.begin()?;
        {
            let attrs = AttributeService::new(SqliteAttrRepository::try_new(&tx)?);
            for record in records {
                attrs.create_unit(NewUnit {
                    name: record.name.clone(),
                    label: record.label.clone(),
                    format: record.format.clone(),
                    note: record.note.clone(),
                })?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Imports attribute types, resolving units by name.
    pub fn import_attr_types(&self, records: &[AttrTypeRecord]) -> Result<usize, ImportError> {
        let tx = self.begin()?;
        {
            let attrs = AttributeService::new(SqliteAttrRepository::try_new(&tx)?);
            for record in records {
                let unit = attrs.find_unit_by_name(&record.unit)?;
                attrs.create_attr_type(NewAttrType {
                    name: record.name.clone(),
                    unit_uuid: unit.uuid,
                    from_to: record.from_to,
                    multi_value: record.multi_value,
                    note: record.note.clone(),
                })?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Imports top-level part categories with their attribute type grants.
    pub fn import_parts(&self, records: &[CategoryRecord]) -> Result<usize, ImportError> {
        let tx = self.begin()?;
        {
            let parts = TaxonomyService::new(SqlitePartRepository::try_new(&tx)?);
            let attrs = AttributeService::new(SqliteAttrRepository::try_new(&tx)?);
            for record in records {
                let part = parts.create_part(NewPart {
                    name: record.name.clone(),
                    note: record.note.clone(),
                    parent: None,
                    is_standard: false,
                    is_connector: false,
                })?;
                for attr_type_name in &record.attr_types {
                    let attr_type = attrs.resolve_attr_type(part.uuid, attr_type_name)?;
                    attrs.authorize(part.uuid, attr_type.uuid)?;
                }
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Imports standard trees; stored names get the standard suffix.
    pub fn import_standards(&self, records: &[PartTreeRecord]) -> Result<usize, ImportError> {
        self.import_part_trees(records, PartNodeKind::Standard)
    }

    /// Imports connector trees.
    pub fn import_connectors(&self, records: &[PartTreeRecord]) -> Result<usize, ImportError> {
        self.import_part_trees(records, PartNodeKind::Connector)
    }

    /// Imports child part trees under existing parents.
    pub fn import_subparts(&self, records: &[SubpartsRecord]) -> Result<usize, ImportError> {
        let tx = self.begin()?;
        {
            let parts = TaxonomyService::new(SqlitePartRepository::try_new(&tx)?);
            let attrs = AttributeService::new(SqliteAttrRepository::try_new(&tx)?);
            let systems = SystemService::new(SqliteSystemRepository::try_new(&tx)?);
            for record in records {
                let parent = parts.find_part_by_name(&record.parent)?;
                for child in &record.children {
                    import_part_node(
                        &parts,
                        &attrs,
                        &systems,
                        child,
                        Some(parent.uuid),
                        PartNodeKind::Plain,
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Imports systems; roots and all placed parts resolve by name.
    pub fn import_systems(&self, records: &[SystemRecord]) -> Result<usize, ImportError> {
        let tx = self.begin()?;
        {
            let parts = TaxonomyService::new(SqlitePartRepository::try_new(&tx)?);
            let systems = SystemService::new(SqliteSystemRepository::try_new(&tx)?);
            for record in records {
                let root = parts.find_part_by_name(&record.name)?;
                let system = systems.create_system(&record.name, root.uuid)?;
                for content in &record.contents {
                    import_system_node(&parts, &systems, &system, root.uuid, content)?;
                }
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn import_part_trees(
        &self,
        records: &[PartTreeRecord],
        kind: PartNodeKind,
    ) -> Result<usize, ImportError> {
        let tx = self.begin()?;
        {
            let parts = TaxonomyService::new(SqlitePartRepository::try_new(&tx)?);
            let attrs = AttributeService::new(SqliteAttrRepository::try_new(&tx)?);
            let systems = SystemService::new(SqliteSystemRepository::try_new(&tx)?);
            for record in records {
                let parent_uuid = match &record.parent {
                    Some(name) => Some(parts.find_part_by_name(name)?.uuid),
                    None => None,
                };
                import_part_node(&parts, &attrs, &systems, &record.node, parent_uuid, kind)?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn begin(&self) -> Result<Transaction<'conn>, ImportError> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

fn import_part_node<P, A, S>(
    parts: &TaxonomyService<P>,
    attrs: &AttributeService<A>,
    systems: &SystemService<S>,
    record: &PartNodeRecord,
    parent_uuid: Option<PartId>,
    kind: PartNodeKind,
) -> Result<(), ImportError>
where
    P: PartRepository,
    A: AttrRepository,
    S: SystemRepository,
{
    let stored_name = match kind {
        PartNodeKind::Standard => format!("{}{}", record.name, STANDARD_NAME_SUFFIX),
        PartNodeKind::Plain | PartNodeKind::Connector => record.name.clone(),
    };

    let part = parts.create_part(NewPart {
        name: stored_name,
        note: record.note.clone(),
        parent: parent_uuid.map(PartRef::from),
        is_standard: kind == PartNodeKind::Standard,
        is_connector: kind == PartNodeKind::Connector,
    })?;

    for attr_type_name in &record.attr_types {
        let attr_type = attrs.resolve_attr_type(part.uuid, attr_type_name)?;
        attrs.authorize(part.uuid, attr_type.uuid)?;
    }

    for (attr_type_name, value_record) in &record.attrs {
        let attr_type = attrs.resolve_attr_type(part.uuid, attr_type_name)?;
        let value = value_record.to_attr_value(attr_type.value_shape())?;
        attrs.assign(part.uuid, attr_type.uuid, value)?;
    }

    for standard_name in &record.standards {
        let standard = parts.find_part_by_name(standard_name)?;
        systems.declare_conformance(standard.uuid, part.uuid)?;
    }

    for child in &record.children {
        import_part_node(parts, attrs, systems, child, Some(part.uuid), kind)?;
    }
    Ok(())
}

fn import_system_node<P, S>(
    parts: &TaxonomyService<P>,
    systems: &SystemService<S>,
    system: &System,
    default_container_uuid: PartId,
    record: &SystemNodeRecord,
) -> Result<(), ImportError>
where
    P: PartRepository,
    S: SystemRepository,
{
    let content = parts.find_part_by_name(&record.name)?;
    let container_uuid = match &record.via {
        // The via part must already be placed in this system.
        Some(via_name) => parts.find_part_by_name(via_name)?.uuid,
        None => default_container_uuid,
    };

    systems.connect(system.uuid, container_uuid, content.uuid, record.quantity)?;

    for child in &record.contents {
        import_system_node(parts, systems, system, content.uuid, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{format_number, SystemNodeRecord, ValueRecord};
    use crate::model::attr::{AttrValue, AttrValueError, ValueShape};

    #[test]
    fn value_record_accepts_loose_json_forms() {
        let number: ValueRecord = serde_json::from_str("2800").unwrap();
        assert_eq!(number, ValueRecord::Number(2800.0));

        let text: ValueRecord = serde_json::from_str("\"Intel\"").unwrap();
        assert_eq!(text, ValueRecord::Text("Intel".to_string()));

        let flag: ValueRecord = serde_json::from_str("true").unwrap();
        assert_eq!(flag, ValueRecord::Flag(true));

        let many: ValueRecord = serde_json::from_str("[\"DDR\", \"DDR2\"]").unwrap();
        assert_eq!(
            many,
            ValueRecord::Many(vec!["DDR".to_string(), "DDR2".to_string()])
        );

        let span: ValueRecord = serde_json::from_str("{\"from\": 533, \"to\": 800}").unwrap();
        assert_eq!(
            span,
            ValueRecord::Span {
                from: 533.0,
                to: 800.0
            }
        );
    }

    #[test]
    fn numbers_map_to_integer_scalars() {
        let record = ValueRecord::Number(2800.0);
        assert_eq!(
            record.to_attr_value(ValueShape::Scalar).unwrap(),
            AttrValue::Scalar("2800".to_string())
        );
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn shape_mismatch_names_both_shapes() {
        let record = ValueRecord::Many(vec!["DDR".to_string()]);
        let err = record.to_attr_value(ValueShape::Range).unwrap_err();
        assert_eq!(
            err,
            AttrValueError::ShapeMismatch {
                expected: ValueShape::Range,
                got: ValueShape::Multi,
            }
        );
    }

    #[test]
    fn system_node_quantity_defaults_to_one() {
        let record: SystemNodeRecord =
            serde_json::from_str("{\"name\": \"Anonymous RAM\"}").unwrap();
        assert_eq!(record.quantity, 1);
        assert!(record.via.is_none());
        assert!(record.contents.is_empty());
    }
}
