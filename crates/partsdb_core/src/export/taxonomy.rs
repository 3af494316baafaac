//! Parent-first taxonomy tree export.
//!
//! # Invariants
//! - Nodes carry the attribute type names granted DIRECTLY on them; the
//!   inherited view is not flattened into the export.
//! - Empty `note`/`attr_types`/`children` keys are absent, not null.
//! - Roots and children are ordered by name.

use crate::model::attr::AttrTypeId;
use crate::model::part::{Part, PartId};
use crate::repo::attr_repo::{AttrRepository, SqliteAttrRepository};
use crate::repo::part_repo::{PartRepository, SqlitePartRepository};
use crate::repo::RepoError;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from export operations.
#[derive(Debug)]
pub enum ExportError {
    Repo(RepoError),
    Serialize(serde_json::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Serialize(err) => write!(f, "export serialization failed: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Serialize(err) => Some(err),
        }
    }
}

impl From<RepoError> for ExportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

/// One exported taxonomy node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxonomyNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Attribute type names granted directly on this node, sorted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attr_types: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaxonomyNode>,
}

/// Projects the whole part taxonomy as a parent-first forest.
pub fn taxonomy_tree(conn: &Connection) -> Result<Vec<TaxonomyNode>, ExportError> {
    let part_repo = SqlitePartRepository::try_new(conn)?;
    let attr_repo = SqliteAttrRepository::try_new(conn)?;

    let parts = part_repo.list_all_parts()?;
    let attr_types = attr_repo.list_attr_types()?;
    let authorizations = attr_repo.list_authorizations()?;

    let type_names: HashMap<AttrTypeId, &str> = attr_types
        .iter()
        .map(|attr_type| (attr_type.uuid, attr_type.name.as_str()))
        .collect();

    let mut direct_names: HashMap<PartId, Vec<String>> = HashMap::new();
    for authorization in &authorizations {
        if let Some(name) = type_names.get(&authorization.attr_type_uuid) {
            direct_names
                .entry(authorization.part_uuid)
                .or_default()
                .push((*name).to_string());
        }
    }
    for names in direct_names.values_mut() {
        names.sort();
    }

    // list_all_parts is name-ordered, so every bucket stays ordered.
    let mut children_of: HashMap<Option<PartId>, Vec<Part>> = HashMap::new();
    for part in parts {
        children_of.entry(part.parent_uuid).or_default().push(part);
    }

    let roots = children_of.remove(&None).unwrap_or_default();
    Ok(roots
        .into_iter()
        .map(|part| build_node(part, &mut children_of, &mut direct_names))
        .collect())
}

/// Serializes the taxonomy forest as pretty-printed JSON.
pub fn taxonomy_json(conn: &Connection) -> Result<String, ExportError> {
    let tree = taxonomy_tree(conn)?;
    serde_json::to_string_pretty(&tree).map_err(Into::into)
}

fn build_node(
    part: Part,
    children_of: &mut HashMap<Option<PartId>, Vec<Part>>,
    direct_names: &mut HashMap<PartId, Vec<String>>,
) -> TaxonomyNode {
    let children = children_of
        .remove(&Some(part.uuid))
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_node(child, children_of, direct_names))
        .collect();

    TaxonomyNode {
        name: part.name,
        note: part.note,
        attr_types: direct_names.remove(&part.uuid).unwrap_or_default(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::TaxonomyNode;

    #[test]
    fn empty_keys_are_absent_from_json() {
        let node = TaxonomyNode {
            name: "CPU".to_string(),
            note: None,
            attr_types: Vec::new(),
            children: Vec::new(),
        };
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "{\"name\":\"CPU\"}");
    }

    #[test]
    fn populated_keys_serialize_in_order() {
        let node = TaxonomyNode {
            name: "CPU".to_string(),
            note: Some("processors".to_string()),
            attr_types: vec!["Frequency".to_string()],
            children: vec![TaxonomyNode {
                name: "Pentium".to_string(),
                note: None,
                attr_types: Vec::new(),
                children: Vec::new(),
            }],
        };
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(
            json,
            "{\"name\":\"CPU\",\"note\":\"processors\",\"attr_types\":[\"Frequency\"],\"children\":[{\"name\":\"Pentium\"}]}"
        );
    }
}
