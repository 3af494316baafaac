//! Attribute repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for units, attribute types, authorizations,
//!   deduplicated attr values and part assignments.
//! - Own the lookup-or-create attr logic with atomic assignment semantics.
//!
//! # Invariants
//! - One `attrs` row per (attribute type, canonical value key); parts share
//!   rows through `part_attr_assignments`.
//! - `assign_attr` runs lookup-or-create plus assignment in one immediate
//!   transaction.
//! - The resolved authorization set follows `parts.parent_uuid` upward with
//!   a bounded recursion depth.

use crate::model::attr::{Attr, AttrId, AttrType, AttrTypeId, AttrValue, Authorization, NewAttrType};
use crate::model::part::{Part, PartId, MAX_TAXONOMY_DEPTH};
use crate::model::unit::{render_value, NewUnit, Unit, UnitId};
use crate::repo::part_repo::{PartRepository, SqlitePartRepository};
use crate::repo::{
    bool_to_int, ensure_schema_version, parse_bool, parse_uuid, table_exists, table_has_column,
    RepoError, RepoResult,
};
use rusqlite::{params, Connection, Params, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const UNIT_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    label,
    format,
    note
FROM units";

const ATTR_TYPE_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    unit_uuid,
    from_to,
    multi_value,
    note
FROM attr_types";

/// Read model for one attribute carried by a part.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    /// Stable attr id (shared across parts carrying the same value).
    pub attr_uuid: AttrId,
    /// Owning attribute type.
    pub attr_type_uuid: AttrTypeId,
    /// Attribute type name, e.g. `Frequency`.
    pub attr_type_name: String,
    /// Unit short name, e.g. `MHz`.
    pub unit_name: String,
    /// Unit long label, e.g. `Megahertz`.
    pub unit_label: String,
    /// Decoded value.
    pub value: AttrValue,
    /// Value rendered through the unit format, e.g. `2800 MHz`.
    pub rendered: String,
}

/// Repository interface for attribute operations.
pub trait AttrRepository {
    /// Creates one unit; unit names are unique.
    fn create_unit(&self, new_unit: &NewUnit) -> RepoResult<Unit>;
    /// Gets one unit by id.
    fn get_unit(&self, unit_uuid: UnitId) -> RepoResult<Option<Unit>>;
    /// Gets one unit by exact name.
    fn find_unit_by_name(&self, name: &str) -> RepoResult<Option<Unit>>;
    /// Lists every unit, ordered by name.
    fn list_units(&self) -> RepoResult<Vec<Unit>>;
    /// Creates one attribute type; names are not unique across units.
    fn create_attr_type(&self, new_attr_type: &NewAttrType) -> RepoResult<AttrType>;
    /// Gets one attribute type by id.
    fn get_attr_type(&self, attr_type_uuid: AttrTypeId) -> RepoResult<Option<AttrType>>;
    /// Lists attribute types matching one exact name.
    fn find_attr_types_by_name(&self, name: &str) -> RepoResult<Vec<AttrType>>;
    /// Lists every attribute type, ordered by name.
    fn list_attr_types(&self) -> RepoResult<Vec<AttrType>>;
    /// Grants one attribute type on one part.
    fn insert_authorization(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    ) -> RepoResult<Authorization>;
    /// Gets one direct grant, ignoring inherited ones.
    fn get_authorization(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    ) -> RepoResult<Option<Authorization>>;
    /// Lists every direct grant.
    fn list_authorizations(&self) -> RepoResult<Vec<Authorization>>;
    /// Lists attribute types usable by one part, direct and inherited.
    fn authorized_attr_types(&self, part_uuid: PartId) -> RepoResult<Vec<AttrType>>;
    /// Looks up or creates the deduplicated attr row and assigns it to the
    /// part, atomically.
    fn assign_attr(
        &self,
        part_uuid: PartId,
        attr_type: &AttrType,
        value: &AttrValue,
    ) -> RepoResult<Attr>;
    /// Lists attributes carried by one part, with unit rendering.
    fn attributes_of(&self, part_uuid: PartId) -> RepoResult<Vec<AttributeRecord>>;
    /// Gets one part by id (existence checks, inheritance walks).
    fn get_part(&self, part_uuid: PartId) -> RepoResult<Option<Part>>;
}

/// SQLite-backed attribute repository.
pub struct SqliteAttrRepository<'conn> {
    conn: &'conn Connection,
    parts: SqlitePartRepository<'conn>,
}

impl<'conn> SqliteAttrRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let parts = SqlitePartRepository::try_new(conn)?;
        ensure_attr_connection_ready(conn)?;
        Ok(Self { conn, parts })
    }

    fn query_units<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<Unit>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut units = Vec::new();
        while let Some(row) = rows.next()? {
            units.push(parse_unit_row(row)?);
        }
        Ok(units)
    }

    fn query_attr_types<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<AttrType>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut attr_types = Vec::new();
        while let Some(row) = rows.next()? {
            attr_types.push(parse_attr_type_row(row)?);
        }
        Ok(attr_types)
    }
}

impl AttrRepository for SqliteAttrRepository<'_> {
    fn create_unit(&self, new_unit: &NewUnit) -> RepoResult<Unit> {
        if self.find_unit_by_name(&new_unit.name)?.is_some() {
            return Err(RepoError::NameConflict {
                entity: "unit",
                name: new_unit.name.clone(),
            });
        }

        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO units (uuid, name, label, format, note)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                uuid.to_string(),
                new_unit.name.as_str(),
                new_unit.label.as_str(),
                new_unit.format.as_deref(),
                new_unit.note.as_deref(),
            ],
        )?;

        self.get_unit(uuid)?.ok_or(RepoError::NotFound {
            entity: "unit",
            id: uuid,
        })
    }

    fn get_unit(&self, unit_uuid: UnitId) -> RepoResult<Option<Unit>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{UNIT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([unit_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_unit_row(row)?));
        }
        Ok(None)
    }

    fn find_unit_by_name(&self, name: &str) -> RepoResult<Option<Unit>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{UNIT_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_unit_row(row)?));
        }
        Ok(None)
    }

    fn list_units(&self) -> RepoResult<Vec<Unit>> {
        self.query_units(&format!("{UNIT_SELECT_SQL} ORDER BY name ASC;"), [])
    }

    fn create_attr_type(&self, new_attr_type: &NewAttrType) -> RepoResult<AttrType> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO attr_types (uuid, name, unit_uuid, from_to, multi_value, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                uuid.to_string(),
                new_attr_type.name.as_str(),
                new_attr_type.unit_uuid.to_string(),
                bool_to_int(new_attr_type.from_to),
                bool_to_int(new_attr_type.multi_value),
                new_attr_type.note.as_deref(),
            ],
        )?;

        self.get_attr_type(uuid)?.ok_or(RepoError::NotFound {
            entity: "attr_type",
            id: uuid,
        })
    }

    fn get_attr_type(&self, attr_type_uuid: AttrTypeId) -> RepoResult<Option<AttrType>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ATTR_TYPE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([attr_type_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_attr_type_row(row)?));
        }
        Ok(None)
    }

    fn find_attr_types_by_name(&self, name: &str) -> RepoResult<Vec<AttrType>> {
        self.query_attr_types(
            &format!("{ATTR_TYPE_SELECT_SQL} WHERE name = ?1 ORDER BY uuid ASC;"),
            [name],
        )
    }

    fn list_attr_types(&self) -> RepoResult<Vec<AttrType>> {
        self.query_attr_types(
            &format!("{ATTR_TYPE_SELECT_SQL} ORDER BY name ASC, uuid ASC;"),
            [],
        )
    }

    fn insert_authorization(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    ) -> RepoResult<Authorization> {
        if self.get_authorization(part_uuid, attr_type_uuid)?.is_some() {
            return Err(RepoError::DuplicateAuthorization {
                part_uuid,
                attr_type_uuid,
            });
        }

        self.conn.execute(
            "INSERT INTO attr_type_authorizations (part_uuid, attr_type_uuid)
             VALUES (?1, ?2);",
            params![part_uuid.to_string(), attr_type_uuid.to_string()],
        )?;

        Ok(Authorization {
            part_uuid,
            attr_type_uuid,
        })
    }

    fn get_authorization(
        &self,
        part_uuid: PartId,
        attr_type_uuid: AttrTypeId,
    ) -> RepoResult<Option<Authorization>> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM attr_type_authorizations
                WHERE part_uuid = ?1 AND attr_type_uuid = ?2
            );",
            params![part_uuid.to_string(), attr_type_uuid.to_string()],
            |row| row.get(0),
        )?;

        if exists == 1 {
            return Ok(Some(Authorization {
                part_uuid,
                attr_type_uuid,
            }));
        }
        Ok(None)
    }

    fn list_authorizations(&self) -> RepoResult<Vec<Authorization>> {
        let mut stmt = self.conn.prepare(
            "SELECT part_uuid, attr_type_uuid
             FROM attr_type_authorizations
             ORDER BY part_uuid ASC, attr_type_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut authorizations = Vec::new();
        while let Some(row) = rows.next()? {
            let part_text: String = row.get("part_uuid")?;
            let attr_type_text: String = row.get("attr_type_uuid")?;
            authorizations.push(Authorization {
                part_uuid: parse_uuid(&part_text, "attr_type_authorizations.part_uuid")?,
                attr_type_uuid: parse_uuid(
                    &attr_type_text,
                    "attr_type_authorizations.attr_type_uuid",
                )?,
            });
        }
        Ok(authorizations)
    }

    fn authorized_attr_types(&self, part_uuid: PartId) -> RepoResult<Vec<AttrType>> {
        // Depth guard covers parent cycles that escaped the service checks.
        self.query_attr_types(
            "WITH RECURSIVE lineage(part_uuid, depth) AS (
                SELECT uuid, 0 FROM parts WHERE uuid = ?1
                UNION
                SELECT p.parent_uuid, lineage.depth + 1
                FROM parts p
                JOIN lineage ON lineage.part_uuid = p.uuid
                WHERE p.parent_uuid IS NOT NULL
                  AND lineage.depth < ?2
            )
            SELECT DISTINCT
                at.uuid,
                at.name,
                at.unit_uuid,
                at.from_to,
                at.multi_value,
                at.note
            FROM lineage
            JOIN attr_type_authorizations auth ON auth.part_uuid = lineage.part_uuid
            JOIN attr_types at ON at.uuid = auth.attr_type_uuid
            ORDER BY at.name ASC, at.uuid ASC;",
            params![part_uuid.to_string(), MAX_TAXONOMY_DEPTH as i64],
        )
    }

    fn assign_attr(
        &self,
        part_uuid: PartId,
        attr_type: &AttrType,
        value: &AttrValue,
    ) -> RepoResult<Attr> {
        let value_key = value.canonical_key();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let attr = match find_attr(&tx, attr_type, &value_key)? {
            Some(attr) => attr,
            None => {
                let (value_text, value_from, value_to) = value_columns(value);
                // OR IGNORE keeps a concurrent insert of the same canonical
                // key from failing the whole assignment.
                tx.execute(
                    "INSERT OR IGNORE INTO attrs
                        (uuid, attr_type_uuid, value, value_from, value_to, value_key)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        Uuid::new_v4().to_string(),
                        attr_type.uuid.to_string(),
                        value_text,
                        value_from,
                        value_to,
                        value_key.as_str(),
                    ],
                )?;
                find_attr(&tx, attr_type, &value_key)?.ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "attr row missing after insert for key `{value_key}`"
                    ))
                })?
            }
        };

        let assigned: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM part_attr_assignments
                WHERE part_uuid = ?1 AND attr_uuid = ?2
            );",
            params![part_uuid.to_string(), attr.uuid.to_string()],
            |row| row.get(0),
        )?;
        if assigned == 1 {
            // Dropping the transaction rolls back the lookup-or-create.
            return Err(RepoError::DuplicateAssignment {
                part_uuid,
                attr_uuid: attr.uuid,
            });
        }

        tx.execute(
            "INSERT INTO part_attr_assignments (part_uuid, attr_uuid)
             VALUES (?1, ?2);",
            params![part_uuid.to_string(), attr.uuid.to_string()],
        )?;

        tx.commit()?;
        Ok(attr)
    }

    fn attributes_of(&self, part_uuid: PartId) -> RepoResult<Vec<AttributeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                a.uuid          AS attr_uuid,
                at.uuid         AS attr_type_uuid,
                at.name         AS attr_type_name,
                at.from_to      AS from_to,
                at.multi_value  AS multi_value,
                a.value         AS value,
                a.value_from    AS value_from,
                a.value_to      AS value_to,
                u.name          AS unit_name,
                u.label         AS unit_label,
                u.format        AS unit_format
             FROM part_attr_assignments pa
             JOIN attrs a ON a.uuid = pa.attr_uuid
             JOIN attr_types at ON at.uuid = a.attr_type_uuid
             JOIN units u ON u.uuid = at.unit_uuid
             WHERE pa.part_uuid = ?1
             ORDER BY at.name ASC, a.uuid ASC;",
        )?;

        let mut rows = stmt.query([part_uuid.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_attribute_record(row)?);
        }
        Ok(records)
    }

    fn get_part(&self, part_uuid: PartId) -> RepoResult<Option<Part>> {
        self.parts.get_part(part_uuid)
    }
}

fn parse_unit_row(row: &Row<'_>) -> RepoResult<Unit> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Unit {
        uuid: parse_uuid(&uuid_text, "units.uuid")?,
        name: row.get("name")?,
        label: row.get("label")?,
        format: row.get("format")?,
        note: row.get("note")?,
    })
}

fn parse_attr_type_row(row: &Row<'_>) -> RepoResult<AttrType> {
    let uuid_text: String = row.get("uuid")?;
    let unit_text: String = row.get("unit_uuid")?;
    Ok(AttrType {
        uuid: parse_uuid(&uuid_text, "attr_types.uuid")?,
        name: row.get("name")?,
        unit_uuid: parse_uuid(&unit_text, "attr_types.unit_uuid")?,
        from_to: parse_bool(row.get("from_to")?, "attr_types.from_to")?,
        multi_value: parse_bool(row.get("multi_value")?, "attr_types.multi_value")?,
        note: row.get("note")?,
    })
}

fn parse_attribute_record(row: &Row<'_>) -> RepoResult<AttributeRecord> {
    let attr_text: String = row.get("attr_uuid")?;
    let attr_type_text: String = row.get("attr_type_uuid")?;
    let value = parse_attr_value(
        parse_bool(row.get("from_to")?, "attr_types.from_to")?,
        parse_bool(row.get("multi_value")?, "attr_types.multi_value")?,
        row.get("value")?,
        row.get("value_from")?,
        row.get("value_to")?,
    )?;
    let unit_format: Option<String> = row.get("unit_format")?;
    let rendered = render_value(unit_format.as_deref(), &value.display_text());

    Ok(AttributeRecord {
        attr_uuid: parse_uuid(&attr_text, "attrs.uuid")?,
        attr_type_uuid: parse_uuid(&attr_type_text, "attrs.attr_type_uuid")?,
        attr_type_name: row.get("attr_type_name")?,
        unit_name: row.get("unit_name")?,
        unit_label: row.get("unit_label")?,
        value,
        rendered,
    })
}

fn find_attr(conn: &Connection, attr_type: &AttrType, value_key: &str) -> RepoResult<Option<Attr>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, value, value_from, value_to
         FROM attrs
         WHERE attr_type_uuid = ?1 AND value_key = ?2;",
    )?;
    let mut rows = stmt.query(params![attr_type.uuid.to_string(), value_key])?;
    if let Some(row) = rows.next()? {
        let uuid_text: String = row.get("uuid")?;
        let value = parse_attr_value(
            attr_type.from_to,
            attr_type.multi_value,
            row.get("value")?,
            row.get("value_from")?,
            row.get("value_to")?,
        )?;
        return Ok(Some(Attr {
            uuid: parse_uuid(&uuid_text, "attrs.uuid")?,
            attr_type_uuid: attr_type.uuid,
            value,
        }));
    }
    Ok(None)
}

fn value_columns(value: &AttrValue) -> (Option<String>, Option<f64>, Option<f64>) {
    match value {
        AttrValue::Scalar(text) => (Some(text.clone()), None, None),
        AttrValue::Range { from, to } => (None, Some(*from), Some(*to)),
        // Multi stores its canonical JSON array in the value column.
        AttrValue::Multi(_) => (Some(value.canonical_key()), None, None),
    }
}

fn parse_attr_value(
    from_to: bool,
    multi_value: bool,
    value: Option<String>,
    value_from: Option<f64>,
    value_to: Option<f64>,
) -> RepoResult<AttrValue> {
    if from_to {
        return match (value_from, value_to) {
            (Some(from), Some(to)) => Ok(AttrValue::Range { from, to }),
            _ => Err(RepoError::InvalidData(
                "range attr misses value_from/value_to in attrs".to_string(),
            )),
        };
    }

    let text = value.ok_or_else(|| {
        RepoError::InvalidData("non-range attr misses value in attrs".to_string())
    })?;

    if multi_value {
        let entries: Vec<String> = serde_json::from_str(&text).map_err(|_| {
            RepoError::InvalidData(format!("invalid multi value json `{text}` in attrs.value"))
        })?;
        return Ok(AttrValue::Multi(entries));
    }

    Ok(AttrValue::Scalar(text))
}

fn ensure_attr_connection_ready(conn: &Connection) -> RepoResult<()> {
    ensure_schema_version(conn)?;

    let required: [(&'static str, &[&'static str]); 5] = [
        ("units", &["uuid", "name", "label", "format", "note"]),
        (
            "attr_types",
            &["uuid", "name", "unit_uuid", "from_to", "multi_value", "note"],
        ),
        ("attr_type_authorizations", &["part_uuid", "attr_type_uuid"]),
        (
            "attrs",
            &["uuid", "attr_type_uuid", "value", "value_from", "value_to", "value_key"],
        ),
        ("part_attr_assignments", &["part_uuid", "attr_uuid"]),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}
