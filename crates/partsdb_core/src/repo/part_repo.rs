//! Part repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable CRUD APIs over canonical `parts` storage.
//! - Keep taxonomy SQL (children, roots, name lookup) inside the core
//!   persistence boundary.
//!
//! # Invariants
//! - Callers resolve part references to uuids before reaching this layer.
//! - Read paths must reject invalid persisted state instead of masking it.

use crate::model::part::{Part, PartId};
use crate::repo::{
    bool_to_int, ensure_schema_version, parse_bool, parse_uuid, table_exists, table_has_column,
    RepoError, RepoResult,
};
use rusqlite::{params, Connection, Params, Row};
use uuid::Uuid;

pub(crate) const PART_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    note,
    parent_uuid,
    is_standard,
    is_connector,
    created_at,
    updated_at
FROM parts";

/// Resolved input row for part creation.
#[derive(Debug, Clone, Copy)]
pub struct NewPartRow<'a> {
    pub name: &'a str,
    pub note: Option<&'a str>,
    pub parent_uuid: Option<PartId>,
    pub is_standard: bool,
    pub is_connector: bool,
}

/// Repository interface for part taxonomy operations.
pub trait PartRepository {
    /// Creates one part and returns the persisted row.
    fn create_part(&self, row: &NewPartRow<'_>) -> RepoResult<Part>;
    /// Gets one part by id.
    fn get_part(&self, part_uuid: PartId) -> RepoResult<Option<Part>>;
    /// Moves one part under a new parent (or to top level).
    fn set_parent(&self, part_uuid: PartId, parent_uuid: Option<PartId>) -> RepoResult<()>;
    /// Lists direct children ordered by name.
    fn list_children(&self, parent_uuid: PartId) -> RepoResult<Vec<Part>>;
    /// Lists parts without a parent, ordered by name.
    fn list_top_level(&self) -> RepoResult<Vec<Part>>;
    /// Lists parts matching one exact name.
    fn find_parts_by_name(&self, name: &str) -> RepoResult<Vec<Part>>;
    /// Lists every part, ordered by name.
    fn list_all_parts(&self) -> RepoResult<Vec<Part>>;
    /// Lists parts that head at least one system containment edge and sit
    /// under no non-standard container themselves.
    fn system_root_parts(&self) -> RepoResult<Vec<Part>>;
}

/// SQLite-backed part repository.
pub struct SqlitePartRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePartRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_part_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn query_parts<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<Part>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut parts = Vec::new();
        while let Some(row) = rows.next()? {
            parts.push(parse_part_row(row)?);
        }
        Ok(parts)
    }

    fn require_part(&self, part_uuid: PartId) -> RepoResult<Part> {
        self.get_part(part_uuid)?.ok_or(RepoError::NotFound {
            entity: "part",
            id: part_uuid,
        })
    }
}

impl PartRepository for SqlitePartRepository<'_> {
    fn create_part(&self, row: &NewPartRow<'_>) -> RepoResult<Part> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO parts (uuid, name, note, parent_uuid, is_standard, is_connector)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                uuid.to_string(),
                row.name,
                row.note,
                row.parent_uuid.map(|id| id.to_string()),
                bool_to_int(row.is_standard),
                bool_to_int(row.is_connector),
            ],
        )?;

        // Timestamps are server-populated; read the row back.
        self.require_part(uuid)
    }

    fn get_part(&self, part_uuid: PartId) -> RepoResult<Option<Part>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PART_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([part_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_part_row(row)?));
        }
        Ok(None)
    }

    fn set_parent(&self, part_uuid: PartId, parent_uuid: Option<PartId>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE parts
             SET
                parent_uuid = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                part_uuid.to_string(),
                parent_uuid.map(|id| id.to_string()),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "part",
                id: part_uuid,
            });
        }
        Ok(())
    }

    fn list_children(&self, parent_uuid: PartId) -> RepoResult<Vec<Part>> {
        self.query_parts(
            &format!("{PART_SELECT_SQL} WHERE parent_uuid = ?1 ORDER BY name ASC, uuid ASC;"),
            [parent_uuid.to_string()],
        )
    }

    fn list_top_level(&self) -> RepoResult<Vec<Part>> {
        self.query_parts(
            &format!("{PART_SELECT_SQL} WHERE parent_uuid IS NULL ORDER BY name ASC, uuid ASC;"),
            [],
        )
    }

    fn find_parts_by_name(&self, name: &str) -> RepoResult<Vec<Part>> {
        self.query_parts(
            &format!("{PART_SELECT_SQL} WHERE name = ?1 ORDER BY uuid ASC;"),
            [name],
        )
    }

    fn list_all_parts(&self) -> RepoResult<Vec<Part>> {
        self.query_parts(&format!("{PART_SELECT_SQL} ORDER BY name ASC, uuid ASC;"), [])
    }

    fn system_root_parts(&self) -> RepoResult<Vec<Part>> {
        // Conformance edges (NULL system) do not count as containment.
        self.query_parts(
            "SELECT
                p.uuid,
                p.name,
                p.note,
                p.parent_uuid,
                p.is_standard,
                p.is_connector,
                p.created_at,
                p.updated_at
             FROM parts p
             WHERE p.is_standard = 0
               AND EXISTS (
                   SELECT 1
                   FROM part_connections c
                   WHERE c.system_uuid IS NOT NULL
                     AND c.container_part_uuid = p.uuid
               )
               AND NOT EXISTS (
                   SELECT 1
                   FROM part_connections c
                   JOIN parts container ON container.uuid = c.container_part_uuid
                   WHERE c.content_part_uuid = p.uuid
                     AND container.is_standard = 0
               )
             ORDER BY p.name ASC, p.uuid ASC;",
            [],
        )
    }
}

pub(crate) fn parse_part_row(row: &Row<'_>) -> RepoResult<Part> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "parts.uuid")?;

    let parent_uuid = match row.get::<_, Option<String>>("parent_uuid")? {
        Some(text) => Some(parse_uuid(&text, "parts.parent_uuid")?),
        None => None,
    };

    Ok(Part {
        uuid,
        name: row.get("name")?,
        note: row.get("note")?,
        parent_uuid,
        is_standard: parse_bool(row.get("is_standard")?, "parts.is_standard")?,
        is_connector: parse_bool(row.get("is_connector")?, "parts.is_connector")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn ensure_part_connection_ready(conn: &Connection) -> RepoResult<()> {
    ensure_schema_version(conn)?;

    for table in ["parts", "part_connections"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    for column in [
        "uuid",
        "name",
        "note",
        "parent_uuid",
        "is_standard",
        "is_connector",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "parts", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "parts",
                column,
            });
        }
    }

    Ok(())
}
