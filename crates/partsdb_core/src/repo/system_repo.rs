//! System repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for systems, containment edges and standard
//!   conformance.
//! - Keep the NULL-system encoding of conformance edges inside this file.
//!
//! # Invariants
//! - Containment edges always carry a system id; conformance edges never do.
//! - `quantity` is at least 1 for every persisted edge.

use crate::model::part::{Part, PartId};
use crate::model::system::{ConnectionId, PartConnection, System, SystemId};
use crate::repo::part_repo::{parse_part_row, PartRepository, SqlitePartRepository};
use crate::repo::{
    ensure_schema_version, parse_uuid, table_exists, table_has_column, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Params, Row};
use uuid::Uuid;

const SYSTEM_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    root_part_uuid
FROM systems";

const CONNECTION_SELECT_SQL: &str = "SELECT
    uuid,
    system_uuid,
    container_part_uuid,
    content_part_uuid,
    quantity
FROM part_connections";

/// Repository interface for system composition operations.
pub trait SystemRepository {
    /// Creates one system; system names are unique.
    fn create_system(&self, name: &str, root_part_uuid: PartId) -> RepoResult<System>;
    /// Gets one system by id.
    fn get_system(&self, system_uuid: SystemId) -> RepoResult<Option<System>>;
    /// Gets one system by exact name.
    fn find_system_by_name(&self, name: &str) -> RepoResult<Option<System>>;
    /// Lists systems rooted at one part, ordered by name.
    fn systems_by_root_part(&self, part_uuid: PartId) -> RepoResult<Vec<System>>;
    /// Lists every system, ordered by name.
    fn list_systems(&self) -> RepoResult<Vec<System>>;
    /// Inserts one containment edge and returns the persisted row.
    fn insert_connection(
        &self,
        system_uuid: SystemId,
        container_uuid: PartId,
        content_uuid: PartId,
        quantity: u32,
    ) -> RepoResult<PartConnection>;
    /// Records that one part implements one standard.
    fn insert_conformance(
        &self,
        standard_uuid: PartId,
        part_uuid: PartId,
    ) -> RepoResult<PartConnection>;
    /// Lists one container's outgoing edges within one system, ordered by
    /// content part name.
    fn connections_from(
        &self,
        system_uuid: SystemId,
        container_uuid: PartId,
    ) -> RepoResult<Vec<PartConnection>>;
    /// Gets the edge placing one part within one system, if any.
    fn container_of(
        &self,
        system_uuid: SystemId,
        content_uuid: PartId,
    ) -> RepoResult<Option<PartConnection>>;
    /// Lists standards one part conforms to, ordered by name.
    fn standards_of(&self, part_uuid: PartId) -> RepoResult<Vec<Part>>;
    /// Lists parts conforming to one standard, ordered by name.
    fn conforming_parts(&self, standard_uuid: PartId) -> RepoResult<Vec<Part>>;
    /// Gets one part by id (existence checks, tree expansion).
    fn get_part(&self, part_uuid: PartId) -> RepoResult<Option<Part>>;
}

/// SQLite-backed system repository.
pub struct SqliteSystemRepository<'conn> {
    conn: &'conn Connection,
    parts: SqlitePartRepository<'conn>,
}

impl<'conn> SqliteSystemRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let parts = SqlitePartRepository::try_new(conn)?;
        ensure_system_connection_ready(conn)?;
        Ok(Self { conn, parts })
    }

    fn query_systems<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<System>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut systems = Vec::new();
        while let Some(row) = rows.next()? {
            systems.push(parse_system_row(row)?);
        }
        Ok(systems)
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

    fn require_connection(&self, connection_uuid: ConnectionId) -> RepoResult<PartConnection> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONNECTION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([connection_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return parse_connection_row(row);
        }
        Err(RepoError::NotFound {
            entity: "part_connection",
            id: connection_uuid,
        })
    }

    fn conformance_exists(&self, standard_uuid: PartId, part_uuid: PartId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM part_connections
                WHERE system_uuid IS NULL
                  AND container_part_uuid = ?1
                  AND content_part_uuid = ?2
            );",
            params![standard_uuid.to_string(), part_uuid.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl SystemRepository for SqliteSystemRepository<'_> {
    fn create_system(&self, name: &str, root_part_uuid: PartId) -> RepoResult<System> {
        if self.find_system_by_name(name)?.is_some() {
            return Err(RepoError::NameConflict {
                entity: "system",
                name: name.to_string(),
            });
        }

        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO systems (uuid, name, root_part_uuid)
             VALUES (?1, ?2, ?3);",
            params![uuid.to_string(), name, root_part_uuid.to_string()],
        )?;

        self.get_system(uuid)?.ok_or(RepoError::NotFound {
            entity: "system",
            id: uuid,
        })
    }

    fn get_system(&self, system_uuid: SystemId) -> RepoResult<Option<System>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SYSTEM_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([system_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_system_row(row)?));
        }
        Ok(None)
    }

    fn find_system_by_name(&self, name: &str) -> RepoResult<Option<System>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SYSTEM_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_system_row(row)?));
        }
        Ok(None)
    }

    fn systems_by_root_part(&self, part_uuid: PartId) -> RepoResult<Vec<System>> {
        self.query_systems(
            &format!("{SYSTEM_SELECT_SQL} WHERE root_part_uuid = ?1 ORDER BY name ASC;"),
            [part_uuid.to_string()],
        )
    }

    fn list_systems(&self) -> RepoResult<Vec<System>> {
        self.query_systems(&format!("{SYSTEM_SELECT_SQL} ORDER BY name ASC;"), [])
    }

    fn insert_connection(
        &self,
        system_uuid: SystemId,
        container_uuid: PartId,
        content_uuid: PartId,
        quantity: u32,
    ) -> RepoResult<PartConnection> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO part_connections
                (uuid, system_uuid, container_part_uuid, content_part_uuid, quantity)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                uuid.to_string(),
                system_uuid.to_string(),
                container_uuid.to_string(),
                content_uuid.to_string(),
                i64::from(quantity),
            ],
        )?;

        self.require_connection(uuid)
    }

    fn insert_conformance(
        &self,
        standard_uuid: PartId,
        part_uuid: PartId,
    ) -> RepoResult<PartConnection> {
        if self.conformance_exists(standard_uuid, part_uuid)? {
            return Err(RepoError::DuplicateConformance {
                standard_uuid,
                part_uuid,
            });
        }

        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO part_connections
                (uuid, system_uuid, container_part_uuid, content_part_uuid, quantity)
             VALUES (?1, NULL, ?2, ?3, 1);",
            params![
                uuid.to_string(),
                standard_uuid.to_string(),
                part_uuid.to_string(),
            ],
        )?;

        self.require_connection(uuid)
    }

    fn connections_from(
        &self,
        system_uuid: SystemId,
        container_uuid: PartId,
    ) -> RepoResult<Vec<PartConnection>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                c.uuid,
                c.system_uuid,
                c.container_part_uuid,
                c.content_part_uuid,
                c.quantity
             FROM part_connections c
             JOIN parts content ON content.uuid = c.content_part_uuid
             WHERE c.system_uuid = ?1 AND c.container_part_uuid = ?2
             ORDER BY content.name ASC, content.uuid ASC;",
        )?;
        let mut rows = stmt.query(params![system_uuid.to_string(), container_uuid.to_string()])?;
        let mut connections = Vec::new();
        while let Some(row) = rows.next()? {
            connections.push(parse_connection_row(row)?);
        }
        Ok(connections)
    }

    fn container_of(
        &self,
        system_uuid: SystemId,
        content_uuid: PartId,
    ) -> RepoResult<Option<PartConnection>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONNECTION_SELECT_SQL}
             WHERE system_uuid = ?1 AND content_part_uuid = ?2;"
        ))?;
        let mut rows = stmt.query(params![system_uuid.to_string(), content_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_connection_row(row)?));
        }
        Ok(None)
    }

    fn standards_of(&self, part_uuid: PartId) -> RepoResult<Vec<Part>> {
        self.query_parts(
            "SELECT
                s.uuid,
                s.name,
                s.note,
                s.parent_uuid,
                s.is_standard,
                s.is_connector,
                s.created_at,
                s.updated_at
             FROM part_connections c
             JOIN parts s ON s.uuid = c.container_part_uuid
             WHERE c.system_uuid IS NULL AND c.content_part_uuid = ?1
             ORDER BY s.name ASC, s.uuid ASC;",
            [part_uuid.to_string()],
        )
    }

    fn conforming_parts(&self, standard_uuid: PartId) -> RepoResult<Vec<Part>> {
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
             FROM part_connections c
             JOIN parts p ON p.uuid = c.content_part_uuid
             WHERE c.system_uuid IS NULL AND c.container_part_uuid = ?1
             ORDER BY p.name ASC, p.uuid ASC;",
            [standard_uuid.to_string()],
        )
    }

    fn get_part(&self, part_uuid: PartId) -> RepoResult<Option<Part>> {
        self.parts.get_part(part_uuid)
    }
}

fn parse_system_row(row: &Row<'_>) -> RepoResult<System> {
    let uuid_text: String = row.get("uuid")?;
    let root_text: String = row.get("root_part_uuid")?;
    Ok(System {
        uuid: parse_uuid(&uuid_text, "systems.uuid")?,
        name: row.get("name")?,
        root_part_uuid: parse_uuid(&root_text, "systems.root_part_uuid")?,
    })
}

fn parse_connection_row(row: &Row<'_>) -> RepoResult<PartConnection> {
    let uuid_text: String = row.get("uuid")?;
    let container_text: String = row.get("container_part_uuid")?;
    let content_text: String = row.get("content_part_uuid")?;

    let system_uuid = match row.get::<_, Option<String>>("system_uuid")? {
        Some(text) => Some(parse_uuid(&text, "part_connections.system_uuid")?),
        None => None,
    };

    let raw_quantity: i64 = row.get("quantity")?;
    let quantity = u32::try_from(raw_quantity).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid quantity `{raw_quantity}` in part_connections.quantity"
        ))
    })?;

    Ok(PartConnection {
        uuid: parse_uuid(&uuid_text, "part_connections.uuid")?,
        system_uuid,
        container_uuid: parse_uuid(&container_text, "part_connections.container_part_uuid")?,
        content_uuid: parse_uuid(&content_text, "part_connections.content_part_uuid")?,
        quantity,
    })
}

fn ensure_system_connection_ready(conn: &Connection) -> RepoResult<()> {
    ensure_schema_version(conn)?;

    let required: [(&'static str, &[&'static str]); 2] = [
        ("systems", &["uuid", "name", "root_part_uuid"]),
        (
            "part_connections",
            &[
                "uuid",
                "system_uuid",
                "container_part_uuid",
                "content_part_uuid",
                "quantity",
            ],
        ),
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
