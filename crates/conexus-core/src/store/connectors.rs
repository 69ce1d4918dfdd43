//! Connector CRUD (`spec.md` §4.6, `context.connector_management`).
//!
//! Connectors are rows co-resident in the same SQLite file as documents,
//! not a separate store, matching the single-file persisted-state layout
//! `spec.md` §6 describes. Removal defaults to a hard delete; callers that
//! need to keep history pass `RemoveMode::Soft`, which only flips
//! `enabled` to `false` (see DESIGN.md's Open Question decision).

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{ConexusError, ConexusResult};
use crate::types::ConnectorConfig;

/// How `Connectors::remove` disposes of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// Delete the row outright (the default).
    Hard,
    /// Keep the row but set `enabled = false`.
    Soft,
}

/// Filter accepted by `Connectors::list`.
#[derive(Debug, Clone, Default)]
pub struct ConnectorFilter {
    /// Restrict to a single connector kind (e.g. `"github"`).
    pub kind: Option<String>,
    /// Restrict to enabled (`Some(true)`) or disabled (`Some(false)`) connectors.
    pub enabled: Option<bool>,
}

/// Connector CRUD scoped to a `Store`'s connection.
pub struct Connectors<'a> {
    conn: &'a Mutex<Connection>,
}

impl<'a> Connectors<'a> {
    pub(super) fn new(conn: &'a Mutex<Connection>) -> Self {
        Self { conn }
    }

    /// Register a new connector, or update an existing one with the same id.
    pub fn upsert(&self, connector: &ConnectorConfig) -> ConexusResult<()> {
        let conn = self.conn.lock();
        let config_json = serde_json::to_string(&connector.config)?;

        let existing_created_at: Option<i64> = conn
            .query_row("SELECT created_at FROM connectors WHERE id = ?1", params![connector.id], |row| row.get(0))
            .optional()?;
        let created_at = existing_created_at.unwrap_or(connector.created_at);

        conn.execute(
            "INSERT INTO connectors (id, kind, name, config, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                config = excluded.config,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
            params![
                connector.id,
                connector.kind,
                connector.name,
                config_json,
                connector.enabled,
                created_at,
                connector.updated_at
            ],
        )?;
        Ok(())
    }

    /// Fetch a connector by id.
    pub fn get(&self, id: &str) -> ConexusResult<ConnectorConfig> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, kind, name, config, enabled, created_at, updated_at FROM connectors WHERE id = ?1",
                params![id],
                row_to_connector,
            )
            .optional()?;

        row.ok_or_else(|| ConexusError::NotFound { entity: format!("connector {id}") })
    }

    /// List connectors, optionally filtered by kind and/or enabled state.
    pub fn list(&self, filter: &ConnectorFilter) -> ConexusResult<Vec<ConnectorConfig>> {
        let conn = self.conn.lock();
        let mut clauses = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(kind) = &filter.kind {
            clauses.push("kind = ?".to_string());
            params_vec.push(Box::new(kind.clone()));
        }
        if let Some(enabled) = filter.enabled {
            clauses.push("enabled = ?".to_string());
            params_vec.push(Box::new(enabled));
        }

        let where_sql = if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
        let sql = format!(
            "SELECT id, kind, name, config, enabled, created_at, updated_at FROM connectors {where_sql} ORDER BY id"
        );

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_connector)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(ConexusError::from)
    }

    /// Remove a connector per `mode`. A no-op (not an error) if absent.
    pub fn remove(&self, id: &str, mode: RemoveMode) -> ConexusResult<()> {
        let conn = self.conn.lock();
        match mode {
            RemoveMode::Hard => {
                conn.execute("DELETE FROM connectors WHERE id = ?1", params![id])?;
            }
            RemoveMode::Soft => {
                conn.execute("UPDATE connectors SET enabled = 0 WHERE id = ?1", params![id])?;
            }
        }
        Ok(())
    }
}

fn row_to_connector(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectorConfig> {
    let config_str: String = row.get(3)?;
    let config: Value = serde_json::from_str(&config_str).unwrap_or(Value::Null);
    Ok(ConnectorConfig {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        config,
        enabled: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn connector(id: &str, kind: &str, enabled: bool) -> ConnectorConfig {
        ConnectorConfig {
            id: id.to_string(),
            kind: kind.to_string(),
            name: format!("{kind} connector"),
            config: Value::Null,
            enabled,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = Store::open_in_memory().expect("open");
        store.connectors().upsert(&connector("c1", "github", true)).expect("upsert");
        let fetched = store.connectors().get("c1").expect("get");
        assert_eq!(fetched.kind, "github");
        assert!(fetched.enabled);
    }

    #[test]
    fn hard_remove_deletes_row() {
        let store = Store::open_in_memory().expect("open");
        store.connectors().upsert(&connector("c1", "jira", true)).expect("upsert");
        store.connectors().remove("c1", RemoveMode::Hard).expect("remove");
        assert!(matches!(store.connectors().get("c1"), Err(ConexusError::NotFound { .. })));
    }

    #[test]
    fn soft_remove_disables_without_deleting() {
        let store = Store::open_in_memory().expect("open");
        store.connectors().upsert(&connector("c1", "jira", true)).expect("upsert");
        store.connectors().remove("c1", RemoveMode::Soft).expect("remove");
        let fetched = store.connectors().get("c1").expect("get");
        assert!(!fetched.enabled);
    }

    #[test]
    fn list_filters_by_kind_and_enabled() {
        let store = Store::open_in_memory().expect("open");
        store.connectors().upsert(&connector("a", "github", true)).expect("upsert");
        store.connectors().upsert(&connector("b", "github", false)).expect("upsert");
        store.connectors().upsert(&connector("c", "jira", true)).expect("upsert");

        let github_only = store.connectors().list(&ConnectorFilter { kind: Some("github".to_string()), enabled: None }).expect("list");
        assert_eq!(github_only.len(), 2);

        let enabled_only = store.connectors().list(&ConnectorFilter { kind: None, enabled: Some(true) }).expect("list");
        assert_eq!(enabled_only.len(), 2);
    }
}
