//! Construction-time checks that a connection can back a mapped entity.

use super::{RepoError, RepoResult};
use crate::db::migrations::latest_version;
use crate::model::meta::EntityMeta;
use rusqlite::Connection;

/// Verifies the schema version, then the entity's table and mapped columns.
pub(crate) fn ensure_entity_ready(conn: &Connection, meta: &'static EntityMeta) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, meta.table)? {
        return Err(RepoError::MissingRequiredTable(meta.table));
    }

    for column in meta.columns() {
        if !table_has_column(conn, meta.table, column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: meta.table,
                column,
            });
        }
    }

    for association in meta.associations {
        if !table_exists(conn, association.target.table)? {
            return Err(RepoError::MissingRequiredTable(association.target.table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
