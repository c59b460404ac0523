//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Apply `DbConfig` and the pragmas the entity store depends on.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`, so `member.team_id` is enforced.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbConfig, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file with default settings and applies all
/// pending migrations.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_config(path, &DbConfig::default())
}

/// Opens a SQLite database file with explicit settings.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with_config(path: impl AsRef<Path>, config: &DbConfig) -> DbResult<Connection> {
    let path = path.as_ref();
    open_logged("file", config, || Connection::open(path))
}

/// Opens a private in-memory SQLite database and applies all pending
/// migrations. Each call yields an independent, empty store.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_logged("memory", &DbConfig::default(), Connection::open_in_memory)
}

fn open_logged<F>(mode: &'static str, config: &DbConfig, connect: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = connect().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
            started_at.elapsed().as_millis()
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn, config) {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} duration_ms={} busy_timeout_ms={}",
        started_at.elapsed().as_millis(),
        config.busy_timeout.as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, config: &DbConfig) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(config.busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
