use roster_core::db::migrations::latest_version;
use roster_core::db::{open_db, open_db_in_memory, open_db_with_config, DbConfig, DbError};
use roster_core::{RepoError, Session, SqliteMemberRepository};
use rusqlite::Connection;
use std::time::Duration;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "team");
    assert_table_exists(&conn, "member");
    assert_index_exists(&conn, "idx_member_team_id");
    assert_index_exists(&conn, "idx_member_username");
}

#[test]
fn opened_connections_enforce_foreign_keys() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn
        .execute(
            "INSERT INTO member (username, age, team_id) VALUES ('member1', 10, 999)",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"));
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute("INSERT INTO team (name) VALUES ('teamA')", [])
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let teams: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM team", [], |row| row.get(0))
        .unwrap();
    assert_eq!(teams, 1);
}

#[test]
fn open_db_with_config_applies_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.db");

    let conn = open_db_with_config(
        &path,
        &DbConfig::with_busy_timeout(Duration::from_millis(250)),
    )
    .unwrap();
    let timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 250);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let mut conn = Connection::open_in_memory().unwrap();
    let session = Session::begin(&mut conn).unwrap();

    match SqliteMemberRepository::try_new(&session) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, latest_version());
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn repository_rejects_schema_missing_mapped_column() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE team (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE member (id INTEGER PRIMARY KEY, username TEXT NOT NULL, team_id INTEGER);
         PRAGMA user_version = {};",
        latest_version()
    ))
    .unwrap();
    let session = Session::begin(&mut conn).unwrap();

    match SqliteMemberRepository::try_new(&session) {
        Err(RepoError::MissingRequiredColumn { table, column }) => {
            assert_eq!(table, "member");
            assert_eq!(column, "age");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("incomplete schema must be rejected"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object(conn, "index", index_name);
}

fn assert_schema_object(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
