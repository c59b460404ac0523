//! Repository layer abstractions and SQLite-backed implementations.
//!
//! # Responsibility
//! - Define entity-oriented data access contracts (`CrudRepository`,
//!   `MemberRepository`, `TeamRepository`).
//! - Keep SQL, identity tracking and query resolution behind those contracts.
//!
//! # Invariants
//! - Repositories are constructed over a migrated connection only; mapping
//!   and query-method problems surface at construction, not at call time.
//! - Writes run `Entity::validate()` before touching the store.
//! - Absence is `Ok(None)`; `NotFound` is reserved for operations that
//!   require an existing row.

use crate::db::DbError;
use crate::model::EntityValidationError;
use crate::query::QueryError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod crud;
pub mod member_repo;
mod schema;
pub mod team_repo;

pub use crud::{CrudRepository, SqliteRepository};
pub use member_repo::{MemberRepository, SqliteMemberRepository};
pub use team_repo::{SqliteTeamRepository, TeamRepository};

/// Result type used by repository and session operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from repository and session operations.
#[derive(Debug)]
pub enum RepoError {
    /// Entity rule violation caught before writing.
    Validation(EntityValidationError),
    /// Store unreachable or any SQLite failure not classified below.
    Db(DbError),
    /// Unique, foreign-key, not-null or check constraint rejected a write.
    ConstraintViolation(rusqlite::Error),
    /// A lock could not be acquired within the connection busy timeout.
    ConcurrencyConflict(rusqlite::Error),
    NotFound {
        entity: &'static str,
        id: i64,
    },
    /// A single-result method matched more than one row.
    NonUniqueResult {
        method: &'static str,
    },
    Query(QueryError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted into an entity.
    InvalidData(String),
    /// A managed instance is mutably borrowed while the session needs it.
    EntityBorrowed(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::ConstraintViolation(err) => write!(f, "constraint violation: {err}"),
            Self::ConcurrencyConflict(err) => write!(f, "lock conflict: {err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::NonUniqueResult { method } => {
                write!(f, "`{method}` expected at most one result, found more")
            }
            Self::Query(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "repository requires column `{column}` in table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid data: {message}"),
            Self::EntityBorrowed(entity) => {
                write!(f, "{entity} instance is borrowed elsewhere")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::ConstraintViolation(err) => Some(err),
            Self::ConcurrencyConflict(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::NonUniqueResult { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
            Self::EntityBorrowed(_) => None,
        }
    }
}

impl From<EntityValidationError> for RepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(value),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::ConcurrencyConflict(value)
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RepoError;
    use rusqlite::ffi;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn sqlite_codes_are_classified() {
        assert!(matches!(
            RepoError::from(sqlite_failure(ffi::SQLITE_CONSTRAINT)),
            RepoError::ConstraintViolation(_)
        ));
        assert!(matches!(
            RepoError::from(sqlite_failure(ffi::SQLITE_BUSY)),
            RepoError::ConcurrencyConflict(_)
        ));
        assert!(matches!(
            RepoError::from(sqlite_failure(ffi::SQLITE_LOCKED)),
            RepoError::ConcurrencyConflict(_)
        ));
        assert!(matches!(
            RepoError::from(sqlite_failure(ffi::SQLITE_IOERR)),
            RepoError::Db(_)
        ));
    }

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = RepoError::NotFound {
            entity: "Member",
            id: 42,
        };
        assert_eq!(err.to_string(), "Member not found: 42");
    }
}
