//! Member/team persistence over SQLite.
//!
//! Repositories run inside a [`Session`], a transaction-scoped unit of work
//! with an identity map. Query methods are registered statically and resolved
//! once per repository: a query attached to the method, a named query on the
//! entity, or a query derived from the method name.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;

pub use db::{open_db, open_db_in_memory, open_db_with_config, DbConfig, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::dto::MemberDto;
pub use model::member::{Member, MemberId};
pub use model::team::{Team, TeamId};
pub use model::{Entity, EntityValidationError};
pub use query::{
    Direction, LockMode, Order, Page, PageRequest, Param, QueryError, QueryExecutor, QueryMethod,
    QueryMethods, QuerySource, Sort,
};
pub use repo::{
    CrudRepository, MemberRepository, RepoError, RepoResult, SqliteMemberRepository,
    SqliteRepository, SqliteTeamRepository, TeamRepository,
};
pub use session::{with_session, Managed, Session};
