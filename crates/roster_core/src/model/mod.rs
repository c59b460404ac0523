//! Persistent entities and read-only projections.
//!
//! # Responsibility
//! - Define `Member`, `Team` and the `MemberDto` projection.
//! - Declare each entity's static mapping (`EntityMeta`).
//! - Bridge entities to the session through the sealed `Entity` trait.
//!
//! # Invariants
//! - An entity id is assigned once, by the session, at first persist.
//! - `Entity::validate` runs before every insert and every flushed update.

use crate::repo::RepoResult;
use crate::session::{IdentityMap, Session};
use rusqlite::types::Value;
use rusqlite::Row;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub mod dto;
pub mod member;
pub mod meta;
pub mod team;

use meta::{AssociationMeta, EntityMeta};

/// Rule violations detected before a row is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    BlankUsername,
    NegativeAge(i32),
    BlankTeamName,
    /// The referenced team has not been saved yet, so it has no id.
    TransientTeam { name: String },
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankUsername => write!(f, "member username must not be blank"),
            Self::NegativeAge(age) => write!(f, "member age must not be negative, got {age}"),
            Self::BlankTeamName => write!(f, "team name must not be blank"),
            Self::TransientTeam { name } => {
                write!(f, "team `{name}` must be saved before a member can reference it")
            }
        }
    }
}

impl Error for EntityValidationError {}

mod sealed {
    pub trait Sealed {}
}

/// A mapped type the session can persist, hydrate and track.
///
/// Sealed: the set of entities is fixed by the schema migrations.
pub trait Entity: sealed::Sealed + Clone + PartialEq + Debug + 'static {
    fn meta() -> &'static EntityMeta;

    fn id(&self) -> Option<i64>;

    /// Records the generated id. Ignored once an id is present.
    #[doc(hidden)]
    fn assign_id(&mut self, id: i64);

    fn validate(&self) -> Result<(), EntityValidationError>;

    /// Non-id column values, in `EntityMeta::columns` order.
    fn column_values(&self) -> Vec<(&'static str, Value)>;

    /// Builds an instance from columns named `<prefix><column>`.
    fn from_row(row: &Row<'_>, prefix: &str) -> RepoResult<Self>;

    #[doc(hidden)]
    fn identity_map<'s>(session: &'s Session<'_>) -> &'s RefCell<IdentityMap<Self>>;

    /// Hydrates an association fetched in the same row under `prefix`.
    ///
    /// Newly tracked instances take the query's read-only hint.
    #[doc(hidden)]
    fn hydrate_association(
        session: &Session<'_>,
        association: &'static AssociationMeta,
        row: &Row<'_>,
        prefix: &str,
        read_only: bool,
    ) -> RepoResult<()>;
}

pub(crate) fn prefixed(prefix: &str, column: &str) -> String {
    format!("{prefix}{column}")
}
