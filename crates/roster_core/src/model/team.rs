//! Team entity.
//!
//! # Invariants
//! - `name` is never blank.
//! - The inverse `members` side is not stored here; it is loaded on demand
//!   through `TeamRepository::load_members`.

use super::meta::{AssociationMeta, EntityMeta, FieldMeta};
use super::{prefixed, sealed, Entity, EntityValidationError};
use crate::query::QueryError;
use crate::repo::RepoResult;
use crate::session::{IdentityMap, Session};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

pub type TeamId = i64;

pub static TEAM_META: EntityMeta = EntityMeta {
    name: "Team",
    table: "team",
    id: FieldMeta {
        property: "id",
        column: "id",
    },
    fields: &[FieldMeta {
        property: "name",
        column: "name",
    }],
    associations: &[],
    named_queries: &[],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    id: Option<TeamId>,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// `None` until the team is saved.
    pub fn id(&self) -> Option<TeamId> {
        self.id
    }
}

impl sealed::Sealed for Team {}

impl Entity for Team {
    fn meta() -> &'static EntityMeta {
        &TEAM_META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        if self.id.is_none() {
            self.id = Some(id);
        }
    }

    fn validate(&self) -> Result<(), EntityValidationError> {
        if self.name.trim().is_empty() {
            return Err(EntityValidationError::BlankTeamName);
        }
        Ok(())
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::Text(self.name.clone()))]
    }

    fn from_row(row: &Row<'_>, prefix: &str) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.get(prefixed(prefix, "id").as_str())?),
            name: row.get(prefixed(prefix, "name").as_str())?,
        })
    }

    fn identity_map<'s>(session: &'s Session<'_>) -> &'s RefCell<IdentityMap<Self>> {
        &session.teams
    }

    fn hydrate_association(
        _session: &Session<'_>,
        association: &'static AssociationMeta,
        _row: &Row<'_>,
        _prefix: &str,
        _read_only: bool,
    ) -> RepoResult<()> {
        Err(QueryError::UnknownAssociation {
            entity: TEAM_META.name,
            association: association.property.to_string(),
        }
        .into())
    }
}
