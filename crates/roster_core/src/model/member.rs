//! Member entity.
//!
//! # Responsibility
//! - Hold member state and its many-to-one team reference.
//! - Declare the `member` table mapping and the named queries registered on it.
//!
//! # Invariants
//! - `id` is assigned once at first persist and never changes.
//! - A member references at most one team, by id. The reference is only
//!   loaded on request (`MemberRepository::load_team`).

use super::meta::{AssociationMeta, EntityMeta, FieldMeta, NamedQuery};
use super::team::{Team, TeamId, TEAM_META};
use super::{prefixed, sealed, Entity, EntityValidationError};
use crate::query::QueryError;
use crate::repo::RepoResult;
use crate::session::{IdentityMap, Session};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

pub type MemberId = i64;

pub static MEMBER_META: EntityMeta = EntityMeta {
    name: "Member",
    table: "member",
    id: FieldMeta {
        property: "id",
        column: "id",
    },
    fields: &[
        FieldMeta {
            property: "username",
            column: "username",
        },
        FieldMeta {
            property: "age",
            column: "age",
        },
    ],
    associations: &[AssociationMeta {
        property: "team",
        join_column: "team_id",
        target: &TEAM_META,
    }],
    named_queries: &[NamedQuery {
        name: "Member.findByUsername",
        query: "SELECT * FROM member WHERE username = :username",
    }],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: Option<MemberId>,
    pub username: String,
    pub age: i32,
    team_id: Option<TeamId>,
}

impl Member {
    /// Creates an unsaved member with age `0` and no team.
    pub fn new(username: impl Into<String>) -> Self {
        Self::with_age(username, 0)
    }

    pub fn with_age(username: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            username: username.into(),
            age,
            team_id: None,
        }
    }

    /// Creates an unsaved member that already belongs to `team`.
    ///
    /// # Errors
    /// - `TransientTeam` when `team` has not been saved.
    pub fn with_team(
        username: impl Into<String>,
        age: i32,
        team: &Team,
    ) -> Result<Self, EntityValidationError> {
        let mut member = Self::with_age(username, age);
        member.change_team(team)?;
        Ok(member)
    }

    pub fn id(&self) -> Option<MemberId> {
        self.id
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team_id
    }

    /// Points this member at `team`. Written on the next flush when managed.
    pub fn change_team(&mut self, team: &Team) -> Result<(), EntityValidationError> {
        let team_id = team.id().ok_or_else(|| EntityValidationError::TransientTeam {
            name: team.name.clone(),
        })?;
        self.team_id = Some(team_id);
        Ok(())
    }

    pub fn leave_team(&mut self) {
        self.team_id = None;
    }
}

impl sealed::Sealed for Member {}

impl Entity for Member {
    fn meta() -> &'static EntityMeta {
        &MEMBER_META
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
        if self.username.trim().is_empty() {
            return Err(EntityValidationError::BlankUsername);
        }
        if self.age < 0 {
            return Err(EntityValidationError::NegativeAge(self.age));
        }
        Ok(())
    }

    fn column_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("username", Value::Text(self.username.clone())),
            ("age", Value::Integer(i64::from(self.age))),
            ("team_id", self.team_id.map_or(Value::Null, Value::Integer)),
        ]
    }

    fn from_row(row: &Row<'_>, prefix: &str) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.get(prefixed(prefix, "id").as_str())?),
            username: row.get(prefixed(prefix, "username").as_str())?,
            age: row.get(prefixed(prefix, "age").as_str())?,
            team_id: row.get(prefixed(prefix, "team_id").as_str())?,
        })
    }

    fn identity_map<'s>(session: &'s Session<'_>) -> &'s RefCell<IdentityMap<Self>> {
        &session.members
    }

    fn hydrate_association(
        session: &Session<'_>,
        association: &'static AssociationMeta,
        row: &Row<'_>,
        prefix: &str,
        read_only: bool,
    ) -> RepoResult<()> {
        if association.property != "team" {
            return Err(QueryError::UnknownAssociation {
                entity: MEMBER_META.name,
                association: association.property.to_string(),
            }
            .into());
        }
        // Outer join with no team: nothing to hydrate.
        let team_id: Option<TeamId> = row.get(prefixed(prefix, "id").as_str())?;
        if team_id.is_some() {
            session.hydrate::<Team>(row, prefix, read_only)?;
        }
        Ok(())
    }
}
