//! Read-only projections built from query rows.

use crate::query::FromRow;
use crate::repo::RepoResult;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::member::MemberId;

/// Member summary with its team name. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: MemberId,
    pub username: String,
    pub team_name: Option<String>,
}

impl MemberDto {
    pub fn new(id: MemberId, username: impl Into<String>, team_name: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            team_name,
        }
    }
}

impl FromRow for MemberDto {
    /// Reads `id`, `username` and `team_name` columns.
    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            team_name: row.get("team_name")?,
        })
    }
}
