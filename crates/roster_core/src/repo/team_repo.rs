//! Team repository: CRUD, lookup by name and the inverse member collection.

use super::crud::{CrudRepository, SqliteRepository};
use super::schema::ensure_entity_ready;
use super::{RepoError, RepoResult};
use crate::model::member::{Member, MEMBER_META};
use crate::model::team::{Team, TEAM_META};
use crate::query::{Page, PageRequest, Param, QueryExecutor, QueryMethod, QueryMethods, Sort};
use crate::session::{Managed, Session};

const TEAM_QUERY_METHODS: &[QueryMethod] = &[QueryMethod::derived("findByName")];

/// Resolved against the member mapping: the team side owns no column.
const TEAM_MEMBER_QUERY_METHODS: &[QueryMethod] =
    &[QueryMethod::derived("findByTeamOrderByIdAsc")];

pub trait TeamRepository: CrudRepository<Team> {
    fn find_by_name(&self, name: &str) -> RepoResult<Vec<Managed<Team>>>;
    /// Members pointing at `team`, ordered by id. Empty for unsaved teams.
    fn load_members(&self, team: &Managed<Team>) -> RepoResult<Vec<Managed<Member>>>;
}

/// Session-backed team repository.
pub struct SqliteTeamRepository<'s> {
    crud: SqliteRepository<'s, Team>,
    queries: QueryMethods,
    member_queries: QueryMethods,
}

impl<'s> SqliteTeamRepository<'s> {
    pub fn try_new(session: &'s Session<'s>) -> RepoResult<Self> {
        let crud = SqliteRepository::try_new(session)?;
        ensure_entity_ready(session.connection(), &MEMBER_META)?;
        Ok(Self {
            crud,
            queries: QueryMethods::resolve_all(&TEAM_META, TEAM_QUERY_METHODS)?,
            member_queries: QueryMethods::resolve_all(&MEMBER_META, TEAM_MEMBER_QUERY_METHODS)?,
        })
    }

    fn executor(&self) -> QueryExecutor<'s> {
        QueryExecutor::new(self.crud.session())
    }
}

impl CrudRepository<Team> for SqliteTeamRepository<'_> {
    fn save(&self, entity: Team) -> RepoResult<Managed<Team>> {
        self.crud.save(entity)
    }

    fn save_all(&self, entities: Vec<Team>) -> RepoResult<Vec<Managed<Team>>> {
        self.crud.save_all(entities)
    }

    fn find_by_id(&self, id: i64) -> RepoResult<Option<Managed<Team>>> {
        self.crud.find_by_id(id)
    }

    fn exists_by_id(&self, id: i64) -> RepoResult<bool> {
        self.crud.exists_by_id(id)
    }

    fn find_all(&self) -> RepoResult<Vec<Managed<Team>>> {
        self.crud.find_all()
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<Team>>> {
        self.crud.find_all_sorted(sort)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<Team>>> {
        self.crud.find_all_paged(request)
    }

    fn count(&self) -> RepoResult<u64> {
        self.crud.count()
    }

    fn delete(&self, instance: &Managed<Team>) -> RepoResult<()> {
        self.crud.delete(instance)
    }

    fn delete_by_id(&self, id: i64) -> RepoResult<()> {
        self.crud.delete_by_id(id)
    }
}

impl TeamRepository for SqliteTeamRepository<'_> {
    fn find_by_name(&self, name: &str) -> RepoResult<Vec<Managed<Team>>> {
        self.executor()
            .list(self.queries.get("findByName")?, &[Param::from(name)])
    }

    fn load_members(&self, team: &Managed<Team>) -> RepoResult<Vec<Managed<Member>>> {
        let team_id = team
            .try_borrow()
            .map_err(|_| RepoError::EntityBorrowed(TEAM_META.name))?
            .id();
        let Some(team_id) = team_id else {
            return Ok(Vec::new());
        };
        self.executor().list(
            self.member_queries.get("findByTeamOrderByIdAsc")?,
            &[Param::from(team_id)],
        )
    }
}
