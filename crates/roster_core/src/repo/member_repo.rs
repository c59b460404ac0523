//! Member repository: CRUD plus the member query methods.
//!
//! # Responsibility
//! - Register every member query method in one const table.
//! - Map typed Rust calls onto resolved queries and result shapes.
//!
//! # Invariants
//! - The method table is resolved once in `try_new`; a bad method name,
//!   property or parameter fails construction.
//! - The team reference is never loaded implicitly (`load_team`).

use super::crud::{CrudRepository, SqliteRepository};
use super::{RepoError, RepoResult};
use crate::model::dto::MemberDto;
use crate::model::member::{Member, MEMBER_META};
use crate::model::team::Team;
use crate::query::{
    LockMode, Page, PageRequest, Param, QueryExecutor, QueryMethod, QueryMethods, Sort,
};
use crate::session::{Managed, Session};

const MEMBER_QUERY_METHODS: &[QueryMethod] = &[
    QueryMethod::derived("findByUsernameAndAgeGreaterThan"),
    QueryMethod::derived("findTop3HelloBy"),
    // Resolves to the `Member.findByUsername` named query.
    QueryMethod::derived("findByUsername").params(&["username"]),
    QueryMethod::declared(
        "findUser",
        "SELECT * FROM member WHERE username = :username AND age = :age",
    )
    .params(&["username", "age"]),
    QueryMethod::declared("findUsernameList", "SELECT username FROM member ORDER BY id"),
    QueryMethod::declared(
        "findMemberDto",
        "SELECT m.id AS id, m.username AS username, t.name AS team_name \
         FROM member m JOIN team t ON t.id = m.team_id ORDER BY m.id",
    ),
    QueryMethod::declared("findByNames", "SELECT * FROM member WHERE username IN :names")
        .params(&["names"]),
    QueryMethod::derived("findListByUsername"),
    QueryMethod::derived("findMemberByUsername"),
    QueryMethod::derived("findOptionalByUsername"),
    QueryMethod::derived("findByAge"),
    QueryMethod::derived("countByAge"),
    QueryMethod::derived("existsByUsername"),
    QueryMethod::derived("deleteByAgeLessThan"),
    QueryMethod::declared(
        "bulkAgePlus",
        "UPDATE member SET age = age + 1 WHERE age >= :age",
    )
    .params(&["age"])
    .modifying(),
    QueryMethod::declared(
        "findMemberFetchJoin",
        "SELECT m.*, t.id AS team__id, t.name AS team__name \
         FROM member m LEFT JOIN team t ON t.id = m.team_id ORDER BY m.id",
    )
    .fetch(&["team"]),
    QueryMethod::derived("findEntityGraphByUsername").fetch(&["team"]),
    QueryMethod::derived("findReadOnlyByUsername").read_only(),
    QueryMethod::derived("findLockByUsername").lock(LockMode::PessimisticWrite),
];

/// Repository interface for member queries beyond plain CRUD.
pub trait MemberRepository: CrudRepository<Member> {
    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Managed<Member>>>;
    /// First three members in store order.
    fn find_top3_hello_by(&self) -> RepoResult<Vec<Managed<Member>>>;
    fn find_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>>;
    fn find_user(&self, username: &str, age: i32) -> RepoResult<Vec<Managed<Member>>>;
    fn find_username_list(&self) -> RepoResult<Vec<String>>;
    /// Members that belong to a team, with the team name.
    fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>>;
    fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Managed<Member>>>;
    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>>;
    /// # Errors
    /// - `NonUniqueResult` when several members share `username`.
    fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Managed<Member>>>;
    fn find_optional_by_username(&self, username: &str)
        -> RepoResult<Option<Managed<Member>>>;
    fn find_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Managed<Member>>>;
    fn count_by_age(&self, age: i32) -> RepoResult<u64>;
    fn exists_by_username(&self, username: &str) -> RepoResult<bool>;
    /// Removes every member younger than `age`. Returns the number removed.
    fn delete_by_age_less_than(&self, age: i32) -> RepoResult<usize>;
    /// Adds one year to every member aged `age` or older, in one statement.
    ///
    /// Managed instances are not refreshed; clear the session to observe the
    /// new ages.
    fn bulk_age_plus(&self, age: i32) -> RepoResult<usize>;
    fn find_member_fetch_join(&self) -> RepoResult<Vec<Managed<Member>>>;
    fn find_entity_graph_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>>;
    /// Loaded instances are never written back by flush.
    fn find_read_only_by_username(&self, username: &str)
        -> RepoResult<Option<Managed<Member>>>;
    /// Holds the database write lock until the session ends.
    fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>>;
    /// Loads the member's team through the session.
    fn load_team(&self, member: &Managed<Member>) -> RepoResult<Option<Managed<Team>>>;
}

/// Session-backed member repository.
pub struct SqliteMemberRepository<'s> {
    crud: SqliteRepository<'s, Member>,
    queries: QueryMethods,
}

impl<'s> SqliteMemberRepository<'s> {
    pub fn try_new(session: &'s Session<'s>) -> RepoResult<Self> {
        let crud = SqliteRepository::try_new(session)?;
        let queries = QueryMethods::resolve_all(&MEMBER_META, MEMBER_QUERY_METHODS)?;
        Ok(Self { crud, queries })
    }

    /// Resolved query methods, e.g. to inspect where a query came from.
    pub fn query_methods(&self) -> &QueryMethods {
        &self.queries
    }

    fn executor(&self) -> QueryExecutor<'s> {
        QueryExecutor::new(self.crud.session())
    }

    fn list(&self, method: &str, args: &[Param]) -> RepoResult<Vec<Managed<Member>>> {
        self.executor().list(self.queries.get(method)?, args)
    }

    fn single(&self, method: &str, args: &[Param]) -> RepoResult<Option<Managed<Member>>> {
        self.executor().single(self.queries.get(method)?, args)
    }
}

impl CrudRepository<Member> for SqliteMemberRepository<'_> {
    fn save(&self, entity: Member) -> RepoResult<Managed<Member>> {
        self.crud.save(entity)
    }

    fn save_all(&self, entities: Vec<Member>) -> RepoResult<Vec<Managed<Member>>> {
        self.crud.save_all(entities)
    }

    fn find_by_id(&self, id: i64) -> RepoResult<Option<Managed<Member>>> {
        self.crud.find_by_id(id)
    }

    fn exists_by_id(&self, id: i64) -> RepoResult<bool> {
        self.crud.exists_by_id(id)
    }

    fn find_all(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.crud.find_all()
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<Member>>> {
        self.crud.find_all_sorted(sort)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<Member>>> {
        self.crud.find_all_paged(request)
    }

    fn count(&self) -> RepoResult<u64> {
        self.crud.count()
    }

    fn delete(&self, instance: &Managed<Member>) -> RepoResult<()> {
        self.crud.delete(instance)
    }

    fn delete_by_id(&self, id: i64) -> RepoResult<()> {
        self.crud.delete_by_id(id)
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn find_by_username_and_age_greater_than(
        &self,
        username: &str,
        age: i32,
    ) -> RepoResult<Vec<Managed<Member>>> {
        self.list(
            "findByUsernameAndAgeGreaterThan",
            &[Param::from(username), Param::from(age)],
        )
    }

    fn find_top3_hello_by(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findTop3HelloBy", &[])
    }

    fn find_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findByUsername", &[Param::from(username)])
    }

    fn find_user(&self, username: &str, age: i32) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findUser", &[Param::from(username), Param::from(age)])
    }

    fn find_username_list(&self) -> RepoResult<Vec<String>> {
        self.executor()
            .project(self.queries.get("findUsernameList")?, &[])
    }

    fn find_member_dto(&self) -> RepoResult<Vec<MemberDto>> {
        self.executor().project(self.queries.get("findMemberDto")?, &[])
    }

    fn find_by_names(&self, names: &[&str]) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findByNames", &[Param::list(names.iter().copied())])
    }

    fn find_list_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findListByUsername", &[Param::from(username)])
    }

    fn find_member_by_username(&self, username: &str) -> RepoResult<Option<Managed<Member>>> {
        self.single("findMemberByUsername", &[Param::from(username)])
    }

    fn find_optional_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.single("findOptionalByUsername", &[Param::from(username)])
    }

    fn find_by_age(&self, age: i32, request: &PageRequest) -> RepoResult<Page<Managed<Member>>> {
        self.executor()
            .page(self.queries.get("findByAge")?, &[Param::from(age)], request)
    }

    fn count_by_age(&self, age: i32) -> RepoResult<u64> {
        self.executor()
            .count(self.queries.get("countByAge")?, &[Param::from(age)])
    }

    fn exists_by_username(&self, username: &str) -> RepoResult<bool> {
        self.executor()
            .exists(self.queries.get("existsByUsername")?, &[Param::from(username)])
    }

    fn delete_by_age_less_than(&self, age: i32) -> RepoResult<usize> {
        self.executor()
            .delete::<Member>(self.queries.get("deleteByAgeLessThan")?, &[Param::from(age)])
    }

    fn bulk_age_plus(&self, age: i32) -> RepoResult<usize> {
        self.executor()
            .execute_update(self.queries.get("bulkAgePlus")?, &[Param::from(age)])
    }

    fn find_member_fetch_join(&self) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findMemberFetchJoin", &[])
    }

    fn find_entity_graph_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findEntityGraphByUsername", &[Param::from(username)])
    }

    fn find_read_only_by_username(
        &self,
        username: &str,
    ) -> RepoResult<Option<Managed<Member>>> {
        self.single("findReadOnlyByUsername", &[Param::from(username)])
    }

    fn find_lock_by_username(&self, username: &str) -> RepoResult<Vec<Managed<Member>>> {
        self.list("findLockByUsername", &[Param::from(username)])
    }

    fn load_team(&self, member: &Managed<Member>) -> RepoResult<Option<Managed<Team>>> {
        let team_id = member
            .try_borrow()
            .map_err(|_| RepoError::EntityBorrowed(MEMBER_META.name))?
            .team_id();
        match team_id {
            Some(team_id) => self.crud.session().find::<Team>(team_id),
            None => Ok(None),
        }
    }
}
