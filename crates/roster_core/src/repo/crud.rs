//! Generic CRUD contract shared by every entity repository.

use super::schema::ensure_entity_ready;
use super::{RepoError, RepoResult};
use crate::model::Entity;
use crate::query::{
    Direction, Page, PageRequest, Param, QueryExecutor, QueryMethod, QueryMethods, Sort,
};
use crate::session::{Managed, Session};
use std::marker::PhantomData;

const CRUD_QUERY_METHODS: &[QueryMethod] = &[
    QueryMethod::derived("findAllBy"),
    QueryMethod::derived("countAllBy"),
    QueryMethod::derived("existsById"),
];

/// Repository interface for basic entity persistence.
pub trait CrudRepository<E: Entity> {
    /// Inserts a new entity, or merges one that already has an id.
    ///
    /// Merged state reaches the store on the next flush.
    fn save(&self, entity: E) -> RepoResult<Managed<E>>;
    /// Saves in order. The whole batch is validated before the first write.
    fn save_all(&self, entities: Vec<E>) -> RepoResult<Vec<Managed<E>>>;
    /// Identity-map hits return the managed instance without SQL.
    fn find_by_id(&self, id: i64) -> RepoResult<Option<Managed<E>>>;
    fn exists_by_id(&self, id: i64) -> RepoResult<bool>;
    /// Every row, ordered by id.
    fn find_all(&self) -> RepoResult<Vec<Managed<E>>>;
    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<E>>>;
    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<E>>>;
    fn count(&self) -> RepoResult<u64>;
    /// Removes a managed instance. Unsaved instances are ignored.
    fn delete(&self, instance: &Managed<E>) -> RepoResult<()>;
    /// # Errors
    /// - `NotFound` when no row has `id`.
    fn delete_by_id(&self, id: i64) -> RepoResult<()>;
}

/// Session-backed CRUD repository for any mapped entity.
pub struct SqliteRepository<'s, E> {
    session: &'s Session<'s>,
    queries: QueryMethods,
    _entity: PhantomData<E>,
}

impl<'s, E: Entity> SqliteRepository<'s, E> {
    pub fn try_new(session: &'s Session<'s>) -> RepoResult<Self> {
        ensure_entity_ready(session.connection(), E::meta())?;
        let queries = QueryMethods::resolve_all(E::meta(), CRUD_QUERY_METHODS)?;
        Ok(Self {
            session,
            queries,
            _entity: PhantomData,
        })
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn executor(&self) -> QueryExecutor<'s> {
        QueryExecutor::new(self.session)
    }
}

impl<E: Entity> CrudRepository<E> for SqliteRepository<'_, E> {
    fn save(&self, entity: E) -> RepoResult<Managed<E>> {
        match entity.id() {
            None => self.session.persist(entity),
            Some(_) => self.session.merge(entity),
        }
    }

    fn save_all(&self, entities: Vec<E>) -> RepoResult<Vec<Managed<E>>> {
        for entity in &entities {
            entity.validate()?;
        }
        entities.into_iter().map(|entity| self.save(entity)).collect()
    }

    fn find_by_id(&self, id: i64) -> RepoResult<Option<Managed<E>>> {
        self.session.find::<E>(id)
    }

    fn exists_by_id(&self, id: i64) -> RepoResult<bool> {
        let query = self.queries.get("existsById")?;
        self.executor().exists(query, &[Param::from(id)])
    }

    fn find_all(&self) -> RepoResult<Vec<Managed<E>>> {
        self.find_all_sorted(&Sort::by(Direction::Asc, &[E::meta().id.property]))
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<Managed<E>>> {
        let query = self.queries.get("findAllBy")?;
        self.executor().list_sorted(query, &[], sort)
    }

    fn find_all_paged(&self, request: &PageRequest) -> RepoResult<Page<Managed<E>>> {
        let query = self.queries.get("findAllBy")?;
        self.executor().page(query, &[], request)
    }

    fn count(&self) -> RepoResult<u64> {
        let query = self.queries.get("countAllBy")?;
        self.executor().count(query, &[])
    }

    fn delete(&self, instance: &Managed<E>) -> RepoResult<()> {
        self.session.remove(instance)?;
        Ok(())
    }

    fn delete_by_id(&self, id: i64) -> RepoResult<()> {
        if self.session.remove_by_id::<E>(id)? {
            Ok(())
        } else {
            Err(RepoError::NotFound {
                entity: E::meta().name,
                id,
            })
        }
    }
}
