//! Runs resolved query methods inside a session and shapes their results.

use super::derived::SubjectKind;
use super::method::{LockMode, ResolvedQuery};
use super::page::{Page, PageRequest, Sort};
use super::render;
use super::{BoundSql, FromRow, Param, QueryError};
use crate::model::Entity;
use crate::repo::{RepoError, RepoResult};
use crate::session::{Managed, Session};
use log::{debug, info};

/// Result shaping over one session.
///
/// Every statement is preceded by a flush so queries observe pending
/// changes made through managed instances.
#[derive(Clone, Copy)]
pub struct QueryExecutor<'s> {
    session: &'s Session<'s>,
}

impl<'s> QueryExecutor<'s> {
    pub fn new(session: &'s Session<'s>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.session
    }

    pub fn list<E: Entity>(
        &self,
        query: &ResolvedQuery,
        args: &[Param],
    ) -> RepoResult<Vec<Managed<E>>> {
        self.list_sorted(query, args, &Sort::unsorted())
    }

    /// Like `list`, with `sort` applied after any ordering in the method name.
    pub fn list_sorted<E: Entity>(
        &self,
        query: &ResolvedQuery,
        args: &[Param],
        sort: &Sort,
    ) -> RepoResult<Vec<Managed<E>>> {
        expect_subject(query, SubjectKind::Select)?;
        let bound = query.select(args, sort, None)?;
        self.load(query, &bound)
    }

    /// At most one entity.
    ///
    /// # Errors
    /// - `NonUniqueResult` when more than one row matches.
    pub fn single<E: Entity>(
        &self,
        query: &ResolvedQuery,
        args: &[Param],
    ) -> RepoResult<Option<Managed<E>>> {
        let mut found = self.list::<E>(query, args)?;
        if found.len() > 1 {
            return Err(RepoError::NonUniqueResult {
                method: query.name(),
            });
        }
        Ok(found.pop())
    }

    /// One page plus the total across pages.
    ///
    /// The count statement is skipped when the page itself implies the total.
    pub fn page<E: Entity>(
        &self,
        query: &ResolvedQuery,
        args: &[Param],
        request: &PageRequest,
    ) -> RepoResult<Page<Managed<E>>> {
        expect_subject(query, SubjectKind::Select)?;
        let bound = query.select(args, request.sort(), Some(request))?;
        let content = self.load::<E>(query, &bound)?;
        let total = match request.infer_total(content.len()) {
            Some(total) => total,
            None => self.count_rows(query, args)?,
        };
        Ok(Page::new(content, request, total))
    }

    /// Non-entity rows (scalars, DTOs). Nothing is tracked by the session.
    pub fn project<P: FromRow>(&self, query: &ResolvedQuery, args: &[Param]) -> RepoResult<Vec<P>> {
        expect_subject(query, SubjectKind::Select)?;
        if query.is_modifying() {
            return Err(not_a_select(query));
        }
        let bound = query.select(args, &Sort::unsorted(), None)?;
        self.session.flush()?;
        let mut rows = Vec::new();
        self.session.query_each(&bound.sql, &bound.params, |row| {
            rows.push(P::from_row(row)?);
            Ok(())
        })?;
        Ok(rows)
    }

    pub fn count(&self, query: &ResolvedQuery, args: &[Param]) -> RepoResult<u64> {
        match query.subject_kind() {
            SubjectKind::Count | SubjectKind::Select => self.count_rows(query, args),
            _ => Err(wrong_subject(query).into()),
        }
    }

    pub fn exists(&self, query: &ResolvedQuery, args: &[Param]) -> RepoResult<bool> {
        match query.subject_kind() {
            SubjectKind::Exists | SubjectKind::Select => {}
            _ => return Err(wrong_subject(query).into()),
        }
        let bound = query.exists(args)?;
        self.session.flush()?;
        Ok(self.session.query_i64(&bound.sql, &bound.params)? != 0)
    }

    /// Runs a modifying query as one statement. Returns affected rows.
    ///
    /// Managed instances keep their state unless the method clears the
    /// session automatically.
    pub fn execute_update(&self, query: &ResolvedQuery, args: &[Param]) -> RepoResult<usize> {
        let bound = query.update(args)?;
        self.session.flush()?;
        let affected = self.session.execute(&bound.sql, &bound.params)?;
        info!(
            "event=bulk_update module=query status=ok method={} rows={affected}",
            query.name()
        );
        if query.hints().clear_automatically {
            self.session.clear();
        }
        Ok(affected)
    }

    /// Loads every match and removes it through the session.
    pub fn delete<E: Entity>(&self, query: &ResolvedQuery, args: &[Param]) -> RepoResult<usize> {
        expect_subject(query, SubjectKind::Delete)?;
        let bound = query.select(args, &Sort::unsorted(), None)?;
        let mut removed = 0;
        for instance in self.load::<E>(query, &bound)? {
            if self.session.remove(&instance)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn load<E: Entity>(&self, query: &ResolvedQuery, bound: &BoundSql) -> RepoResult<Vec<Managed<E>>> {
        if !std::ptr::eq(query.meta(), E::meta()) {
            return Err(QueryError::UnsupportedShape {
                method: query.name(),
                reason: "query is registered for another entity",
            }
            .into());
        }
        if query.is_modifying() {
            return Err(not_a_select(query));
        }

        self.session.flush()?;
        if let Some(LockMode::PessimisticWrite) = query.hints().lock {
            let lock = render::lock(E::meta(), bound);
            let locked = self.session.execute(&lock.sql, &lock.params)?;
            debug!(
                "event=lock module=query status=ok mode=pessimistic_write method={} rows={locked}",
                query.name()
            );
        }

        let read_only = query.hints().read_only;
        let fetch = query.fetch_associations();
        let mut loaded = Vec::new();
        self.session.query_each(&bound.sql, &bound.params, |row| {
            let instance = self.session.hydrate::<E>(row, "", read_only)?;
            for &association in fetch {
                let prefix = format!("{}__", association.property);
                E::hydrate_association(self.session, association, row, &prefix, read_only)?;
            }
            loaded.push(instance);
            Ok(())
        })?;
        Ok(loaded)
    }

    fn count_rows(&self, query: &ResolvedQuery, args: &[Param]) -> RepoResult<u64> {
        let bound = query.count(args)?;
        self.session.flush()?;
        let total = self.session.query_i64(&bound.sql, &bound.params)?;
        u64::try_from(total).map_err(|_| RepoError::InvalidData(format!("negative count {total}")))
    }
}

fn expect_subject(query: &ResolvedQuery, expected: SubjectKind) -> Result<(), QueryError> {
    if query.subject_kind() == expected {
        Ok(())
    } else {
        Err(wrong_subject(query))
    }
}

fn wrong_subject(query: &ResolvedQuery) -> QueryError {
    QueryError::UnsupportedShape {
        method: query.name(),
        reason: "method prefix does not produce this result shape",
    }
}

fn not_a_select(query: &ResolvedQuery) -> RepoError {
    QueryError::UnsupportedShape {
        method: query.name(),
        reason: "modifying queries only run through execute_update",
    }
    .into()
}
