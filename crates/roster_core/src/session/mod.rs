//! Transaction-scoped unit of work.
//!
//! # Responsibility
//! - Own one SQLite transaction for the lifetime of a `Session`.
//! - Track managed entity instances per id (identity map) with snapshots.
//! - Write pending changes on `flush`, drop tracking on `clear`.
//!
//! # Invariants
//! - Within one session, lookups of the same id yield the same `Managed<E>`.
//! - A row already managed is never overwritten by a later query result;
//!   callers `clear` (or `detach`) to observe set-based updates.
//! - Read-only instances are never written back.
//! - Dropping a session without `commit` rolls the transaction back.

mod identity_map;

pub use identity_map::IdentityMap;

use crate::model::member::Member;
use crate::model::team::Team;
use crate::model::Entity;
use crate::repo::{RepoError, RepoResult};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared handle to a session-managed entity instance.
pub type Managed<E> = Rc<RefCell<E>>;

/// Unit of work bound to one transaction on one connection.
pub struct Session<'conn> {
    tx: Transaction<'conn>,
    pub(crate) members: RefCell<IdentityMap<Member>>,
    pub(crate) teams: RefCell<IdentityMap<Team>>,
    statements: Cell<u64>,
}

impl<'conn> Session<'conn> {
    /// Starts a deferred transaction on `conn`.
    ///
    /// Locks are taken lazily: the first read takes a shared lock, the first
    /// write (or pessimistic lock query) takes the write lock.
    pub fn begin(conn: &'conn mut Connection) -> RepoResult<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        debug!("event=tx_begin module=session status=ok");
        Ok(Self {
            tx,
            members: RefCell::default(),
            teams: RefCell::default(),
            statements: Cell::new(0),
        })
    }

    /// Underlying connection, for read-only inspection.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    /// Number of SQL statements issued through this session so far.
    pub fn statement_count(&self) -> u64 {
        self.statements.get()
    }

    /// Number of instances currently tracked, across entity types.
    pub fn managed_count(&self) -> usize {
        self.members.borrow().len() + self.teams.borrow().len()
    }

    /// Writes every dirty, writable managed instance. Returns rows written.
    ///
    /// Teams are written before members so `member.team_id` never points at
    /// a row the same flush has yet to write.
    pub fn flush(&self) -> RepoResult<usize> {
        let written = self.flush_entities::<Team>()? + self.flush_entities::<Member>()?;
        if written > 0 {
            debug!("event=flush module=session status=ok rows={written}");
        }
        Ok(written)
    }

    /// Evicts every managed instance without writing pending changes.
    pub fn clear(&self) {
        let evicted = self.managed_count();
        self.members.borrow_mut().clear();
        self.teams.borrow_mut().clear();
        debug!("event=clear module=session status=ok evicted={evicted}");
    }

    /// Stops tracking one instance. Pending changes on it are discarded.
    pub fn detach<E: Entity>(&self, instance: &Managed<E>) -> RepoResult<()> {
        if !self.contains(instance) {
            return Ok(());
        }
        if let Some(id) = id_of(instance)? {
            E::identity_map(self).borrow_mut().remove(id);
        }
        Ok(())
    }

    /// Whether `instance` is the managed instance for its id.
    pub fn contains<E: Entity>(&self, instance: &Managed<E>) -> bool {
        E::identity_map(self).borrow().contains_instance(instance)
    }

    /// Whether `instance` was loaded with the read-only hint.
    pub fn is_read_only<E: Entity>(&self, instance: &Managed<E>) -> RepoResult<bool> {
        Ok(match id_of(instance)? {
            Some(id) => E::identity_map(self).borrow().is_read_only(id),
            None => false,
        })
    }

    /// Flushes and commits.
    pub fn commit(self) -> RepoResult<()> {
        self.flush()?;
        let statements = self.statements.get();
        self.tx.commit()?;
        info!("event=tx_commit module=session status=ok statements={statements}");
        Ok(())
    }

    /// Discards all changes made in this session.
    pub fn rollback(self) -> RepoResult<()> {
        let statements = self.statements.get();
        self.tx.rollback()?;
        info!("event=tx_rollback module=session status=ok statements={statements}");
        Ok(())
    }

    /// Inserts a new entity and starts tracking it.
    ///
    /// The generated id is assigned to the returned instance.
    pub fn persist<E: Entity>(&self, mut entity: E) -> RepoResult<Managed<E>> {
        if let Some(id) = entity.id() {
            return Err(RepoError::InvalidData(format!(
                "{} already has id {id}; merge it instead",
                E::meta().name
            )));
        }
        entity.validate()?;

        let meta = E::meta();
        let values = entity.column_values();
        let columns = values
            .iter()
            .map(|(column, _)| *column)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            meta.table
        );
        let params = values.into_iter().map(|(_, value)| value).collect::<Vec<_>>();
        self.execute(&sql, &params)?;

        let id = self.tx.last_insert_rowid();
        entity.assign_id(id);
        Ok(self.track(id, entity, false))
    }

    /// Copies the state of a detached entity onto its managed instance.
    ///
    /// The change reaches the store on the next flush. Entities without an id
    /// are persisted instead.
    ///
    /// # Errors
    /// - `NotFound` when no row has the entity's id.
    pub fn merge<E: Entity>(&self, entity: E) -> RepoResult<Managed<E>> {
        let Some(id) = entity.id() else {
            return self.persist(entity);
        };
        entity.validate()?;

        let instance = self.find::<E>(id)?.ok_or(RepoError::NotFound {
            entity: E::meta().name,
            id,
        })?;
        *instance
            .try_borrow_mut()
            .map_err(|_| RepoError::EntityBorrowed(E::meta().name))? = entity;
        Ok(instance)
    }

    /// Returns the managed instance for `id`, loading it when not yet tracked.
    ///
    /// An identity-map hit issues no SQL.
    pub fn find<E: Entity>(&self, id: i64) -> RepoResult<Option<Managed<E>>> {
        if let Some(instance) = E::identity_map(self).borrow().get(id) {
            return Ok(Some(instance));
        }

        let meta = E::meta();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            meta.columns().join(", "),
            meta.table,
            meta.id.column
        );
        let mut found = None;
        self.query_each(&sql, &[Value::Integer(id)], |row| {
            found = Some(self.hydrate::<E>(row, "", false)?);
            Ok(())
        })?;
        Ok(found)
    }

    /// Deletes the row behind `instance` and stops tracking it.
    ///
    /// Returns `false` for unsaved instances and rows already gone. Pending
    /// changes are flushed first so foreign keys see the current state.
    pub fn remove<E: Entity>(&self, instance: &Managed<E>) -> RepoResult<bool> {
        match id_of(instance)? {
            Some(id) => self.remove_by_id::<E>(id),
            None => Ok(false),
        }
    }

    pub fn remove_by_id<E: Entity>(&self, id: i64) -> RepoResult<bool> {
        self.flush()?;
        let meta = E::meta();
        let sql = format!("DELETE FROM {} WHERE {} = ?", meta.table, meta.id.column);
        let changed = self.execute(&sql, &[Value::Integer(id)])?;
        E::identity_map(self).borrow_mut().remove(id);
        Ok(changed > 0)
    }

    /// Resolves one row to its managed instance.
    ///
    /// When the id is already tracked the tracked instance wins and the row
    /// values are ignored.
    pub(crate) fn hydrate<E: Entity>(
        &self,
        row: &Row<'_>,
        prefix: &str,
        read_only: bool,
    ) -> RepoResult<Managed<E>> {
        let loaded = E::from_row(row, prefix)?;
        let id = loaded.id().ok_or_else(|| {
            RepoError::InvalidData(format!("{} row without id", E::meta().name))
        })?;
        if let Some(existing) = E::identity_map(self).borrow().get(id) {
            return Ok(existing);
        }
        Ok(self.track(id, loaded, read_only))
    }

    pub(crate) fn execute(&self, sql: &str, params: &[Value]) -> RepoResult<usize> {
        self.record_statement(sql);
        self.tx
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|err| log_failure(sql, err.into()))
    }

    pub(crate) fn query_each<F>(&self, sql: &str, params: &[Value], mut on_row: F) -> RepoResult<()>
    where
        F: FnMut(&Row<'_>) -> RepoResult<()>,
    {
        self.record_statement(sql);
        let mut stmt = self
            .tx
            .prepare(sql)
            .map_err(|err| log_failure(sql, err.into()))?;
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|err| log_failure(sql, err.into()))?;
        while let Some(row) = rows.next().map_err(|err| log_failure(sql, err.into()))? {
            on_row(row)?;
        }
        Ok(())
    }

    pub(crate) fn query_i64(&self, sql: &str, params: &[Value]) -> RepoResult<i64> {
        self.record_statement(sql);
        self.tx
            .query_row(sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(|err| log_failure(sql, err.into()))
    }

    fn track<E: Entity>(&self, id: i64, entity: E, read_only: bool) -> Managed<E> {
        let instance = Rc::new(RefCell::new(entity.clone()));
        E::identity_map(self)
            .borrow_mut()
            .register(id, Rc::clone(&instance), entity, read_only);
        instance
    }

    fn flush_entities<E: Entity>(&self) -> RepoResult<usize> {
        let dirty = E::identity_map(self).borrow().dirty()?;
        if dirty.is_empty() {
            return Ok(0);
        }

        let meta = E::meta();
        for (id, state) in &dirty {
            state.validate()?;
            let values = state.column_values();
            let assignments = values
                .iter()
                .map(|(column, _)| format!("{column} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {} SET {assignments} WHERE {} = ?",
                meta.table, meta.id.column
            );
            let mut params = values.into_iter().map(|(_, value)| value).collect::<Vec<_>>();
            params.push(Value::Integer(*id));
            self.execute(&sql, &params)?;
        }

        let written = dirty.len();
        let mut map = E::identity_map(self).borrow_mut();
        for (id, state) in dirty {
            map.mark_clean(id, state);
        }
        Ok(written)
    }

    fn record_statement(&self, sql: &str) {
        let seq = self.statements.get() + 1;
        self.statements.set(seq);
        debug!("event=sql module=session seq={seq} sql={sql}");
    }
}

/// Runs `work` in a fresh session: commit on `Ok`, rollback on `Err`.
pub fn with_session<T, F>(conn: &mut Connection, work: F) -> RepoResult<T>
where
    F: FnOnce(&Session<'_>) -> RepoResult<T>,
{
    let session = Session::begin(conn)?;
    match work(&session) {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = session.rollback() {
                warn!("event=tx_rollback module=session status=error error={rollback_err}");
            }
            Err(err)
        }
    }
}

fn id_of<E: Entity>(instance: &Managed<E>) -> RepoResult<Option<i64>> {
    instance
        .try_borrow()
        .map(|entity| entity.id())
        .map_err(|_| RepoError::EntityBorrowed(E::meta().name))
}

fn log_failure(sql: &str, err: RepoError) -> RepoError {
    match &err {
        RepoError::ConstraintViolation(_) => {
            warn!("event=sql module=session status=error error_code=constraint_violation sql={sql} error={err}");
        }
        RepoError::ConcurrencyConflict(_) => {
            warn!("event=sql module=session status=error error_code=lock_conflict sql={sql} error={err}");
        }
        _ => {
            warn!("event=sql module=session status=error error_code=sql_failed sql={sql} error={err}");
        }
    }
    err
}
