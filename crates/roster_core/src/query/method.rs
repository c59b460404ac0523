//! Query method registration and one-time resolution.

use super::declared::{wrap_sorted, DeclaredQuery};
use super::derived::{PartTree, SubjectKind};
use super::page::{PageRequest, Sort};
use super::render;
use super::{BoundSql, Param, QueryError};
use crate::model::meta::{AssociationMeta, EntityMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Exclusive write lock held until the session ends.
    PessimisticWrite,
}

/// Per-method execution hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryHints {
    /// Hydrated instances are never written back by flush.
    pub read_only: bool,
    pub lock: Option<LockMode>,
    /// Associations hydrated from the same statement.
    pub fetch: &'static [&'static str],
    /// Clear the session after a modifying statement.
    pub clear_automatically: bool,
}

impl QueryHints {
    pub const NONE: Self = Self {
        read_only: false,
        lock: None,
        fetch: &[],
        clear_automatically: false,
    };
}

/// Static registration of one repository method.
///
/// Built in `const` tables:
/// ```ignore
/// const FIND_USER: QueryMethod =
///     QueryMethod::declared("findUser", "SELECT * FROM member WHERE username = :username")
///         .params(&["username"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMethod {
    pub name: &'static str,
    pub query: Option<&'static str>,
    pub count_query: Option<&'static str>,
    pub params: &'static [&'static str],
    pub modifying: bool,
    pub hints: QueryHints,
}

impl QueryMethod {
    /// Method with no attached query: a named query or the method name decides.
    pub const fn derived(name: &'static str) -> Self {
        Self {
            name,
            query: None,
            count_query: None,
            params: &[],
            modifying: false,
            hints: QueryHints::NONE,
        }
    }

    pub const fn declared(name: &'static str, query: &'static str) -> Self {
        Self {
            query: Some(query),
            ..Self::derived(name)
        }
    }

    /// Names bound to `:name` placeholders, in argument order.
    pub const fn params(self, params: &'static [&'static str]) -> Self {
        Self { params, ..self }
    }

    pub const fn count_query(self, count_query: &'static str) -> Self {
        Self {
            count_query: Some(count_query),
            ..self
        }
    }

    pub const fn modifying(self) -> Self {
        Self {
            modifying: true,
            ..self
        }
    }

    pub const fn read_only(self) -> Self {
        Self {
            hints: QueryHints {
                read_only: true,
                ..self.hints
            },
            ..self
        }
    }

    pub const fn lock(self, mode: LockMode) -> Self {
        Self {
            hints: QueryHints {
                lock: Some(mode),
                ..self.hints
            },
            ..self
        }
    }

    pub const fn fetch(self, associations: &'static [&'static str]) -> Self {
        Self {
            hints: QueryHints {
                fetch: associations,
                ..self.hints
            },
            ..self
        }
    }

    pub const fn clear_automatically(self) -> Self {
        Self {
            hints: QueryHints {
                clear_automatically: true,
                ..self.hints
            },
            ..self
        }
    }
}

/// Where a method's query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    /// Attached to the method itself.
    Method,
    /// Registered on the entity as `<Entity>.<method>`.
    Named,
    /// Derived from the method name.
    Derived,
}

#[derive(Debug, Clone)]
enum Plan {
    Declared(DeclaredQuery),
    Derived(PartTree),
}

/// A query method ready to bind and run.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    method: QueryMethod,
    meta: &'static EntityMeta,
    source: QuerySource,
    plan: Plan,
    fetch: Vec<&'static AssociationMeta>,
}

impl ResolvedQuery {
    /// Resolves `method` against `meta`: attached query, then named query,
    /// then derivation.
    pub fn resolve(meta: &'static EntityMeta, method: &QueryMethod) -> Result<Self, QueryError> {
        let fetch = method
            .hints
            .fetch
            .iter()
            .map(|name| {
                meta.association(name)
                    .ok_or_else(|| QueryError::UnknownAssociation {
                        entity: meta.name,
                        association: (*name).to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (source, plan) = if let Some(query) = method.query {
            let declared =
                DeclaredQuery::new(method.name, query, method.count_query, method.params)?;
            (QuerySource::Method, Plan::Declared(declared))
        } else if let Some(named) = meta.named_query(method.name) {
            let declared =
                DeclaredQuery::new(method.name, named.query, method.count_query, method.params)?;
            (QuerySource::Named, Plan::Declared(declared))
        } else if method.modifying {
            return Err(QueryError::UnsupportedShape {
                method: method.name,
                reason: "modifying methods need a declared query",
            });
        } else {
            let tree = PartTree::parse(method.name, meta)?;
            if !method.params.is_empty() && method.params.len() != tree.expected_arguments() {
                return Err(QueryError::ArgumentCount {
                    method: method.name,
                    expected: tree.expected_arguments(),
                    actual: method.params.len(),
                });
            }
            (QuerySource::Derived, Plan::Derived(tree))
        };

        Ok(Self {
            method: *method,
            meta,
            source,
            plan,
            fetch,
        })
    }

    pub fn name(&self) -> &'static str {
        self.method.name
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn source(&self) -> QuerySource {
        self.source
    }

    pub fn hints(&self) -> &QueryHints {
        &self.method.hints
    }

    pub fn is_modifying(&self) -> bool {
        self.method.modifying
    }

    pub(crate) fn fetch_associations(&self) -> &[&'static AssociationMeta] {
        &self.fetch
    }

    /// Subject kind for derived queries; declared queries always select.
    pub(crate) fn subject_kind(&self) -> SubjectKind {
        match &self.plan {
            Plan::Derived(tree) => tree.subject.kind,
            Plan::Declared(_) => SubjectKind::Select,
        }
    }

    /// Row-returning statement with sorting and paging applied.
    pub(crate) fn select(
        &self,
        args: &[Param],
        sort: &Sort,
        page: Option<&PageRequest>,
    ) -> Result<BoundSql, QueryError> {
        match &self.plan {
            Plan::Declared(declared) => {
                let bound = declared.bind(args)?;
                wrap_sorted(self.method.name, bound, self.meta, sort, page)
            }
            Plan::Derived(tree) => render::select(
                self.method.name,
                tree,
                self.meta,
                &self.fetch,
                args,
                sort,
                page,
            ),
        }
    }

    /// Statement returning the number of rows `select` would return unpaged.
    pub(crate) fn count(&self, args: &[Param]) -> Result<BoundSql, QueryError> {
        match &self.plan {
            Plan::Declared(declared) => declared.bind_count(args),
            Plan::Derived(tree) => render::count(self.method.name, tree, self.meta, args),
        }
    }

    pub(crate) fn exists(&self, args: &[Param]) -> Result<BoundSql, QueryError> {
        match &self.plan {
            Plan::Declared(declared) => {
                let bound = declared.bind(args)?;
                Ok(BoundSql {
                    sql: format!("SELECT EXISTS({})", bound.sql),
                    params: bound.params,
                })
            }
            Plan::Derived(tree) => render::exists(self.method.name, tree, self.meta, args),
        }
    }

    /// Modifying statement as declared.
    pub(crate) fn update(&self, args: &[Param]) -> Result<BoundSql, QueryError> {
        match &self.plan {
            Plan::Declared(declared) if self.method.modifying => declared.bind(args),
            _ => Err(QueryError::UnsupportedShape {
                method: self.method.name,
                reason: "not a modifying query",
            }),
        }
    }
}

/// Every query method of one repository, resolved up front.
#[derive(Debug, Clone)]
pub struct QueryMethods {
    meta: &'static EntityMeta,
    resolved: Vec<ResolvedQuery>,
}

impl QueryMethods {
    /// Resolves the whole table; the first failing method aborts.
    pub fn resolve_all(
        meta: &'static EntityMeta,
        methods: &[QueryMethod],
    ) -> Result<Self, QueryError> {
        let resolved = methods
            .iter()
            .map(|method| ResolvedQuery::resolve(meta, method))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { meta, resolved })
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn get(&self, name: &str) -> Result<&ResolvedQuery, QueryError> {
        self.resolved
            .iter()
            .find(|query| query.name() == name)
            .ok_or_else(|| QueryError::UnknownMethod(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedQuery> {
        self.resolved.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{LockMode, QueryMethod, QueryMethods, QuerySource, ResolvedQuery};
    use crate::model::member::MEMBER_META;
    use crate::query::page::Sort;
    use crate::query::{Param, QueryError};

    #[test]
    fn attached_query_wins_over_derivable_name() {
        let method = QueryMethod::declared(
            "findByUsername",
            "SELECT * FROM member WHERE username = :username AND age > 0",
        )
        .params(&["username"]);
        let resolved = ResolvedQuery::resolve(&MEMBER_META, &method).unwrap();
        assert_eq!(resolved.source(), QuerySource::Method);
    }

    #[test]
    fn named_query_wins_over_derivation() {
        let method = QueryMethod::derived("findByUsername").params(&["username"]);
        let resolved = ResolvedQuery::resolve(&MEMBER_META, &method).unwrap();
        assert_eq!(resolved.source(), QuerySource::Named);

        let bound = resolved
            .select(&[Param::from("AAA")], &Sort::unsorted(), None)
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM member WHERE username = ?");
    }

    #[test]
    fn unregistered_name_is_derived() {
        let method = QueryMethod::derived("findListByUsername");
        let resolved = ResolvedQuery::resolve(&MEMBER_META, &method).unwrap();
        assert_eq!(resolved.source(), QuerySource::Derived);
    }

    #[test]
    fn builders_compose_hints() {
        const METHOD: QueryMethod = QueryMethod::derived("findLockByUsername")
            .lock(LockMode::PessimisticWrite)
            .read_only()
            .fetch(&["team"]);
        assert_eq!(METHOD.hints.lock, Some(LockMode::PessimisticWrite));
        assert!(METHOD.hints.read_only);
        assert_eq!(METHOD.hints.fetch, &["team"]);
        assert!(!METHOD.modifying);
    }

    #[test]
    fn unknown_fetch_association_fails_resolution() {
        let method = QueryMethod::derived("findByUsername").fetch(&["club"]);
        let err = ResolvedQuery::resolve(&MEMBER_META, &method).unwrap_err();
        assert!(matches!(err, QueryError::UnknownAssociation { .. }));
    }

    #[test]
    fn modifying_method_requires_declared_query() {
        let method = QueryMethod::derived("updateByAge").modifying();
        assert!(matches!(
            ResolvedQuery::resolve(&MEMBER_META, &method),
            Err(QueryError::UnsupportedShape { .. })
        ));
    }

    #[test]
    fn lookup_of_unregistered_method_fails() {
        let methods =
            QueryMethods::resolve_all(&MEMBER_META, &[QueryMethod::derived("findByAge")]).unwrap();
        assert!(methods.get("findByAge").is_ok());
        assert_eq!(
            methods.get("findByNickname").unwrap_err(),
            QueryError::UnknownMethod("findByNickname".to_string())
        );
    }

    #[test]
    fn resolve_all_reports_first_bad_method() {
        let err = QueryMethods::resolve_all(
            &MEMBER_META,
            &[
                QueryMethod::derived("findByAge"),
                QueryMethod::derived("findByNickname"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnknownProperty { .. }));
    }
}
