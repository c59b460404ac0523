//! Query resolution: from a repository method to an executable statement.
//!
//! # Responsibility
//! - Resolve each repository method once, at repository construction:
//!   method-attached query, then `<Entity>.<method>` named query, then
//!   derivation from the method name.
//! - Bind call arguments, apply sorting and paging, and shape results
//!   (entities, projections, counts, affected rows).
//!
//! # Invariants
//! - Column names in generated SQL come only from `EntityMeta`, never from
//!   caller input; sort properties are resolved against the mapping.
//! - Argument values are always bound, never spliced into SQL text.

use crate::repo::RepoResult;
use rusqlite::types::Value;
use rusqlite::Row;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod declared;
pub mod derived;
pub mod exec;
pub mod method;
pub mod page;
mod render;

pub use exec::QueryExecutor;
pub use method::{LockMode, QueryHints, QueryMethod, QueryMethods, QuerySource, ResolvedQuery};
pub use page::{Direction, Order, Page, PageRequest, Sort};

/// Resolution, binding and shaping failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Name does not follow `<prefix><subject>By<predicate>`.
    InvalidMethodName(String),
    UnknownProperty {
        entity: &'static str,
        property: String,
    },
    UnknownAssociation {
        entity: &'static str,
        association: String,
    },
    /// No query method registered under this name.
    UnknownMethod(String),
    ArgumentCount {
        method: &'static str,
        expected: usize,
        actual: usize,
    },
    ArgumentType {
        method: &'static str,
        position: usize,
        expected: &'static str,
    },
    /// Placeholder in the query text with no declared parameter.
    UnboundParameter {
        method: &'static str,
        parameter: String,
    },
    /// Declared parameter never referenced by the query text.
    UnusedParameter {
        method: &'static str,
        parameter: &'static str,
    },
    InvalidPageSize,
    /// `Top<N>`/`First<N>` combined with a page request.
    ConflictingLimit { method: &'static str },
    /// The method cannot produce the requested result shape.
    UnsupportedShape {
        method: &'static str,
        reason: &'static str,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMethodName(name) => write!(f, "cannot derive a query from method `{name}`"),
            Self::UnknownProperty { entity, property } => {
                write!(f, "no property `{property}` on {entity}")
            }
            Self::UnknownAssociation {
                entity,
                association,
            } => write!(f, "no association `{association}` on {entity}"),
            Self::UnknownMethod(name) => write!(f, "no query method registered as `{name}`"),
            Self::ArgumentCount {
                method,
                expected,
                actual,
            } => write!(f, "`{method}` expects {expected} argument(s), got {actual}"),
            Self::ArgumentType {
                method,
                position,
                expected,
            } => write!(f, "`{method}` argument {position} must be a {expected}"),
            Self::UnboundParameter { method, parameter } => {
                write!(f, "`{method}` references undeclared parameter `:{parameter}`")
            }
            Self::UnusedParameter { method, parameter } => {
                write!(f, "`{method}` declares parameter `{parameter}` but never uses it")
            }
            Self::InvalidPageSize => write!(f, "page size must be at least 1"),
            Self::ConflictingLimit { method } => {
                write!(f, "`{method}` has a result limit and cannot also be paged")
            }
            Self::UnsupportedShape { method, reason } => write!(f, "`{method}`: {reason}"),
        }
    }
}

impl Error for QueryError {}

/// One call argument. Collections bind as a parenthesised list.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(Value),
    List(Vec<Value>),
}

impl Param {
    pub fn null() -> Self {
        Self::Scalar(Value::Null)
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Param>,
    {
        let mut values = Vec::new();
        for item in items {
            match item.into() {
                Self::Scalar(value) => values.push(value),
                Self::List(nested) => values.extend(nested),
            }
        }
        Self::List(values)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::Text(value.to_string()))
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Scalar(Value::Text(value))
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Self::Scalar(Value::Integer(i64::from(value)))
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::Integer(value))
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Scalar(Value::Integer(i64::from(value)))
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

/// SQL text with its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundSql {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Builds a non-entity result from one row.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> RepoResult<Self>;
}

impl FromRow for String {
    /// First column.
    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(row.get(0)?)
    }
}

impl FromRow for i64 {
    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(row.get(0)?)
    }
}
