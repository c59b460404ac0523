//! Declared SQL with `:name` parameters.
//!
//! # Invariants
//! - Placeholders inside quoted text are not parameters.
//! - Every placeholder maps to a declared parameter and every declared
//!   parameter is referenced; both are checked when the query is built.

use super::page::{PageRequest, Sort};
use super::{BoundSql, Param, QueryError};
use crate::model::meta::{EntityMeta, PropertyPath};
use rusqlite::types::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(&'static str),
    Param(usize),
}

/// Query text split into literal runs and parameter slots.
#[derive(Debug, Clone)]
pub struct DeclaredQuery {
    method: &'static str,
    segments: Vec<Segment>,
    count_segments: Option<Vec<Segment>>,
    params: &'static [&'static str],
}

impl DeclaredQuery {
    /// # Errors
    /// - `UnboundParameter` for a placeholder with no declared parameter.
    /// - `UnusedParameter` for a declared parameter the query never uses.
    pub fn new(
        method: &'static str,
        sql: &'static str,
        count_sql: Option<&'static str>,
        params: &'static [&'static str],
    ) -> Result<Self, QueryError> {
        let mut used = vec![false; params.len()];
        let segments = split_placeholders(method, sql, params, &mut used)?;
        if let Some(unused) = params
            .iter()
            .zip(&used)
            .find_map(|(name, used)| (!used).then_some(*name))
        {
            return Err(QueryError::UnusedParameter {
                method,
                parameter: unused,
            });
        }

        let count_segments = match count_sql {
            Some(count_sql) => {
                let mut ignored = vec![false; params.len()];
                Some(split_placeholders(method, count_sql, params, &mut ignored)?)
            }
            None => None,
        };

        Ok(Self {
            method,
            segments,
            count_segments,
            params,
        })
    }

    pub(crate) fn bind(&self, args: &[Param]) -> Result<BoundSql, QueryError> {
        self.check_arity(args)?;
        Ok(render(&self.segments, args))
    }

    /// Count over the same rows: the explicit count query when present,
    /// otherwise the main query wrapped in `COUNT(*)`.
    pub(crate) fn bind_count(&self, args: &[Param]) -> Result<BoundSql, QueryError> {
        self.check_arity(args)?;
        Ok(match &self.count_segments {
            Some(segments) => render(segments, args),
            None => {
                let inner = render(&self.segments, args);
                BoundSql {
                    sql: format!("SELECT COUNT(*) FROM ({}) AS q", inner.sql),
                    params: inner.params,
                }
            }
        })
    }

    fn check_arity(&self, args: &[Param]) -> Result<(), QueryError> {
        if args.len() != self.params.len() {
            return Err(QueryError::ArgumentCount {
                method: self.method,
                expected: self.params.len(),
                actual: args.len(),
            });
        }
        Ok(())
    }
}

/// Wraps a bound declared query so sorting and paging apply to its rows.
///
/// Sort properties must be root columns of `meta`; they are read through the
/// wrapper alias `q`.
pub(crate) fn wrap_sorted(
    method: &'static str,
    bound: BoundSql,
    meta: &'static EntityMeta,
    sort: &Sort,
    page: Option<&PageRequest>,
) -> Result<BoundSql, QueryError> {
    if !sort.is_sorted() && page.is_none() {
        return Ok(bound);
    }

    let mut order_terms = Vec::new();
    for order in sort.orders() {
        let path = meta
            .resolve_path(&order.property)
            .ok_or_else(|| QueryError::UnknownProperty {
                entity: meta.name,
                property: order.property.clone(),
            })?;
        if path.required_join().is_some() {
            return Err(QueryError::UnsupportedShape {
                method,
                reason: "declared queries sort on root columns only",
            });
        }
        let column = match path {
            PropertyPath::Field(field) => field.column,
            PropertyPath::Association(association) => association.join_column,
            PropertyPath::Nested { field, .. } => field.column,
        };
        order_terms.push(format!("q.{column} {}", order.direction.as_sql()));
    }

    let mut sql = format!("SELECT * FROM ({}) AS q", bound.sql);
    let mut params = bound.params;
    if !order_terms.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_terms.join(", "));
    }
    if let Some(page) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(i64::from(page.page_size())));
        params.push(Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
    }
    Ok(BoundSql { sql, params })
}

fn render(segments: &[Segment], args: &[Param]) -> BoundSql {
    let mut sql = String::new();
    let mut params = Vec::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => sql.push_str(text),
            Segment::Param(index) => match &args[*index] {
                Param::Scalar(value) => {
                    sql.push('?');
                    params.push(value.clone());
                }
                Param::List(values) if values.is_empty() => sql.push_str("(NULL)"),
                Param::List(values) => {
                    sql.push('(');
                    sql.push_str(&vec!["?"; values.len()].join(", "));
                    sql.push(')');
                    params.extend(values.iter().cloned());
                }
            },
        }
    }
    BoundSql { sql, params }
}

fn split_placeholders(
    method: &'static str,
    sql: &'static str,
    params: &'static [&'static str],
    used: &mut [bool],
) -> Result<Vec<Segment>, QueryError> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut quote: Option<u8> = None;
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        if let Some(open) = quote {
            if byte == open {
                quote = None;
            }
            index += 1;
            continue;
        }
        match byte {
            b'\'' | b'"' => {
                quote = Some(byte);
                index += 1;
            }
            b':' if bytes.get(index + 1).is_some_and(|next| is_ident_start(*next)) => {
                let name_start = index + 1;
                let mut name_end = name_start;
                while name_end < bytes.len() && is_ident(bytes[name_end]) {
                    name_end += 1;
                }
                let name = &sql[name_start..name_end];
                let position = params.iter().position(|param| *param == name).ok_or_else(|| {
                    QueryError::UnboundParameter {
                        method,
                        parameter: name.to_string(),
                    }
                })?;
                used[position] = true;

                if text_start < index {
                    segments.push(Segment::Text(&sql[text_start..index]));
                }
                segments.push(Segment::Param(position));
                text_start = name_end;
                index = name_end;
            }
            _ => index += 1,
        }
    }
    if text_start < sql.len() {
        segments.push(Segment::Text(&sql[text_start..]));
    }
    Ok(segments)
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_ident(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
