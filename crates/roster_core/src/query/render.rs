//! SQL text for derived queries.
//!
//! The root table is aliased `r`; each joined association is aliased by its
//! property name, and fetched columns are exposed as `<property>__<column>`.

use super::derived::{Operator, Part, PartTree};
use super::page::{PageRequest, Sort};
use super::{BoundSql, Param, QueryError};
use crate::model::meta::{AssociationMeta, EntityMeta};
use rusqlite::types::Value;

const ROOT: &str = "r";

#[derive(Default)]
struct Joins {
    associations: Vec<&'static AssociationMeta>,
}

impl Joins {
    fn require(&mut self, association: Option<&'static AssociationMeta>) {
        if let Some(association) = association {
            if !self
                .associations
                .iter()
                .any(|joined| std::ptr::eq(*joined, association))
            {
                self.associations.push(association);
            }
        }
    }

    fn to_sql(&self) -> String {
        self.associations
            .iter()
            .map(|association| {
                format!(
                    " LEFT JOIN {table} {alias} ON {alias}.{id} = {ROOT}.{join}",
                    table = association.target.table,
                    alias = association.property,
                    id = association.target.id.column,
                    join = association.join_column,
                )
            })
            .collect()
    }
}

pub(crate) fn select(
    method: &'static str,
    tree: &PartTree,
    meta: &'static EntityMeta,
    fetch: &[&'static AssociationMeta],
    args: &[Param],
    sort: &Sort,
    page: Option<&PageRequest>,
) -> Result<BoundSql, QueryError> {
    if tree.subject.limit.is_some() && page.is_some() {
        return Err(QueryError::ConflictingLimit { method });
    }

    let mut joins = Joins::default();
    let mut params = Vec::new();
    let where_clause = predicate(method, tree, args, &mut joins, &mut params)?;

    let mut order_terms = Vec::new();
    for order in tree.order_by.clone().and(sort.clone()).orders() {
        let path = meta
            .resolve_path(&order.property)
            .ok_or_else(|| QueryError::UnknownProperty {
                entity: meta.name,
                property: order.property.clone(),
            })?;
        joins.require(path.required_join());
        order_terms.push(format!(
            "{} {}",
            path.column_expr(ROOT),
            order.direction.as_sql()
        ));
    }

    let mut columns = meta
        .columns()
        .into_iter()
        .map(|column| format!("{ROOT}.{column} AS {column}"))
        .collect::<Vec<_>>();
    for association in fetch {
        joins.require(Some(*association));
        columns.extend(association.target.columns().into_iter().map(|column| {
            format!(
                "{alias}.{column} AS {alias}__{column}",
                alias = association.property
            )
        }));
    }

    let mut sql = format!(
        "SELECT {}{} FROM {} {ROOT}{}{}",
        if tree.subject.distinct { "DISTINCT " } else { "" },
        columns.join(", "),
        meta.table,
        joins.to_sql(),
        where_clause
    );
    if !order_terms.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_terms.join(", "));
    }
    if let Some(limit) = tree.subject.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(page) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Value::Integer(i64::from(page.page_size())));
        params.push(Value::Integer(i64::try_from(page.offset()).unwrap_or(i64::MAX)));
    }
    Ok(BoundSql { sql, params })
}

pub(crate) fn count(
    method: &'static str,
    tree: &PartTree,
    meta: &'static EntityMeta,
    args: &[Param],
) -> Result<BoundSql, QueryError> {
    let mut joins = Joins::default();
    let mut params = Vec::new();
    let where_clause = predicate(method, tree, args, &mut joins, &mut params)?;
    let counted = if tree.subject.distinct {
        format!("DISTINCT {ROOT}.{}", meta.id.column)
    } else {
        format!("{ROOT}.{}", meta.id.column)
    };
    Ok(BoundSql {
        sql: format!(
            "SELECT COUNT({counted}) FROM {} {ROOT}{}{}",
            meta.table,
            joins.to_sql(),
            where_clause
        ),
        params,
    })
}

pub(crate) fn exists(
    method: &'static str,
    tree: &PartTree,
    meta: &'static EntityMeta,
    args: &[Param],
) -> Result<BoundSql, QueryError> {
    let mut joins = Joins::default();
    let mut params = Vec::new();
    let where_clause = predicate(method, tree, args, &mut joins, &mut params)?;
    Ok(BoundSql {
        sql: format!(
            "SELECT EXISTS(SELECT 1 FROM {} {ROOT}{}{})",
            meta.table,
            joins.to_sql(),
            where_clause
        ),
        params,
    })
}

/// No-op write over the rows `select` returns.
///
/// SQLite has no row locks; the write takes the database write lock, which
/// the transaction then holds until it ends.
pub(crate) fn lock(meta: &'static EntityMeta, select: &BoundSql) -> BoundSql {
    let id = meta.id.column;
    BoundSql {
        sql: format!(
            "UPDATE {table} SET {id} = {id} WHERE {id} IN (SELECT {id} FROM ({inner}) AS locked)",
            table = meta.table,
            inner = select.sql
        ),
        params: select.params.clone(),
    }
}

/// ` WHERE (...) OR (...)`, or empty for a predicate-less tree.
fn predicate(
    method: &'static str,
    tree: &PartTree,
    args: &[Param],
    joins: &mut Joins,
    params: &mut Vec<Value>,
) -> Result<String, QueryError> {
    let expected = tree.expected_arguments();
    if args.len() != expected {
        return Err(QueryError::ArgumentCount {
            method,
            expected,
            actual: args.len(),
        });
    }
    if tree.predicate.is_empty() {
        return Ok(String::new());
    }

    let mut position = 0;
    let mut groups = Vec::with_capacity(tree.predicate.len());
    for conjunction in &tree.predicate {
        let mut conditions = Vec::with_capacity(conjunction.len());
        for part in conjunction {
            joins.require(part.property.required_join());
            conditions.push(condition(method, part, args, position, params)?);
            position += part.operator.arity();
        }
        groups.push(format!("({})", conditions.join(" AND ")));
    }
    Ok(format!(" WHERE {}", groups.join(" OR ")))
}

fn condition(
    method: &'static str,
    part: &Part,
    args: &[Param],
    position: usize,
    params: &mut Vec<Value>,
) -> Result<String, QueryError> {
    let column = part.property.column_expr(ROOT);
    let (target, placeholder) = if part.ignore_case {
        (format!("LOWER({column})"), "LOWER(?)")
    } else {
        (column.clone(), "?")
    };

    let compare = |op: &str, params: &mut Vec<Value>| -> Result<String, QueryError> {
        params.push(scalar(method, args, position)?.clone());
        Ok(format!("{target} {op} {placeholder}"))
    };

    Ok(match part.operator {
        Operator::Equals if is_null(args, position) => format!("{column} IS NULL"),
        Operator::NotEquals if is_null(args, position) => format!("{column} IS NOT NULL"),
        Operator::Equals => compare("=", params)?,
        Operator::NotEquals => compare("<>", params)?,
        Operator::GreaterThan => compare(">", params)?,
        Operator::GreaterThanEqual => compare(">=", params)?,
        Operator::LessThan => compare("<", params)?,
        Operator::LessThanEqual => compare("<=", params)?,
        Operator::Like => compare("LIKE", params)?,
        Operator::NotLike => compare("NOT LIKE", params)?,
        Operator::Between => {
            params.push(scalar(method, args, position)?.clone());
            params.push(scalar(method, args, position + 1)?.clone());
            format!("{target} BETWEEN {placeholder} AND {placeholder}")
        }
        Operator::IsNull => format!("{column} IS NULL"),
        Operator::IsNotNull => format!("{column} IS NOT NULL"),
        Operator::StartingWith | Operator::EndingWith | Operator::Containing => {
            let escaped = escape_like(text(method, args, position)?);
            let pattern = match part.operator {
                Operator::StartingWith => format!("{escaped}%"),
                Operator::EndingWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            params.push(Value::Text(pattern));
            format!("{target} LIKE {placeholder} ESCAPE '\\'")
        }
        Operator::In | Operator::NotIn => {
            let values = list(method, args, position)?;
            let negated = part.operator == Operator::NotIn;
            if values.is_empty() {
                return Ok(if negated { "1 = 1" } else { "0 = 1" }.to_string());
            }
            params.extend(values.iter().cloned());
            format!(
                "{target} {}IN ({})",
                if negated { "NOT " } else { "" },
                vec![placeholder; values.len()].join(", ")
            )
        }
        Operator::True => format!("{column} = 1"),
        Operator::False => format!("{column} = 0"),
    })
}

fn is_null(args: &[Param], position: usize) -> bool {
    matches!(args.get(position), Some(Param::Scalar(Value::Null)))
}

fn scalar<'a>(
    method: &'static str,
    args: &'a [Param],
    position: usize,
) -> Result<&'a Value, QueryError> {
    match args.get(position) {
        Some(Param::Scalar(value)) => Ok(value),
        _ => Err(QueryError::ArgumentType {
            method,
            position,
            expected: "single value",
        }),
    }
}

fn text<'a>(method: &'static str, args: &'a [Param], position: usize) -> Result<&'a str, QueryError> {
    match args.get(position) {
        Some(Param::Scalar(Value::Text(value))) => Ok(value),
        _ => Err(QueryError::ArgumentType {
            method,
            position,
            expected: "text value",
        }),
    }
}

fn list<'a>(
    method: &'static str,
    args: &'a [Param],
    position: usize,
) -> Result<&'a [Value], QueryError> {
    match args.get(position) {
        Some(Param::List(values)) => Ok(values),
        _ => Err(QueryError::ArgumentType {
            method,
            position,
            expected: "collection",
        }),
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
