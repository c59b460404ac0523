//! Static entity-to-table mapping.
//!
//! Every persistent type declares one `EntityMeta` as a `static` item. Query
//! derivation, sort validation, schema checks and SQL generation read column
//! names from here, so no column name is ever taken from caller input.

use std::fmt::{Debug, Formatter};

/// One scalar property mapped to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    pub property: &'static str,
    pub column: &'static str,
}

/// Owning (many-to-one) side of a relationship.
pub struct AssociationMeta {
    pub property: &'static str,
    /// Foreign-key column on the owning table.
    pub join_column: &'static str,
    pub target: &'static EntityMeta,
}

impl Debug for AssociationMeta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationMeta")
            .field("property", &self.property)
            .field("join_column", &self.join_column)
            .field("target", &self.target.name)
            .finish()
    }
}

/// Query registered on the entity under `<Entity>.<method>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedQuery {
    pub name: &'static str,
    pub query: &'static str,
}

/// Mapping table for one entity type.
#[derive(Debug)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub id: FieldMeta,
    pub fields: &'static [FieldMeta],
    pub associations: &'static [AssociationMeta],
    pub named_queries: &'static [NamedQuery],
}

/// A property reference resolved against mapping metadata.
#[derive(Debug, Clone, Copy)]
pub enum PropertyPath {
    /// Scalar column on the root entity (including the id).
    Field(&'static FieldMeta),
    /// The association itself, compared through its join column.
    Association(&'static AssociationMeta),
    /// Scalar column on an associated entity, one level deep.
    Nested {
        association: &'static AssociationMeta,
        field: &'static FieldMeta,
    },
}

impl PropertyPath {
    /// Dotted property name, e.g. `team.name`.
    pub fn dotted(&self) -> String {
        match self {
            Self::Field(field) => field.property.to_string(),
            Self::Association(association) => association.property.to_string(),
            Self::Nested { association, field } => {
                format!("{}.{}", association.property, field.property)
            }
        }
    }

    /// SQL column expression, qualified by the table alias in use.
    ///
    /// Nested paths are qualified by the association property name, which is
    /// the alias every generated join uses.
    pub fn column_expr(&self, root_alias: &str) -> String {
        match self {
            Self::Field(field) => format!("{root_alias}.{}", field.column),
            Self::Association(association) => {
                format!("{root_alias}.{}", association.join_column)
            }
            Self::Nested { association, field } => {
                format!("{}.{}", association.property, field.column)
            }
        }
    }

    /// Association that must be joined to evaluate this path.
    pub fn required_join(&self) -> Option<&'static AssociationMeta> {
        match self {
            Self::Nested { association, .. } => Some(*association),
            Self::Field(_) | Self::Association(_) => None,
        }
    }
}

impl EntityMeta {
    /// Looks up a scalar property, including the id.
    pub fn field(&'static self, property: &str) -> Option<&'static FieldMeta> {
        if self.id.property == property {
            return Some(&self.id);
        }
        self.fields.iter().find(|field| field.property == property)
    }

    pub fn association(&'static self, property: &str) -> Option<&'static AssociationMeta> {
        self.associations
            .iter()
            .find(|association| association.property == property)
    }

    /// Every mapped column: id first, then scalar fields, then join columns.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.id.column];
        columns.extend(self.fields.iter().map(|field| field.column));
        columns.extend(
            self.associations
                .iter()
                .map(|association| association.join_column),
        );
        columns
    }

    /// Finds the query registered as `<Entity>.<method>`.
    pub fn named_query(&self, method: &str) -> Option<&'static NamedQuery> {
        self.named_queries.iter().find(|query| {
            query
                .name
                .strip_prefix(self.name)
                .and_then(|rest| rest.strip_prefix('.'))
                == Some(method)
        })
    }

    /// Resolves a dotted path such as `username`, `team` or `team.name`.
    pub fn resolve_path(&'static self, dotted: &str) -> Option<PropertyPath> {
        match dotted.split_once('.') {
            None => self
                .field(dotted)
                .map(PropertyPath::Field)
                .or_else(|| self.association(dotted).map(PropertyPath::Association)),
            Some((head, tail)) => {
                let association = self.association(head)?;
                let field = association.target.field(tail)?;
                Some(PropertyPath::Nested { association, field })
            }
        }
    }
}
