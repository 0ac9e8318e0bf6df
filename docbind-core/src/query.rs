//! Typed filter expressions for querying mapped documents.
//!
//! Filters are built against declared field names and typed values instead of
//! raw store documents. A built [`Expr`] carries no store syntax of its own:
//! it is translated into a store-native filter document only when a codec
//! supplies the declared type's context (identifier representations, embedded
//! descriptors). Raw documents remain accepted everywhere a filter is, via
//! [`FilterSpec`].
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building
//! filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`
//!
//! Expressions can be combined using chainable methods for more complex
//! queries.

use bson::{Bson, Document, ser::serialize_to_bson};
use serde::Serialize;

use crate::error::{DocbindError, DocbindResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Array contains any of the values.
    AnyOf,
    /// Array contains none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates. An expression defers its own
/// serialization: it becomes a store document only when handed to a codec
/// that knows the declared type it targets.
///
/// # Example
///
/// ```ignore
/// use docbind::query::Filter;
///
/// let expr = Filter::eq("status", "active")
///     .and(Filter::gt("age", 18));
/// ```
#[derive(Debug, Clone)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Helper struct for constructing filter expressions.
///
/// Provides static methods to construct common filter expressions in a
/// type-safe manner. All methods accept field names and values as
/// `Into<String>` and `Into<Bson>` for ergonomics; [`Filter::typed`] accepts
/// any serializable value, which is structurally serialized on the spot.
pub struct Filter;

impl Filter {
    /// Creates an equality filter expression.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Creates a not-equal filter expression.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Creates a greater-than filter expression.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Creates a greater-than-or-equal filter expression.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Creates a less-than filter expression.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Creates a less-than-or-equal filter expression.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Creates a string prefix filter expression.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Creates a string suffix filter expression.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Creates a contains filter expression.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Creates a not-contains filter expression.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Creates an existence filter expression.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Creates a non-existence filter expression.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Creates a logical AND filter expression.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Creates a logical OR filter expression.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Creates an array membership filter expression.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Creates an array exclusion filter expression.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Creates a comparison expression against a typed value.
    ///
    /// The value is structurally serialized through the serialization engine,
    /// so filters can compare a field against a nested domain object rather
    /// than a hand-built document.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Format`] if the value cannot be serialized.
    pub fn typed<T: Serialize>(
        field: impl Into<String>,
        op: FieldOp,
        value: &T,
    ) -> DocbindResult<Expr> {
        Ok(Expr::field(
            field.into(),
            op,
            serialize_to_bson(value).map_err(|e| DocbindError::Format(e.to_string()))?,
        ))
    }

    /// Shorthand for a typed structural-equality expression.
    pub fn matches<T: Serialize>(field: impl Into<String>, value: &T) -> DocbindResult<Expr> {
        Self::typed(field, FieldOp::Eq, value)
    }
}

/// Visitor over the filter-expression tree.
///
/// Implementations translate or evaluate expressions; the codec layer's
/// store-document translator is the primary implementor.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocbindError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// A filter argument to a query entry point or decorated builder.
///
/// The two variants are the two capabilities a supplied filter may have: a
/// typed expression that defers serialization until it is initialized with
/// the declared type's context, or a raw document that is re-serialized
/// field-by-field through the codec before reaching the driver.
#[derive(Debug, Clone)]
pub enum FilterSpec {
    /// A typed expression awaiting type context.
    Expr(Expr),
    /// A raw store filter document.
    Document(Document),
}

impl From<Expr> for FilterSpec {
    fn from(expr: Expr) -> Self {
        FilterSpec::Expr(expr)
    }
}

impl From<Document> for FilterSpec {
    fn from(doc: Document) -> Self {
        FilterSpec::Document(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_chaining_flattens() {
        let expr = Filter::eq("a", 1)
            .and(Filter::eq("b", 2))
            .and(Filter::eq("c", 3));
        match expr {
            Expr::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn or_chaining_flattens() {
        let expr = Filter::eq("a", 1)
            .or(Filter::eq("b", 2))
            .or(Filter::eq("c", 3));
        match expr {
            Expr::Or(list) => assert_eq!(list.len(), 3),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn typed_operand_is_structurally_serialized() {
        #[derive(serde::Serialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let expr = Filter::matches("origin", &Point { x: 1, y: 2 }).unwrap();
        match expr {
            Expr::Field { value: Bson::Document(doc), .. } => {
                assert_eq!(doc.get("x"), Some(&Bson::Int32(1)));
                assert_eq!(doc.get("y"), Some(&Bson::Int32(2)));
            }
            other => panic!("expected serialized document operand, got {other:?}"),
        }
    }
}
