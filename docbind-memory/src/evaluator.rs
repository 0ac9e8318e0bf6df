//! Store-native filter evaluation for in-memory documents.
//!
//! The mapping layer hands this driver the same filter documents it would
//! send over the wire, so the evaluator speaks the store's operator syntax
//! directly: implicit equality, comparison and membership operators, logical
//! combinators, and the anchored-literal regular-expression subset the typed
//! expression translator produces.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docbind_core::error::{DocbindError, DocbindResult};

/// Type-erased, comparable representation of BSON values.
///
/// Wraps BSON values and provides the comparison operations filtering and
/// sorting need. All numeric types normalize to f64.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
    /// Canonical object identifier
    ObjectId(&'a ObjectId),
    /// Binary value
    Bytes(&'a [u8]),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(value),
            Bson::Binary(value) => Comparable::Bytes(&value.bytes),
            Bson::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => {
                a.bytes().partial_cmp(&b.bytes())
            }
            _ => None,
        }
    }
}

/// Evaluates a store-native filter document against one stored document.
pub(crate) struct FilterEvaluator<'a> {
    document: &'a Document,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns whether the document matches the filter.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Query`] for operators this driver does not
    /// implement; a malformed filter fails the query instead of silently
    /// matching nothing.
    pub fn matches(&self, filter: &Document) -> DocbindResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(condition)?,
                "$or" => self.any(condition)?,
                "$nor" => !self.any(condition)?,
                "$not" => match condition {
                    Bson::Document(inner) => !self.matches(inner)?,
                    _ => {
                        return Err(DocbindError::Query(
                            "$not requires a filter document".to_string(),
                        ));
                    }
                },
                other if other.starts_with('$') => {
                    return Err(DocbindError::Query(format!(
                        "unsupported query operator {other}",
                    )));
                }
                path => self.field_matches(path, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn sub_filters(condition: &Bson) -> DocbindResult<Vec<&Document>> {
        match condition {
            Bson::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_document().ok_or_else(|| {
                        DocbindError::Query(
                            "logical operators take an array of filter documents".to_string(),
                        )
                    })
                })
                .collect(),
            _ => Err(DocbindError::Query(
                "logical operators take an array of filter documents".to_string(),
            )),
        }
    }

    fn all(&self, condition: &Bson) -> DocbindResult<bool> {
        for filter in Self::sub_filters(condition)? {
            if !self.matches(filter)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any(&self, condition: &Bson) -> DocbindResult<bool> {
        for filter in Self::sub_filters(condition)? {
            if self.matches(filter)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn field_matches(&self, path: &str, condition: &Bson) -> DocbindResult<bool> {
        let field = lookup_path(self.document, path);
        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                self.operators_match(field, ops)
            }
            direct => Ok(field.is_some_and(|value| equals_or_contains(value, direct))),
        }
    }

    fn operators_match(&self, field: Option<&Bson>, ops: &Document) -> DocbindResult<bool> {
        for (op, operand) in ops {
            let matched = match op.as_str() {
                "$eq" => field.is_some_and(|value| equals_or_contains(value, operand)),
                "$ne" => !field.is_some_and(|value| equals_or_contains(value, operand)),
                "$gt" => compares(field, operand, |o| o == Ordering::Greater),
                "$gte" => compares(field, operand, |o| o != Ordering::Less),
                "$lt" => compares(field, operand, |o| o == Ordering::Less),
                "$lte" => compares(field, operand, |o| o != Ordering::Greater),
                "$exists" => {
                    let should_exist = operand.as_bool().unwrap_or(true);
                    field.is_some() == should_exist
                }
                "$in" => membership(field, operand)?,
                "$nin" => !membership(field, operand)?,
                "$all" => match (field, operand) {
                    (Some(Bson::Array(values)), Bson::Array(expected)) => {
                        expected.iter().all(|item| {
                            values
                                .iter()
                                .any(|value| Comparable::from(value) == Comparable::from(item))
                        })
                    }
                    _ => false,
                },
                "$not" => match operand {
                    Bson::Document(inner) => !self.operators_match(field, inner)?,
                    _ => {
                        return Err(DocbindError::Query(
                            "$not requires an operator document".to_string(),
                        ));
                    }
                },
                "$regex" => {
                    let pattern = operand.as_str().ok_or_else(|| {
                        DocbindError::Query("$regex requires a string pattern".to_string())
                    })?;
                    let case_insensitive = ops
                        .get_str("$options")
                        .map(|options| options.contains('i'))
                        .unwrap_or(false);
                    match field {
                        Some(Bson::String(text)) => {
                            anchored_literal_match(text, pattern, case_insensitive)?
                        }
                        _ => false,
                    }
                }
                // Consumed together with $regex.
                "$options" => continue,
                other => {
                    return Err(DocbindError::Query(format!(
                        "unsupported query operator {other}",
                    )));
                }
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Filters the documents of a collection, preserving their order.
pub(crate) fn filter_documents<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
    filter: &Document,
) -> DocbindResult<Vec<Document>> {
    let mut matched = Vec::new();
    for document in documents {
        if FilterEvaluator::new(document).matches(filter)? {
            matched.push(document.clone());
        }
    }
    Ok(matched)
}

/// Sorts documents in place by a multi-key sort specification (negative
/// direction values sort descending).
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (key, direction) in sort {
            let left = lookup_path(a, key)
                .map(Comparable::from)
                .unwrap_or(Comparable::Null);
            let right = lookup_path(b, key)
                .map(Comparable::from)
                .unwrap_or(Comparable::Null);

            let descending = matches!(
                direction,
                Bson::Int32(n) if *n < 0
            ) || matches!(direction, Bson::Int64(n) if *n < 0)
                || matches!(direction, Bson::Double(n) if *n < 0.0);

            let ordering = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
            let ordering = if descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Applies an inclusion or exclusion projection. The `_id` field stays
/// included unless explicitly excluded, matching store semantics.
pub(crate) fn project_document(document: &Document, projection: &Document) -> Document {
    let inclusion = projection
        .iter()
        .any(|(key, value)| key != "_id" && truthy(value));

    document
        .iter()
        .filter(|(key, _)| {
            let listed = projection.get(key.as_str());
            if inclusion {
                match listed {
                    Some(value) => truthy(value),
                    None => key.as_str() == "_id",
                }
            } else {
                !listed.is_some_and(truthy_excluded)
            }
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn truthy(value: &Bson) -> bool {
    !matches!(
        value,
        Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false)
    ) && !matches!(value, Bson::Double(n) if *n == 0.0)
}

fn truthy_excluded(value: &Bson) -> bool {
    !truthy(value)
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

/// Resolves a dotted path against a document.
pub(crate) fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = document;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        current = value.as_document()?;
    }

    None
}

/// Direct equality, extended with array-membership semantics: a filter value
/// matches an array field when any element equals it.
fn equals_or_contains(field: &Bson, operand: &Bson) -> bool {
    if Comparable::from(field) == Comparable::from(operand) {
        return true;
    }
    match field {
        Bson::Array(values) => values
            .iter()
            .any(|value| Comparable::from(value) == Comparable::from(operand)),
        _ => false,
    }
}

fn compares(field: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    field
        .and_then(|value| Comparable::from(value).partial_cmp(&Comparable::from(operand)))
        .is_some_and(accept)
}

fn membership(field: Option<&Bson>, operand: &Bson) -> DocbindResult<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(DocbindError::Query(
            "$in and $nin take an array of values".to_string(),
        ));
    };

    Ok(field.is_some_and(|value| {
        candidates
            .iter()
            .any(|candidate| equals_or_contains(value, candidate))
    }))
}

/// Matches the anchored-literal pattern subset the expression translator
/// emits: `^literal`, `literal$`, and `.*literal.*`. Anything needing a real
/// regular-expression engine is rejected as unsupported.
fn anchored_literal_match(
    text: &str,
    pattern: &str,
    case_insensitive: bool,
) -> DocbindResult<bool> {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };

    let (literal, check): (&str, fn(&str, &str) -> bool) =
        if let Some(rest) = pattern.strip_prefix(".*").and_then(|p| p.strip_suffix(".*")) {
            (rest, |t, l| t.contains(l))
        } else if let Some(rest) = pattern.strip_prefix('^') {
            (rest, |t, l| t.starts_with(l))
        } else if let Some(rest) = pattern.strip_suffix('$') {
            (rest, |t, l| t.ends_with(l))
        } else {
            (pattern.as_str(), |t, l| t.contains(l))
        };

    if literal.contains(['^', '$', '*', '+', '?', '[', ']', '(', ')', '{', '}', '|', '\\']) {
        return Err(DocbindError::Query(format!(
            "unsupported regular expression '{pattern}': only anchored literals are evaluated in memory",
        )));
    }

    Ok(check(&text, literal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sample() -> Document {
        doc! {
            "_id": ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap(),
            "name": "alice",
            "age": 34,
            "tags": ["admin", "ops"],
            "address": { "city": "berlin" },
        }
    }

    fn matches(filter: Document) -> bool {
        FilterEvaluator::new(&sample())
            .matches(&filter)
            .unwrap()
    }

    #[test]
    fn implicit_equality() {
        assert!(matches(doc! { "name": "alice" }));
        assert!(!matches(doc! { "name": "bob" }));
    }

    #[test]
    fn array_fields_match_by_membership() {
        assert!(matches(doc! { "tags": "admin" }));
        assert!(!matches(doc! { "tags": "dev" }));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(doc! { "age": { "$gt": 30 } }));
        assert!(matches(doc! { "age": { "$gte": 34, "$lte": 34 } }));
        assert!(!matches(doc! { "age": { "$lt": 34 } }));
    }

    #[test]
    fn ne_matches_missing_fields() {
        assert!(matches(doc! { "missing": { "$ne": 1 } }));
    }

    #[test]
    fn membership_operators() {
        assert!(matches(doc! { "age": { "$in": [33, 34] } }));
        assert!(matches(doc! { "age": { "$nin": [1, 2] } }));
        assert!(!matches(doc! { "age": { "$in": [1, 2] } }));
    }

    #[test]
    fn exists_operator() {
        assert!(matches(doc! { "name": { "$exists": true } }));
        assert!(matches(doc! { "missing": { "$exists": false } }));
        assert!(!matches(doc! { "missing": { "$exists": true } }));
    }

    #[test]
    fn logical_operators() {
        assert!(matches(doc! {
            "$and": [ { "name": "alice" }, { "age": { "$gt": 30 } } ],
        }));
        assert!(matches(doc! {
            "$or": [ { "name": "bob" }, { "age": 34 } ],
        }));
        assert!(matches(doc! {
            "$not": { "name": "bob" },
        }));
    }

    #[test]
    fn dotted_paths_reach_into_embedded_documents() {
        assert!(matches(doc! { "address.city": "berlin" }));
        assert!(!matches(doc! { "address.city": "paris" }));
    }

    #[test]
    fn object_id_equality() {
        let id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert!(matches(doc! { "_id": id }));
    }

    #[test]
    fn anchored_literal_regex_forms() {
        assert!(matches(doc! { "name": { "$regex": "^ali", "$options": "i" } }));
        assert!(matches(doc! { "name": { "$regex": "ice$", "$options": "i" } }));
        assert!(matches(doc! { "name": { "$regex": ".*lic.*", "$options": "i" } }));
        assert!(!matches(doc! { "name": { "$regex": "^lic", "$options": "i" } }));
    }

    #[test]
    fn unsupported_operator_is_a_query_error() {
        let err = FilterEvaluator::new(&sample())
            .matches(&doc! { "name": { "$near": 1 } })
            .unwrap_err();
        assert!(matches!(err, DocbindError::Query(_)));
    }

    #[test]
    fn unsupported_regex_is_a_query_error() {
        let err = FilterEvaluator::new(&sample())
            .matches(&doc! { "name": { "$regex": "a|b" } })
            .unwrap_err();
        assert!(matches!(err, DocbindError::Query(_)));
    }

    #[test]
    fn sorting_by_multiple_keys() {
        let mut docs = vec![
            doc! { "a": 1, "b": 2 },
            doc! { "a": 1, "b": 1 },
            doc! { "a": 0, "b": 9 },
        ];
        sort_documents(&mut docs, &doc! { "a": 1, "b": -1 });
        assert_eq!(docs[0], doc! { "a": 0, "b": 9 });
        assert_eq!(docs[1], doc! { "a": 1, "b": 2 });
        assert_eq!(docs[2], doc! { "a": 1, "b": 1 });
    }

    #[test]
    fn inclusion_projection_keeps_id() {
        let projected = project_document(&sample(), &doc! { "name": 1 });
        assert_eq!(projected.len(), 2);
        assert!(projected.get("_id").is_some());
        assert!(projected.get("name").is_some());
    }

    #[test]
    fn exclusion_projection_drops_listed_fields() {
        let projected = project_document(&sample(), &doc! { "tags": 0, "address": 0 });
        assert!(projected.get("tags").is_none());
        assert!(projected.get("address").is_none());
        assert!(projected.get("name").is_some());
    }
}
