//! Per-type codecs bridging the serialization engine and the store's
//! document representation.
//!
//! A [`Codec`] is bound to one declared type. Encoding hands the whole value
//! to the serialization engine and then rewrites the produced tree per the
//! type's descriptor: the identifier field moves to `_id` (converted to the
//! canonical object-identifier form when marked), other marked fields convert
//! in place, and embedded mapped fields recurse through their lazily-bound
//! descriptors. Decoding is the inverse rewrite followed by null/undefined
//! normalization and engine deserialization.
//!
//! The codec also owns the single interception rule applied by the
//! query-builder decorators: [`Codec::filter_document`] turns either a typed
//! expression or a raw filter document into the store-native filter the
//! driver receives.

use std::{
    any::TypeId,
    collections::HashMap,
    marker::PhantomData,
    sync::{Arc, PoisonError, RwLock},
};

use bson::{
    Bson, Document, doc,
    de::deserialize_from_bson,
    ser::serialize_to_bson,
};
use tracing::debug;

use crate::{
    document::{IdField, Mapped, TypeDescriptor},
    error::{DocbindError, DocbindResult},
    oid::{bson_type_name, from_store_id, to_store_id},
    query::{Expr, FieldOp, FilterSpec, QueryVisitor},
};

/// Shared, process-wide codec lookup point.
///
/// Descriptors themselves are compile-time statics; the registry memoizes
/// their validation so an unusable type declaration fails on the first codec
/// lookup and every later lookup is a cache hit. The cache is read-mostly:
/// concurrent callers may race to validate the same type, which is harmless
/// since validation is pure and both writers insert the same entry.
#[derive(Clone, Default, Debug)]
pub struct CodecRegistry {
    validated: Arc<RwLock<HashMap<TypeId, &'static TypeDescriptor>>>,
}

impl CodecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up (or validates and caches) the codec for a declared type.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Configuration`] when the type's mapping
    /// metadata is unusable, for example an identifier field whose declared
    /// type has no canonical-identifier conversion. The failure happens here,
    /// before any document is sent to the store.
    pub fn codec_for<D: Mapped>(&self) -> DocbindResult<Codec<D>> {
        let key = TypeId::of::<D>();

        let cached = self
            .validated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied();
        if let Some(descriptor) = cached {
            return Ok(Codec::new(self.clone(), descriptor));
        }

        let descriptor = D::descriptor();
        validate_descriptor(descriptor, &mut Vec::new())?;
        debug!(type_name = descriptor.type_name, "validated codec metadata");

        self.validated
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, descriptor);

        Ok(Codec::new(self.clone(), descriptor))
    }
}

/// Walks the finite descriptor graph and rejects metadata the codec layer
/// cannot honor. Self-referential type graphs terminate via the visited set.
fn validate_descriptor(
    descriptor: &'static TypeDescriptor,
    visited: &mut Vec<*const TypeDescriptor>,
) -> DocbindResult<()> {
    let ptr = descriptor as *const TypeDescriptor;
    if visited.contains(&ptr) {
        return Ok(());
    }
    visited.push(ptr);

    let check = |field: &IdField| -> DocbindResult<()> {
        if let crate::document::IdRepr::Other(declared) = field.repr {
            if field.convert {
                return Err(DocbindError::Configuration {
                    type_name: descriptor.type_name,
                    reason: format!(
                        "identifier field '{}' has declared type {} which has no canonical identifier conversion",
                        field.name, declared,
                    ),
                });
            }
        }
        Ok(())
    };

    if let Some(id) = &descriptor.id {
        check(id)?;
    }
    for field in descriptor.converted {
        check(field)?;
    }
    for embedded in descriptor.embedded {
        validate_descriptor((embedded.descriptor)(), visited)?;
    }

    Ok(())
}

/// Paired encode/decode logic bound to one declared type.
///
/// Holds only the registry handle and the type's static descriptor; safe to
/// clone and reuse concurrently.
pub struct Codec<D> {
    registry: CodecRegistry,
    descriptor: &'static TypeDescriptor,
    _marker: PhantomData<fn() -> D>,
}

impl<D> Clone for Codec<D> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            descriptor: self.descriptor,
            _marker: PhantomData,
        }
    }
}

impl<D> std::fmt::Debug for Codec<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("type_name", &self.descriptor.type_name)
            .finish()
    }
}

impl<D: Mapped> Codec<D> {
    fn new(registry: CodecRegistry, descriptor: &'static TypeDescriptor) -> Self {
        Self { registry, descriptor, _marker: PhantomData }
    }

    /// The registry this codec was issued by.
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// The declared type's mapping metadata.
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    /// Serializes a typed value into a store document.
    ///
    /// An absent identifier is omitted from the produced document so the
    /// driver can assign one.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Format`] if the engine cannot serialize the
    /// value or an identifier field does not match its declared
    /// representation.
    pub fn encode(&self, value: &D) -> DocbindResult<Document> {
        let tree = serialize_to_bson(value)?;
        let Bson::Document(mut doc) = tree else {
            return Err(DocbindError::Format(format!(
                "type {} serialized to {}, expected a document",
                self.descriptor.type_name,
                bson_type_name(&tree),
            )));
        };

        encode_tree(&mut doc, self.descriptor)?;
        Ok(doc)
    }

    /// Deserializes a store document into the declared type.
    ///
    /// Null and undefined store-side values both normalize to the declared
    /// type's absent value; unknown store-side fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Format`] when the document's shape is
    /// irreconcilable with the declared type.
    pub fn decode(&self, mut doc: Document) -> DocbindResult<D> {
        decode_tree(&mut doc, self.descriptor)?;
        let doc = strip_absent(&doc);
        deserialize_from_bson(Bson::Document(doc))
            .map_err(|e| DocbindError::Format(e.to_string()))
    }

    /// Applies the decorator interception rule to a supplied filter.
    ///
    /// A typed expression is initialized with this codec's type context and
    /// translated; a raw document is re-serialized field-by-field, leaving
    /// `$`-prefixed operator keys untouched.
    pub fn filter_document(&self, filter: impl Into<FilterSpec>) -> DocbindResult<Document> {
        match filter.into() {
            FilterSpec::Expr(expr) => {
                ExprTranslator { descriptor: self.descriptor }.visit_expr(&expr)
            }
            FilterSpec::Document(doc) => serialize_filter_tree(&doc, self.descriptor),
        }
    }

    /// Rewrites a sort or projection specification, mapping declared
    /// identifier field names to their stored `_id` form. Direction and
    /// inclusion values forward verbatim.
    pub fn keyed_document(&self, spec: &Document) -> DocbindResult<Document> {
        Ok(spec
            .iter()
            .map(|(key, value)| {
                let (path, _) = resolve_path(self.descriptor, key);
                (path, value.clone())
            })
            .collect())
    }

    /// Rewrites an aggregation pipeline: `$match` stages go through the
    /// filter rule, `$sort` stages through the key-mapping rule, and every
    /// other stage forwards verbatim.
    pub fn pipeline_documents(&self, stages: Vec<Document>) -> DocbindResult<Vec<Document>> {
        stages
            .into_iter()
            .map(|stage| {
                stage
                    .iter()
                    .map(|(key, value)| match (key.as_str(), value) {
                        ("$match", Bson::Document(filter)) => Ok((
                            key.clone(),
                            Bson::Document(serialize_filter_tree(filter, self.descriptor)?),
                        )),
                        ("$sort", Bson::Document(sort)) => {
                            Ok((key.clone(), Bson::Document(self.keyed_document(sort)?)))
                        }
                        _ => Ok((key.clone(), value.clone())),
                    })
                    .collect::<DocbindResult<Document>>()
            })
            .collect()
    }

    /// Structurally serializes an arbitrary typed value into a document,
    /// for value-bearing builder arguments that are not filters (for
    /// example a map-reduce scope).
    pub fn value_document<T: serde::Serialize>(&self, value: &T) -> DocbindResult<Document> {
        let tree = serialize_to_bson(value)?;
        match tree {
            Bson::Document(doc) => Ok(doc),
            other => Err(DocbindError::Format(format!(
                "expected a document value, got {}",
                bson_type_name(&other),
            ))),
        }
    }

    /// Converts an identifier given in the declared application
    /// representation into the value stored under `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Configuration`] if the type declares no
    /// identifier field, or [`DocbindError::Format`] for a malformed value.
    pub fn store_id(&self, value: impl Into<Bson>) -> DocbindResult<Bson> {
        let Some(id) = &self.descriptor.id else {
            return Err(DocbindError::Configuration {
                type_name: self.descriptor.type_name,
                reason: "no identifier field declared".to_string(),
            });
        };

        let value = value.into();
        if id.convert { to_store_id(&value, id.repr) } else { Ok(value) }
    }
}

fn encode_tree(doc: &mut Document, descriptor: &TypeDescriptor) -> DocbindResult<()> {
    if let Some(id) = &descriptor.id {
        match doc.remove(id.name) {
            // An absent identifier is left out entirely; the driver assigns one.
            None | Some(Bson::Null) | Some(Bson::Undefined) => {}
            Some(value) => {
                let stored = if id.convert { to_store_id(&value, id.repr)? } else { value };
                doc.insert("_id", stored);
            }
        }
    }

    for field in descriptor.converted {
        if let Some(value) = doc.get(field.name).cloned() {
            if !matches!(value, Bson::Null | Bson::Undefined) {
                doc.insert(field.name, to_store_id(&value, field.repr)?);
            }
        }
    }

    recurse_embedded(doc, descriptor, encode_tree)
}

fn decode_tree(doc: &mut Document, descriptor: &TypeDescriptor) -> DocbindResult<()> {
    if let Some(id) = &descriptor.id {
        if let Some(value) = doc.remove("_id") {
            let restored = if id.convert || matches!(value, Bson::ObjectId(_)) {
                from_store_id(&value, id.repr)?
            } else {
                value
            };
            doc.insert(id.name, restored);
        }
    }

    for field in descriptor.converted {
        if let Some(value) = doc.get(field.name).cloned() {
            doc.insert(field.name, from_store_id(&value, field.repr)?);
        }
    }

    recurse_embedded(doc, descriptor, decode_tree)
}

fn recurse_embedded(
    doc: &mut Document,
    descriptor: &TypeDescriptor,
    apply: fn(&mut Document, &TypeDescriptor) -> DocbindResult<()>,
) -> DocbindResult<()> {
    for embedded in descriptor.embedded {
        match doc.get_mut(embedded.name) {
            Some(Bson::Document(inner)) => apply(inner, (embedded.descriptor)())?,
            Some(Bson::Array(items)) => {
                for item in items {
                    if let Bson::Document(inner) = item {
                        apply(inner, (embedded.descriptor)())?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Drops null and undefined fields so both decode to the declared type's
/// absent value, indistinguishably. Changing this would break round trips
/// against existing stored data.
fn strip_absent(doc: &Document) -> Document {
    doc.iter()
        .filter(|(_, value)| !matches!(value, Bson::Null | Bson::Undefined))
        .map(|(key, value)| (key.clone(), strip_absent_value(value)))
        .collect()
}

fn strip_absent_value(value: &Bson) -> Bson {
    match value {
        Bson::Document(doc) => Bson::Document(strip_absent(doc)),
        Bson::Array(items) => Bson::Array(items.iter().map(strip_absent_value).collect()),
        other => other.clone(),
    }
}

enum FieldKind<'a> {
    Id(IdField),
    Embedded(&'a TypeDescriptor),
    Plain,
}

/// Maps a declared (possibly dotted) field path to its stored form and
/// resolves what kind of handling the final segment needs.
fn resolve_path<'a>(descriptor: &'a TypeDescriptor, path: &str) -> (String, FieldKind<'a>) {
    let mut current = descriptor;
    let mut mapped: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('.').collect();

    for (index, segment) in segments.iter().copied().enumerate() {
        if index + 1 == segments.len() {
            if let Some(id) = current.id_field(segment) {
                let is_primary = current
                    .id
                    .as_ref()
                    .is_some_and(|f| f.name == segment || segment == "_id");
                mapped.push(if is_primary { "_id" } else { segment });
                return (mapped.join("."), FieldKind::Id(*id));
            }
            if let Some(embedded) = current.embedded_field(segment) {
                mapped.push(segment);
                return (mapped.join("."), FieldKind::Embedded((embedded.descriptor)()));
            }
            mapped.push(segment);
            return (mapped.join("."), FieldKind::Plain);
        }

        match current.embedded_field(segment) {
            Some(embedded) => {
                mapped.push(segment);
                current = (embedded.descriptor)();
            }
            None => {
                // No metadata past this point; forward the rest untouched.
                mapped.extend(segments[index..].iter().copied());
                return (mapped.join("."), FieldKind::Plain);
            }
        }
    }

    (path.to_string(), FieldKind::Plain)
}

fn serialize_filter_tree(filter: &Document, descriptor: &TypeDescriptor) -> DocbindResult<Document> {
    let mut out = Document::new();

    for (key, value) in filter {
        if key.starts_with('$') {
            // Logical operator; its operands are themselves filters.
            let rewritten = match value {
                Bson::Array(items) => Bson::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Bson::Document(inner) => {
                                Ok(Bson::Document(serialize_filter_tree(inner, descriptor)?))
                            }
                            other => Ok(other.clone()),
                        })
                        .collect::<DocbindResult<_>>()?,
                ),
                Bson::Document(inner) => {
                    Bson::Document(serialize_filter_tree(inner, descriptor)?)
                }
                other => other.clone(),
            };
            out.insert(key, rewritten);
            continue;
        }

        let (path, kind) = resolve_path(descriptor, key);
        let condition = match &kind {
            FieldKind::Id(id) => serialize_id_condition(value, id)?,
            FieldKind::Embedded(embedded) => match value {
                Bson::Document(inner) if !is_operator_document(inner) => {
                    // Exact-match sub-document; nested identifier fields still convert.
                    Bson::Document(serialize_filter_tree(inner, embedded)?)
                }
                other => other.clone(),
            },
            FieldKind::Plain => value.clone(),
        };
        out.insert(path, condition);
    }

    Ok(out)
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|key| key.starts_with('$'))
}

/// Converts the operand(s) of a condition on an identifier field. Operator
/// keys themselves always forward unchanged.
fn serialize_id_condition(value: &Bson, id: &IdField) -> DocbindResult<Bson> {
    if !id.convert {
        return Ok(value.clone());
    }

    match value {
        Bson::Document(ops) if is_operator_document(ops) => Ok(Bson::Document(
            ops.iter()
                .map(|(op, operand)| {
                    let converted = match (op.as_str(), operand) {
                        ("$in" | "$nin" | "$all", Bson::Array(items)) => Bson::Array(
                            items
                                .iter()
                                .map(|item| to_store_id(item, id.repr))
                                .collect::<DocbindResult<_>>()?,
                        ),
                        ("$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte", operand) => {
                            to_store_id(operand, id.repr)?
                        }
                        // $exists, $type and friends carry no identifier value.
                        (_, operand) => operand.clone(),
                    };
                    Ok((op.clone(), converted))
                })
                .collect::<DocbindResult<Document>>()?,
        )),
        direct => to_store_id(direct, id.repr),
    }
}

/// Translates typed filter expressions into store-native filter documents,
/// applying identifier conversion for the declared type's marked fields.
struct ExprTranslator<'a> {
    descriptor: &'a TypeDescriptor,
}

impl ExprTranslator<'_> {
    fn operand(&self, field: &str, value: &Bson) -> DocbindResult<(String, Bson)> {
        let (path, kind) = resolve_path(self.descriptor, field);
        let converted = match &kind {
            FieldKind::Id(id) if id.convert => match value {
                Bson::Array(items) => Bson::Array(
                    items
                        .iter()
                        .map(|item| to_store_id(item, id.repr))
                        .collect::<DocbindResult<_>>()?,
                ),
                single => to_store_id(single, id.repr)?,
            },
            _ => value.clone(),
        };
        Ok((path, converted))
    }
}

impl QueryVisitor for ExprTranslator<'_> {
    type Output = Document;
    type Error = DocbindError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$not": self.visit_expr(expr)?,
        })
    }

    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error> {
        let (path, _) = resolve_path(self.descriptor, field);
        Ok(doc! {
            path: { "$exists": should_exist },
        })
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        let (path, value) = self.operand(field, value)?;
        Ok(doc! {
            path: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": format!(".*{}.*", s), "$options": "i" },
                    Bson::Array(arr) => doc! { "$all": arr },
                    _ => return Err(DocbindError::Query("Contains operator requires a string or array value".to_string())),
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": format!(".*{}.*", s), "$options": "i" } },
                    Bson::Array(arr) => doc! { "$nin": arr },
                    _ => return Err(DocbindError::Query("NotContains operator requires a string or array value".to_string())),
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", s), "$options": "i" },
                    _ => return Err(DocbindError::Query("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", s), "$options": "i" },
                    _ => return Err(DocbindError::Query("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::NoneOf => doc! { "$nin": value },
            }
        })
    }
}
