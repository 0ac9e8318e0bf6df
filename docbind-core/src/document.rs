//! Core traits and descriptor types for mapped documents.
//!
//! This module defines the two traits every stored type participates in:
//! [`Mapped`] for any struct the serialization engine can introspect, and
//! [`Document`] for top-level types bound to a collection. It also defines the
//! static metadata ([`TypeDescriptor`]) that drives identifier conversion and
//! embedded-type recursion in the codec layer.

use serde::{Serialize, de::DeserializeOwned};

/// Per-type mapping metadata, normally generated by `#[derive(Document)]` or
/// `#[derive(Mapped)]`.
///
/// A descriptor is a `'static` value computed at compile time. It records
/// which field (if any) maps to the store's `_id`, which fields are converted
/// to the canonical object-identifier type, and which fields embed other
/// mapped types. Embedded descriptors are bound lazily through a function
/// pointer so that self-referential type graphs resolve at encode/decode
/// time rather than at construction time.
#[derive(Debug)]
pub struct TypeDescriptor {
    /// The declared Rust type name, used in error reporting.
    pub type_name: &'static str,
    /// The field mapped to the store's `_id`, if one is declared.
    pub id: Option<IdField>,
    /// Non-`_id` fields stored as the canonical object-identifier type.
    pub converted: &'static [IdField],
    /// Fields whose values are themselves mapped types (directly, through
    /// `Option`, or as element type of a sequence).
    pub embedded: &'static [EmbeddedField],
}

impl TypeDescriptor {
    /// A descriptor for a type with no identifier handling and no embedded
    /// mapped fields. Useful for hand-written [`Mapped`] impls.
    pub const fn plain(type_name: &'static str) -> Self {
        TypeDescriptor {
            type_name,
            id: None,
            converted: &[],
            embedded: &[],
        }
    }

    /// Looks up an identifier-handled field by its declared name.
    ///
    /// The `_id` alias resolves to the declared identifier field, so filters
    /// written against either name behave identically.
    pub fn id_field(&self, name: &str) -> Option<&IdField> {
        match &self.id {
            Some(field) if field.name == name || name == "_id" => Some(field),
            _ => self
                .converted
                .iter()
                .find(|field| field.name == name),
        }
    }

    /// Looks up an embedded mapped field by name.
    pub fn embedded_field(&self, name: &str) -> Option<&EmbeddedField> {
        self.embedded
            .iter()
            .find(|field| field.name == name)
    }
}

/// A field converted between an application-facing identifier representation
/// and the store's canonical 12-byte object-identifier type.
#[derive(Debug, Clone, Copy)]
pub struct IdField {
    /// The declared field name.
    pub name: &'static str,
    /// The application-facing representation of the identifier.
    pub repr: IdRepr,
    /// Whether values are converted to the canonical form on write.
    ///
    /// An identifier field without conversion stores whatever value the
    /// application supplies (for example a plain string key), but still
    /// tolerates reading back a canonical identifier the driver assigned.
    pub convert: bool,
}

/// The application-facing representation of an identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRepr {
    /// The canonical object-identifier type itself; values pass through.
    ObjectId,
    /// A string of exactly 24 lowercase hex characters.
    Hex,
    /// A sequence of exactly 12 raw bytes.
    Bytes,
    /// An unsupported declared type; rejected at the first codec lookup.
    Other(&'static str),
}

/// A field whose value is another mapped type.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedField {
    /// The declared field name.
    pub name: &'static str,
    /// Deferred descriptor lookup for the embedded type.
    pub descriptor: fn() -> &'static TypeDescriptor,
}

/// A type the serialization engine can introspect for mapping purposes.
///
/// Implemented by `#[derive(Mapped)]` (or as part of `#[derive(Document)]`).
/// Embedded value types and query result types implement only this trait;
/// they carry no collection binding of their own.
pub trait Mapped: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the static mapping metadata for this type.
    fn descriptor() -> &'static TypeDescriptor;
}

/// A top-level mapped type bound to a named collection.
///
/// # Example
///
/// ```ignore
/// use docbind::prelude::*;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
/// #[document(collection = "users")]
/// pub struct User {
///     #[document(id, object_id)]
///     pub id: Option<String>,
///     pub name: String,
/// }
/// ```
pub trait Document: Mapped {
    /// Returns the name of the collection this document belongs to.
    ///
    /// This should be a static, lowercase identifier (e.g., "users").
    fn collection_name() -> &'static str;
}
