//! Error types and result types for mapping-layer operations.
//!
//! This module provides error handling for every stage of the bridge between
//! typed values and store documents. Use [`DocbindResult<T>`] as the return
//! type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised while mapping typed values to and
/// from store documents, or while talking to a driver.
///
/// Conversion failures (`Format`), malformed query expressions (`Query`) and
/// unusable type declarations (`Configuration`) are produced by this layer;
/// `Driver` and `Initialization` wrap failures surfaced by the store driver.
#[derive(Error, Debug)]
pub enum DocbindError {
    /// A value could not be converted to or from its declared type: a bad
    /// identifier string, a wrong-length byte sequence, or a store document
    /// whose shape is irreconcilable with the declared field type.
    #[error("Format error: {0}")]
    Format(String),
    /// A malformed filter or query expression. Never swallowed: a bad query
    /// fragment fails the call that supplied it.
    #[error("Query error: {0}")]
    Query(String),
    /// A declared type lacks usable mapping metadata. Raised on the first
    /// codec lookup for the type, before any document reaches the store.
    #[error("Configuration error for type {type_name}: {reason}")]
    Configuration {
        /// The declared type whose metadata could not be validated.
        type_name: &'static str,
        /// What made the metadata unusable.
        reason: String,
    },
    /// An error surfaced by the underlying store driver.
    #[error("Driver error: {0}")]
    Driver(String),
    /// Error during driver initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

/// A specialized `Result` type for mapping-layer operations.
pub type DocbindResult<T> = Result<T, DocbindError>;

impl From<BsonError> for DocbindError {
    fn from(err: BsonError) -> Self {
        DocbindError::Format(err.to_string())
    }
}

impl From<SerdeJsonError> for DocbindError {
    fn from(err: SerdeJsonError) -> Self {
        DocbindError::Format(err.to_string())
    }
}
