//! Conversion between application-facing identifier values and the store's
//! canonical 12-byte object-identifier type.
//!
//! Application code may declare an identifier field as the canonical type, as
//! a 24-character hex string, or as a 12-byte sequence. This module converts
//! those representations to and from the canonical form. It never generates a
//! fresh identifier and never mutates its input; assigning an identifier to
//! a document that carries none is the driver's job.

use bson::{Bson, oid::ObjectId};

use crate::{
    document::IdRepr,
    error::{DocbindError, DocbindResult},
};

/// Converts an application-facing identifier value into the store's
/// canonical object-identifier form.
///
/// `Null` and `Undefined` propagate unchanged so absent identifiers stay
/// absent.
///
/// # Errors
///
/// Returns [`DocbindError::Format`] when the value does not match the
/// declared representation: a hex string that is not exactly 24 hex
/// characters, a byte sequence that is not exactly 12 bytes, or a value of
/// an unexpected BSON type.
pub fn to_store_id(value: &Bson, repr: IdRepr) -> DocbindResult<Bson> {
    match value {
        Bson::Null | Bson::Undefined => return Ok(value.clone()),
        Bson::ObjectId(_) => return Ok(value.clone()),
        _ => {}
    }

    match repr {
        IdRepr::ObjectId => Err(DocbindError::Format(format!(
            "expected an object id, got {}",
            bson_type_name(value),
        ))),
        IdRepr::Hex => match value {
            Bson::String(text) => Ok(Bson::ObjectId(parse_hex_id(text)?)),
            other => Err(DocbindError::Format(format!(
                "expected a hex identifier string, got {}",
                bson_type_name(other),
            ))),
        },
        IdRepr::Bytes => {
            let bytes = id_bytes(value)?;
            Ok(Bson::ObjectId(ObjectId::from_bytes(bytes)))
        }
        IdRepr::Other(type_name) => Err(DocbindError::Format(format!(
            "type {} cannot be converted to an object id",
            type_name,
        ))),
    }
}

/// Converts a stored identifier value back to the declared application
/// representation.
///
/// A stored value that already matches the declared representation passes
/// through unchanged, so collections written before identifier conversion
/// was enabled remain readable. Byte-sequence identifiers are rendered as an
/// integer array, the form the serialization engine expects for a declared
/// byte sequence.
///
/// # Errors
///
/// Returns [`DocbindError::Format`] when the stored value matches neither
/// the canonical form nor the declared representation.
pub fn from_store_id(value: &Bson, repr: IdRepr) -> DocbindResult<Bson> {
    if matches!(value, Bson::Null | Bson::Undefined) {
        return Ok(value.clone());
    }

    match (value, repr) {
        (Bson::ObjectId(_), IdRepr::ObjectId) => Ok(value.clone()),
        (Bson::ObjectId(oid), IdRepr::Hex) => Ok(Bson::String(oid.to_hex())),
        (Bson::ObjectId(oid), IdRepr::Bytes) => Ok(Bson::Array(
            oid.bytes()
                .iter()
                .map(|byte| Bson::Int32(*byte as i32))
                .collect(),
        )),
        (Bson::String(_), IdRepr::Hex) => Ok(value.clone()),
        (Bson::Binary(_) | Bson::Array(_), IdRepr::Bytes) => Ok(value.clone()),
        (other, repr) => Err(DocbindError::Format(format!(
            "stored identifier of type {} cannot be read as {:?}",
            bson_type_name(other),
            repr,
        ))),
    }
}

/// Parses a 24-character lowercase-or-uppercase hex string into the
/// canonical identifier type.
pub fn parse_hex_id(text: &str) -> DocbindResult<ObjectId> {
    if text.len() != 24 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DocbindError::Format(format!(
            "invalid object id string '{}': expected 24 hex characters",
            text,
        )));
    }

    ObjectId::parse_str(text).map_err(|e| DocbindError::Format(e.to_string()))
}

/// Extracts exactly 12 identifier bytes from a binary value or from the
/// integer-array form the serialization engine produces for byte sequences.
fn id_bytes(value: &Bson) -> DocbindResult<[u8; 12]> {
    let bytes: Vec<u8> = match value {
        Bson::Binary(binary) => binary.bytes.clone(),
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::Int32(n) if (0..=255).contains(n) => Ok(*n as u8),
                Bson::Int64(n) if (0..=255).contains(n) => Ok(*n as u8),
                other => Err(DocbindError::Format(format!(
                    "byte identifier element must be a byte, got {}",
                    bson_type_name(other),
                ))),
            })
            .collect::<DocbindResult<_>>()?,
        other => {
            return Err(DocbindError::Format(format!(
                "expected a byte identifier, got {}",
                bson_type_name(other),
            )));
        }
    };

    <[u8; 12]>::try_from(bytes.as_slice()).map_err(|_| {
        DocbindError::Format(format!(
            "byte identifier must be exactly 12 bytes, got {}",
            bytes.len(),
        ))
    })
}

pub(crate) fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "boolean",
        Bson::Null => "null",
        Bson::Undefined => "undefined",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::ObjectId(_) => "objectid",
        Bson::DateTime(_) => "datetime",
        Bson::Binary(_) => "binary",
        _ => "value",
    }
}
