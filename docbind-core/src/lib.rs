//! Typed object-document mapping over BSON document stores.
//!
//! This crate is the core of the docbind project. It bridges the serde
//! serialization engine and a document-store driver so application code
//! reads, writes, and queries declared Rust types instead of raw documents:
//!
//! - **Document model** ([`document`]) - Mapping traits and per-type
//!   descriptor metadata
//! - **Identifier conversion** ([`oid`]) - String / byte-sequence /
//!   canonical representations of the 12-byte object identifier
//! - **Codecs** ([`codec`]) - Per-type encode/decode and the shared codec
//!   registry
//! - **Typed queries** ([`query`]) - Filter expressions built against
//!   declared fields
//! - **Driver contracts** ([`driver`]) - The interfaces a store driver
//!   implements
//! - **Builder decorators** ([`decorate`]) - Wrappers over the driver's
//!   fluent builders that re-serialize every value-bearing argument
//! - **Collections and store** ([`collection`], [`store`]) - The typed API
//!   surface
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
//! #[document(collection = "users")]
//! pub struct User {
//!     #[document(id, object_id)]
//!     pub id: Option<String>,
//!     pub name: String,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_core;

pub mod codec;
pub mod collection;
pub mod decorate;
pub mod document;
pub mod driver;
pub mod error;
pub mod oid;
pub mod query;
pub mod store;
