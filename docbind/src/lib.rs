//! Main docbind crate providing a typed object-document mapping layer.
//!
//! This crate is the primary entry point for users of the docbind framework.
//! It re-exports the core types and functionality from the sub-crates and
//! provides convenient access to the available drivers.
//!
//! # Features
//!
//! - **Typed documents** - Declare plain serde structs and derive their
//!   mapping metadata with `#[derive(Document)]`
//! - **Identifier polymorphism** - Declare identifiers as strings, byte
//!   sequences, or the canonical object-identifier type; storage always uses
//!   the canonical 12-byte form
//! - **Typed queries** - Build filters against declared fields; every
//!   value-bearing builder argument is re-serialized through the type's
//!   codec before it reaches the driver
//! - **Multiple drivers** - In-memory driver for development and tests,
//!   MongoDB driver behind the `mongodb` feature
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{prelude::*, memory::MemoryDriver};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
//! #[document(collection = "users")]
//! pub struct User {
//!     #[document(id, object_id)]
//!     pub id: Option<String>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Store::new(MemoryDriver::new());
//!     let users = store.collection::<User>().unwrap();
//!
//!     // The identifier is unset; the driver assigns one on insert.
//!     users
//!         .insert_one(User { id: None, name: "Alice".to_string() })
//!         .await
//!         .unwrap();
//!
//!     let found = users
//!         .find()
//!         .filter(Filter::eq("name", "Alice"))
//!         .first()
//!         .await
//!         .unwrap()
//!         .unwrap();
//!
//!     // Read back as a 24-character hex string.
//!     assert_eq!(found.id.as_ref().unwrap().len(), 24);
//!
//!     store.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use docbind_core::{codec, collection, decorate, document, driver, error, oid, query, store};

// Re-export the derive macros next to the traits they implement.
pub use docbind_macros::{Document, Mapped};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementation.
pub mod memory {
    pub use docbind_memory::{MemoryCollection, MemoryDriver};
}

/// MongoDB driver implementation.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docbind_mongodb::{MongoDriver, MongoDriverBuilder};
}
