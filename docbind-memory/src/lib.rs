//! In-memory driver for docbind.
//!
//! This crate provides a thread-safe, in-memory implementation of the driver
//! contracts. It evaluates store-native filter documents directly, assigns
//! object identifiers on insert, and supports sorting, pagination,
//! projection, and a small aggregation subset. Ideal for development and
//! tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{prelude::*, memory::MemoryDriver};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! #[document(collection = "users")]
//! pub struct User {
//!     #[document(id, object_id)]
//!     pub id: Option<String>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::new(MemoryDriver::new());
//!     let users = store.collection::<User>()?;
//!
//!     users
//!         .insert_one(User { id: None, name: "Alice".to_string() })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_memory;

pub mod evaluator;
pub mod store;

pub use store::{MemoryCollection, MemoryDriver};
