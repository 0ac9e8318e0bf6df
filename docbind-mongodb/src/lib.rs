//! MongoDB driver adapter for docbind.
//!
//! Implements the docbind driver contracts over the official MongoDB async
//! driver. The mapping layer hands this adapter fully store-native documents
//! (typed values, identifier conversion, and filter rewriting all happen
//! above it), so the adapter's job is limited to forwarding operations and
//! translating options and errors.
//!
//! To use this driver, enable the `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! docbind = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docbind::{prelude::*, mongodb::MongoDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = MongoDriver::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let store = Store::new(driver);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_mongodb;

pub mod store;

pub use store::{MongoDriver, MongoDriverBuilder};
