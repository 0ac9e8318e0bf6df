//! Convenient re-exports of commonly used types from docbind.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docbind::prelude::*;
//! ```
//!
//! This provides access to:
//! - Document traits and the derive macros
//! - The store handle and typed collections
//! - Query construction and filtering
//! - Driver contracts
//! - Error types

pub use docbind_core::{
    codec::{Codec, CodecRegistry},
    collection::TypedCollection,
    decorate::{DecoratedAggregate, DecoratedFind, DecoratedMapReduce},
    document::{Document, IdRepr, Mapped, TypeDescriptor},
    driver::{AggregateDriver, Driver, DriverCollection, FindDriver, MapReduceDriver},
    error::{DocbindError, DocbindResult},
    query::{Expr, FieldOp, Filter, FilterSpec, QueryVisitor, SortDirection},
    store::Store,
};

pub use docbind_macros::{Document, Mapped};
