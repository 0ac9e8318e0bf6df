//! Store driver contracts.
//!
//! This module defines the interfaces the mapping layer expects from a
//! document-store driver: a connection-level [`Driver`], per-collection
//! operations ([`DriverCollection`]), and the fluent, stateful query builders
//! the driver hands out ([`FindDriver`], [`AggregateDriver`],
//! [`MapReduceDriver`]). The mapping layer only ever gives these contracts
//! fully store-native documents; everything type-aware happens above them in
//! the codec layer and the builder decorators.
//!
//! # Thread Safety
//!
//! Driver and collection implementations must be thread-safe and support
//! concurrent access from multiple async tasks. Builders are single-owner
//! values consumed by their terminal call.
//!
//! # Error Handling
//!
//! Operations return [`DocbindResult<T>`](crate::error::DocbindResult).
//! Failures surface to the caller of the operation that triggered them;
//! nothing in this layer retries.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use bson::Document;

use crate::error::DocbindResult;

/// Connection-level driver interface.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// The per-collection handle this driver hands out.
    type Collection: DriverCollection;

    /// Returns a handle to the named collection. The collection is created
    /// lazily by the store on first write if it does not exist.
    fn collection(&self, name: &str) -> Self::Collection;

    /// Creates a new, empty collection with the given name.
    async fn create_collection(&self, name: &str) -> DocbindResult<()>;

    /// Drops a collection and all its documents.
    async fn drop_collection(&self, name: &str) -> DocbindResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocbindResult<Vec<String>>;

    /// Cleanly shuts down the driver, releasing held resources.
    ///
    /// The default implementation is a no-op; drivers holding connections
    /// should override it.
    async fn shutdown(self) -> DocbindResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Per-collection driver operations.
///
/// All filter arguments are store-native documents; drivers perform no
/// type-aware rewriting of their own. A driver must assign a canonical
/// object identifier to any inserted document that carries no `_id`; the
/// mapping layer never generates identifiers.
#[async_trait]
pub trait DriverCollection: Send + Sync {
    /// The fluent find builder for this collection.
    type Find: FindDriver;
    /// The fluent aggregation builder for this collection.
    type Aggregate: AggregateDriver;
    /// The fluent map-reduce builder for this collection.
    type MapReduce: MapReduceDriver;

    /// The collection's name.
    fn name(&self) -> &str;

    /// Starts a find operation over the collection.
    fn find(&self) -> Self::Find;

    /// Starts an aggregation over the collection with the given pipeline.
    fn aggregate(&self, pipeline: Vec<Document>) -> Self::Aggregate;

    /// Starts a map-reduce operation with the given map and reduce
    /// functions (store-side JavaScript source).
    fn map_reduce(&self, map: &str, reduce: &str) -> Self::MapReduce;

    /// Inserts documents, assigning an object identifier to any document
    /// without an `_id`. Fails on duplicate identifiers.
    async fn insert_many(&self, documents: Vec<Document>) -> DocbindResult<()>;

    /// Replaces the first document matching `filter` with `replacement`,
    /// returning the number of documents modified (0 or 1). The stored
    /// `_id` is preserved when the replacement carries none.
    async fn replace_one(&self, filter: Document, replacement: Document) -> DocbindResult<u64>;

    /// Deletes every document matching `filter`, returning the number
    /// deleted.
    async fn delete_many(&self, filter: Document) -> DocbindResult<u64>;

    /// Counts documents matching `filter`.
    async fn count(&self, filter: Document) -> DocbindResult<u64>;

    /// Drops this collection.
    async fn drop(&self) -> DocbindResult<()>;
}

/// The driver's fluent find builder.
///
/// Builder methods consume and return the builder; terminal methods consume
/// it and run the query.
#[async_trait]
pub trait FindDriver: Send + Sized {
    /// Sets the query filter.
    fn filter(self, filter: Document) -> Self;

    /// Sets the sort specification.
    fn sort(self, sort: Document) -> Self;

    /// Sets the projection specification.
    fn projection(self, projection: Document) -> Self;

    /// Limits the number of returned documents.
    fn limit(self, limit: i64) -> Self;

    /// Skips the first `skip` matching documents.
    fn skip(self, skip: u64) -> Self;

    /// Sets the cursor batch size.
    fn batch_size(self, batch_size: u32) -> Self;

    /// Sets the server-side time limit for the operation.
    fn max_time(self, max_time: Duration) -> Self;

    /// Sets the collation, forwarded opaquely to the store.
    fn collation(self, collation: Document) -> Self;

    /// Runs the query and returns the first matching document.
    async fn first(self) -> DocbindResult<Option<Document>>;

    /// Runs the query and materializes all matching documents.
    async fn collect(self) -> DocbindResult<Vec<Document>>;
}

/// The driver's fluent aggregation builder. The pipeline itself is supplied
/// when the builder is created; every method here is pure configuration.
#[async_trait]
pub trait AggregateDriver: Send + Sized {
    /// Sets the cursor batch size.
    fn batch_size(self, batch_size: u32) -> Self;

    /// Enables writing temporary data to disk during the aggregation.
    fn allow_disk_use(self, allow_disk_use: bool) -> Self;

    /// Bypasses document validation for stages that write.
    fn bypass_document_validation(self, bypass: bool) -> Self;

    /// Sets the server-side time limit for the operation.
    fn max_time(self, max_time: Duration) -> Self;

    /// Sets the collation, forwarded opaquely to the store.
    fn collation(self, collation: Document) -> Self;

    /// Runs the aggregation and materializes the result documents.
    async fn collect(self) -> DocbindResult<Vec<Document>>;
}

/// The driver's fluent map-reduce builder.
#[async_trait]
pub trait MapReduceDriver: Send + Sized {
    /// Sets the filter applied before the map phase.
    fn filter(self, filter: Document) -> Self;

    /// Sets the sort applied to the input documents.
    fn sort(self, sort: Document) -> Self;

    /// Sets the global scope document visible to the map, reduce, and
    /// finalize functions.
    fn scope(self, scope: Document) -> Self;

    /// Limits the number of documents fed to the map phase.
    fn limit(self, limit: i64) -> Self;

    /// Keeps intermediate values as JavaScript objects between phases.
    fn js_mode(self, js_mode: bool) -> Self;

    /// Includes timing information in the result.
    fn verbose(self, verbose: bool) -> Self;

    /// Sets the server-side time limit for the operation.
    fn max_time(self, max_time: Duration) -> Self;

    /// Sets the collation, forwarded opaquely to the store.
    fn collation(self, collation: Document) -> Self;

    /// Runs the operation and materializes the inline result documents.
    async fn collect(self) -> DocbindResult<Vec<Document>>;
}
