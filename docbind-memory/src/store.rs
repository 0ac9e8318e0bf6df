//! In-memory driver implementation.
//!
//! Stores each collection as an insertion-ordered vector of documents behind
//! an async-aware read-write lock. Documents arrive already store-native
//! (the mapping layer serialized them), so this driver only assigns missing
//! identifiers, evaluates filters, and applies sort/skip/limit/projection.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use docbind_core::{
    driver::{AggregateDriver, Driver, DriverCollection, FindDriver, MapReduceDriver},
    error::{DocbindError, DocbindResult},
};

use crate::evaluator::{filter_documents, project_document, sort_documents};

type CollectionVec = Vec<Document>;
type StoreMap = HashMap<String, CollectionVec>;

/// Thread-safe in-memory document driver.
///
/// `MemoryDriver` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same underlying data. Queries scan all documents in a
/// collection; fine for development and tests, not for large datasets.
///
/// # Example
///
/// ```ignore
/// use docbind::{prelude::*, memory::MemoryDriver};
///
/// let store = Store::new(MemoryDriver::new());
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryDriver {
    store: Arc<RwLock<StoreMap>>,
}

impl MemoryDriver {
    /// Creates a new empty in-memory driver.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Collection = MemoryCollection;

    fn collection(&self, name: &str) -> MemoryCollection {
        MemoryCollection {
            name: name.to_string(),
            store: self.store.clone(),
        }
    }

    async fn create_collection(&self, name: &str) -> DocbindResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocbindResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocbindError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocbindResult<Vec<String>> {
        Ok(self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect())
    }
}

/// A handle to one in-memory collection.
#[derive(Clone, Debug)]
pub struct MemoryCollection {
    name: String,
    store: Arc<RwLock<StoreMap>>,
}

#[async_trait]
impl DriverCollection for MemoryCollection {
    type Find = MemoryFind;
    type Aggregate = MemoryAggregate;
    type MapReduce = MemoryMapReduce;

    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self) -> MemoryFind {
        MemoryFind {
            name: self.name.clone(),
            store: self.store.clone(),
            filter: None,
            sort: None,
            projection: None,
            limit: None,
            skip: None,
        }
    }

    fn aggregate(&self, pipeline: Vec<Document>) -> MemoryAggregate {
        MemoryAggregate {
            name: self.name.clone(),
            store: self.store.clone(),
            pipeline,
        }
    }

    fn map_reduce(&self, _map: &str, _reduce: &str) -> MemoryMapReduce {
        MemoryMapReduce
    }

    async fn insert_many(&self, documents: Vec<Document>) -> DocbindResult<()> {
        let mut store = self.store.write().await;
        let collection = store
            .entry(self.name.clone())
            .or_default();

        for mut document in documents {
            // Identifier assignment is the driver's job; the mapping layer
            // omits absent identifiers entirely.
            if document.get("_id").is_none() {
                document.insert("_id", Bson::ObjectId(ObjectId::new()));
            }

            let id = document
                .get("_id")
                .cloned()
                .unwrap_or(Bson::Null);
            if collection
                .iter()
                .any(|existing| existing.get("_id") == Some(&id))
            {
                return Err(DocbindError::DocumentAlreadyExists(
                    id.to_string(),
                    self.name.clone(),
                ));
            }

            collection.push(document);
        }

        Ok(())
    }

    async fn replace_one(
        &self,
        filter: Document,
        mut replacement: Document,
    ) -> DocbindResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection) = store.get_mut(&self.name) else {
            return Ok(0);
        };

        for document in collection.iter_mut() {
            if crate::evaluator::FilterEvaluator::new(document).matches(&filter)? {
                // The stored identifier survives a replacement that carries none.
                if replacement.get("_id").is_none() {
                    if let Some(id) = document.get("_id").cloned() {
                        replacement.insert("_id", id);
                    }
                }
                *document = replacement;
                return Ok(1);
            }
        }

        Ok(0)
    }

    async fn delete_many(&self, filter: Document) -> DocbindResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection) = store.get_mut(&self.name) else {
            return Ok(0);
        };

        let before = collection.len();
        let kept = collection
            .iter()
            .map(|document| {
                crate::evaluator::FilterEvaluator::new(document)
                    .matches(&filter)
                    .map(|matched| (!matched).then(|| document.clone()))
            })
            .collect::<DocbindResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let deleted = (before - kept.len()) as u64;
        *collection = kept;
        Ok(deleted)
    }

    async fn count(&self, filter: Document) -> DocbindResult<u64> {
        let store = self.store.read().await;
        let Some(collection) = store.get(&self.name) else {
            return Ok(0);
        };

        Ok(filter_documents(collection.iter(), &filter)?.len() as u64)
    }

    async fn drop(&self) -> DocbindResult<()> {
        self.store.write().await.remove(&self.name);
        Ok(())
    }
}

/// In-memory find builder. Batch size, time limits, and collation are
/// advisory options with no effect here.
#[derive(Debug)]
pub struct MemoryFind {
    name: String,
    store: Arc<RwLock<StoreMap>>,
    filter: Option<Document>,
    sort: Option<Document>,
    projection: Option<Document>,
    limit: Option<i64>,
    skip: Option<u64>,
}

#[async_trait]
impl FindDriver for MemoryFind {
    fn filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    fn batch_size(self, _batch_size: u32) -> Self {
        self
    }

    fn max_time(self, _max_time: Duration) -> Self {
        self
    }

    fn collation(self, _collation: Document) -> Self {
        self
    }

    async fn first(self) -> DocbindResult<Option<Document>> {
        Ok(self.limit(1).collect().await?.into_iter().next())
    }

    async fn collect(self) -> DocbindResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = store
            .get(&self.name)
            .map(|collection| collection.as_slice())
            .unwrap_or_default();

        trace!(collection = %self.name, candidates = documents.len(), "scanning collection");

        let mut matched = match &self.filter {
            Some(filter) => filter_documents(documents.iter(), filter)?,
            None => documents.to_vec(),
        };

        if let Some(sort) = &self.sort {
            sort_documents(&mut matched, sort);
        }

        let selected = matched
            .into_iter()
            .skip(self.skip.unwrap_or(0) as usize)
            .take(self.limit.map(|limit| limit as usize).unwrap_or(usize::MAX));

        Ok(match &self.projection {
            Some(projection) => selected
                .map(|document| project_document(&document, projection))
                .collect(),
            None => selected.collect(),
        })
    }
}

/// In-memory aggregation builder supporting the `$match`, `$sort`, `$skip`,
/// and `$limit` stages. Configuration options are advisory no-ops.
#[derive(Debug)]
pub struct MemoryAggregate {
    name: String,
    store: Arc<RwLock<StoreMap>>,
    pipeline: Vec<Document>,
}

#[async_trait]
impl AggregateDriver for MemoryAggregate {
    fn batch_size(self, _batch_size: u32) -> Self {
        self
    }

    fn allow_disk_use(self, _allow_disk_use: bool) -> Self {
        self
    }

    fn bypass_document_validation(self, _bypass: bool) -> Self {
        self
    }

    fn max_time(self, _max_time: Duration) -> Self {
        self
    }

    fn collation(self, _collation: Document) -> Self {
        self
    }

    async fn collect(self) -> DocbindResult<Vec<Document>> {
        let store = self.store.read().await;
        let mut documents = store
            .get(&self.name)
            .cloned()
            .unwrap_or_default();
        drop(store);

        for stage in &self.pipeline {
            let Some((operator, argument)) = stage.iter().next() else {
                continue;
            };

            match (operator.as_str(), argument) {
                ("$match", Bson::Document(filter)) => {
                    documents = filter_documents(documents.iter(), filter)?;
                }
                ("$sort", Bson::Document(sort)) => {
                    sort_documents(&mut documents, sort);
                }
                ("$skip", argument) => {
                    let skip = integer_argument(argument).max(0) as usize;
                    documents = documents.into_iter().skip(skip).collect();
                }
                ("$limit", argument) => {
                    let limit = integer_argument(argument).max(0) as usize;
                    documents.truncate(limit);
                }
                (other, _) => {
                    return Err(DocbindError::Driver(format!(
                        "aggregation stage {other} is not supported by the in-memory driver",
                    )));
                }
            }
        }

        Ok(documents)
    }
}

fn integer_argument(argument: &Bson) -> i64 {
    match argument {
        Bson::Int32(n) => *n as i64,
        Bson::Int64(n) => *n,
        Bson::Double(n) => *n as i64,
        _ => 0,
    }
}

/// In-memory map-reduce builder. There is no JavaScript engine behind this
/// driver, so execution always fails; the builder exists to satisfy the
/// driver contract.
#[derive(Debug)]
pub struct MemoryMapReduce;

#[async_trait]
impl MapReduceDriver for MemoryMapReduce {
    fn filter(self, _filter: Document) -> Self {
        self
    }

    fn sort(self, _sort: Document) -> Self {
        self
    }

    fn scope(self, _scope: Document) -> Self {
        self
    }

    fn limit(self, _limit: i64) -> Self {
        self
    }

    fn js_mode(self, _js_mode: bool) -> Self {
        self
    }

    fn verbose(self, _verbose: bool) -> Self {
        self
    }

    fn max_time(self, _max_time: Duration) -> Self {
        self
    }

    fn collation(self, _collation: Document) -> Self {
        self
    }

    async fn collect(self) -> DocbindResult<Vec<Document>> {
        Err(DocbindError::Driver(
            "map-reduce is not supported by the in-memory driver".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn driver() -> MemoryDriver {
        MemoryDriver::new()
    }

    #[tokio::test]
    async fn insert_assigns_identifier_when_absent() {
        let collection = driver().collection("things");
        collection
            .insert_many(vec![doc! { "name": "a" }])
            .await
            .unwrap();

        let stored = collection.find().collect().await.unwrap();
        assert!(matches!(stored[0].get("_id"), Some(Bson::ObjectId(_))));
    }

    #[tokio::test]
    async fn insert_preserves_supplied_identifier() {
        let collection = driver().collection("things");
        let id = ObjectId::new();
        collection
            .insert_many(vec![doc! { "_id": id, "name": "a" }])
            .await
            .unwrap();

        let stored = collection.find().collect().await.unwrap();
        assert_eq!(stored[0].get("_id"), Some(&Bson::ObjectId(id)));
    }

    #[tokio::test]
    async fn duplicate_identifier_is_rejected() {
        let collection = driver().collection("things");
        let id = ObjectId::new();
        collection
            .insert_many(vec![doc! { "_id": id }])
            .await
            .unwrap();

        let err = collection
            .insert_many(vec![doc! { "_id": id }])
            .await
            .unwrap_err();
        assert!(matches!(err, DocbindError::DocumentAlreadyExists(..)));
    }

    #[tokio::test]
    async fn find_applies_filter_sort_skip_and_limit() {
        let collection = driver().collection("numbers");
        collection
            .insert_many(
                (0..10)
                    .map(|n| doc! { "n": n })
                    .collect(),
            )
            .await
            .unwrap();

        let picked = collection
            .find()
            .filter(doc! { "n": { "$gte": 3 } })
            .sort(doc! { "n": -1 })
            .skip(1)
            .limit(2)
            .collect()
            .await
            .unwrap();

        let values: Vec<i32> = picked
            .iter()
            .map(|d| d.get_i32("n").unwrap())
            .collect();
        assert_eq!(values, vec![8, 7]);
    }

    #[tokio::test]
    async fn projection_limits_returned_fields() {
        let collection = driver().collection("people");
        collection
            .insert_many(vec![doc! { "name": "ada", "age": 36 }])
            .await
            .unwrap();

        let stored = collection
            .find()
            .projection(doc! { "name": 1 })
            .collect()
            .await
            .unwrap();

        assert!(stored[0].get("age").is_none());
        assert!(stored[0].get("name").is_some());
        assert!(stored[0].get("_id").is_some());
    }

    #[tokio::test]
    async fn replace_one_preserves_the_stored_identifier() {
        let collection = driver().collection("people");
        collection
            .insert_many(vec![doc! { "name": "ada" }])
            .await
            .unwrap();
        let original = collection.find().collect().await.unwrap();
        let id = original[0].get("_id").cloned().unwrap();

        let modified = collection
            .replace_one(doc! { "name": "ada" }, doc! { "name": "grace" })
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let replaced = collection.find().collect().await.unwrap();
        assert_eq!(replaced[0].get("_id"), Some(&id));
        assert_eq!(replaced[0].get_str("name").unwrap(), "grace");
    }

    #[tokio::test]
    async fn delete_many_returns_the_deleted_count() {
        let collection = driver().collection("numbers");
        collection
            .insert_many(
                (0..4)
                    .map(|n| doc! { "n": n })
                    .collect(),
            )
            .await
            .unwrap();

        let deleted = collection
            .delete_many(doc! { "n": { "$lt": 2 } })
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(collection.count(doc! {}).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn aggregation_subset_runs_in_order() {
        let collection = driver().collection("numbers");
        collection
            .insert_many(
                (0..6)
                    .map(|n| doc! { "n": n })
                    .collect(),
            )
            .await
            .unwrap();

        let results = collection
            .aggregate(vec![
                doc! { "$match": { "n": { "$gte": 2 } } },
                doc! { "$sort": { "n": -1 } },
                doc! { "$skip": 1 },
                doc! { "$limit": 2 },
            ])
            .collect()
            .await
            .unwrap();

        let values: Vec<i32> = results
            .iter()
            .map(|d| d.get_i32("n").unwrap())
            .collect();
        assert_eq!(values, vec![4, 3]);
    }

    #[tokio::test]
    async fn unsupported_aggregation_stage_fails() {
        let collection = driver().collection("numbers");
        let err = collection
            .aggregate(vec![doc! { "$group": { "_id": "$n" } }])
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, DocbindError::Driver(_)));
    }

    #[tokio::test]
    async fn map_reduce_is_unsupported() {
        let collection = driver().collection("numbers");
        let err = collection
            .map_reduce("function() {}", "function() {}")
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, DocbindError::Driver(_)));
    }

    #[tokio::test]
    async fn collection_admin_round_trip() {
        let driver = driver();
        driver.create_collection("a").await.unwrap();
        driver.create_collection("b").await.unwrap();

        let mut names = driver.list_collections().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        driver.drop_collection("a").await.unwrap();
        assert!(matches!(
            driver.drop_collection("a").await.unwrap_err(),
            DocbindError::CollectionNotFound(_)
        ));
    }
}
