use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, de::deserialize_from_bson, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database,
    options::{AggregateOptions, ClientOptions, Collation, FindOptions},
};
use tracing::debug;

use docbind_core::{
    driver::{AggregateDriver, Driver, DriverCollection, FindDriver, MapReduceDriver},
    error::{DocbindError, DocbindResult},
};

/// Driver adapter over a MongoDB client and database.
#[derive(Debug)]
pub struct MongoDriver {
    client: Client,
    database: String,
}

impl MongoDriver {
    /// Creates a driver from an already-connected client.
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    /// Creates a builder that connects from a connection string.
    pub fn builder(dsn: &str, database: &str) -> MongoDriverBuilder {
        MongoDriverBuilder::new(dsn, database)
    }

    fn database(&self) -> Database {
        self.client.database(&self.database)
    }
}

#[async_trait]
impl Driver for MongoDriver {
    type Collection = MongoDriverCollection;

    fn collection(&self, name: &str) -> MongoDriverCollection {
        MongoDriverCollection {
            name: name.to_string(),
            collection: self.database().collection(name),
            database: self.database(),
        }
    }

    async fn create_collection(&self, name: &str) -> DocbindResult<()> {
        self.database()
            .create_collection(name)
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocbindResult<()> {
        self.database()
            .collection::<Document>(name)
            .drop()
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))?;

        Ok(())
    }

    async fn list_collections(&self) -> DocbindResult<Vec<String>> {
        self.database()
            .list_collection_names()
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))
    }

    async fn shutdown(self) -> DocbindResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// A handle to one MongoDB collection.
pub struct MongoDriverCollection {
    name: String,
    collection: MongoCollection<Document>,
    database: Database,
}

#[async_trait]
impl DriverCollection for MongoDriverCollection {
    type Find = MongoFind;
    type Aggregate = MongoAggregate;
    type MapReduce = MongoMapReduce;

    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self) -> MongoFind {
        MongoFind {
            collection: self.collection.clone(),
            filter: Document::new(),
            options: FindOptions::default(),
            error: None,
        }
    }

    fn aggregate(&self, pipeline: Vec<Document>) -> MongoAggregate {
        MongoAggregate {
            collection: self.collection.clone(),
            pipeline,
            options: AggregateOptions::default(),
            error: None,
        }
    }

    fn map_reduce(&self, map: &str, reduce: &str) -> MongoMapReduce {
        MongoMapReduce {
            database: self.database.clone(),
            collection: self.name.clone(),
            map: map.to_string(),
            reduce: reduce.to_string(),
            command: Document::new(),
        }
    }

    async fn insert_many(&self, documents: Vec<Document>) -> DocbindResult<()> {
        debug!(collection = %self.name, count = documents.len(), "inserting documents");
        self.collection
            .insert_many(documents)
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))?;

        Ok(())
    }

    async fn replace_one(&self, filter: Document, replacement: Document) -> DocbindResult<u64> {
        Ok(self
            .collection
            .replace_one(filter, replacement)
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))?
            .modified_count)
    }

    async fn delete_many(&self, filter: Document) -> DocbindResult<u64> {
        Ok(self
            .collection
            .delete_many(filter)
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))?
            .deleted_count)
    }

    async fn count(&self, filter: Document) -> DocbindResult<u64> {
        self.collection
            .count_documents(filter)
            .await
            .map_err(|e| DocbindError::Query(e.to_string()))
    }

    async fn drop(&self) -> DocbindResult<()> {
        self.collection
            .drop()
            .await
            .map_err(|e| DocbindError::Driver(e.to_string()))?;

        Ok(())
    }
}

fn parse_collation(document: Document) -> DocbindResult<Collation> {
    deserialize_from_bson(Bson::Document(document))
        .map_err(|e| DocbindError::Format(format!("invalid collation: {e}")))
}

/// MongoDB find builder, accumulating the filter and options until a
/// terminal call executes the query.
pub struct MongoFind {
    collection: MongoCollection<Document>,
    filter: Document,
    options: FindOptions,
    error: Option<DocbindError>,
}

#[async_trait]
impl FindDriver for MongoFind {
    fn filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    fn max_time(mut self, max_time: Duration) -> Self {
        self.options.max_time = Some(max_time);
        self
    }

    fn collation(mut self, collation: Document) -> Self {
        match parse_collation(collation) {
            Ok(collation) => self.options.collation = Some(collation),
            Err(err) => self.error = self.error.or(Some(err)),
        }
        self
    }

    async fn first(self) -> DocbindResult<Option<Document>> {
        Ok(self.limit(1).collect().await?.into_iter().next())
    }

    async fn collect(self) -> DocbindResult<Vec<Document>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        self.collection
            .find(self.filter)
            .with_options(self.options)
            .await
            .map_err(|e| DocbindError::Query(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocbindError::Query(e.to_string()))
    }
}

/// MongoDB aggregation builder.
pub struct MongoAggregate {
    collection: MongoCollection<Document>,
    pipeline: Vec<Document>,
    options: AggregateOptions,
    error: Option<DocbindError>,
}

#[async_trait]
impl AggregateDriver for MongoAggregate {
    fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    fn allow_disk_use(mut self, allow_disk_use: bool) -> Self {
        self.options.allow_disk_use = Some(allow_disk_use);
        self
    }

    fn bypass_document_validation(mut self, bypass: bool) -> Self {
        self.options.bypass_document_validation = Some(bypass);
        self
    }

    fn max_time(mut self, max_time: Duration) -> Self {
        self.options.max_time = Some(max_time);
        self
    }

    fn collation(mut self, collation: Document) -> Self {
        match parse_collation(collation) {
            Ok(collation) => self.options.collation = Some(collation),
            Err(err) => self.error = self.error.or(Some(err)),
        }
        self
    }

    async fn collect(self) -> DocbindResult<Vec<Document>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        self.collection
            .aggregate(self.pipeline)
            .with_options(self.options)
            .await
            .map_err(|e| DocbindError::Query(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocbindError::Query(e.to_string()))
    }
}

/// MongoDB map-reduce builder, executed as a database command with inline
/// output.
pub struct MongoMapReduce {
    database: Database,
    collection: String,
    map: String,
    reduce: String,
    command: Document,
}

#[async_trait]
impl MapReduceDriver for MongoMapReduce {
    fn filter(mut self, filter: Document) -> Self {
        self.command.insert("query", filter);
        self
    }

    fn sort(mut self, sort: Document) -> Self {
        self.command.insert("sort", sort);
        self
    }

    fn scope(mut self, scope: Document) -> Self {
        self.command.insert("scope", scope);
        self
    }

    fn limit(mut self, limit: i64) -> Self {
        self.command.insert("limit", limit);
        self
    }

    fn js_mode(mut self, js_mode: bool) -> Self {
        self.command.insert("jsMode", js_mode);
        self
    }

    fn verbose(mut self, verbose: bool) -> Self {
        self.command.insert("verbose", verbose);
        self
    }

    fn max_time(mut self, max_time: Duration) -> Self {
        self.command
            .insert("maxTimeMS", max_time.as_millis() as i64);
        self
    }

    fn collation(mut self, collation: Document) -> Self {
        self.command.insert("collation", collation);
        self
    }

    async fn collect(self) -> DocbindResult<Vec<Document>> {
        let mut command = doc! {
            "mapReduce": &self.collection,
            "map": &self.map,
            "reduce": &self.reduce,
            "out": { "inline": 1 },
        };
        for (key, value) in self.command {
            command.insert(key, value);
        }

        let response = self
            .database
            .run_command(command)
            .await
            .map_err(|e| DocbindError::Query(e.to_string()))?;

        response
            .get_array("results")
            .map_err(|e| DocbindError::Driver(format!("map-reduce returned no inline results: {e}")))?
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc.clone()),
                other => Err(DocbindError::Driver(format!(
                    "map-reduce result item is not a document: {other}",
                ))),
            })
            .collect()
    }
}

/// Builder for [`MongoDriver`], connecting from a connection string.
pub struct MongoDriverBuilder {
    dsn: String,
    database: String,
}

impl MongoDriverBuilder {
    /// Creates a builder for the given connection string and database name.
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    /// Connects and returns the driver.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Initialization`] if the connection string is
    /// invalid or the client cannot be constructed.
    pub async fn build(self) -> DocbindResult<MongoDriver> {
        Ok(MongoDriver::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocbindError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocbindError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
