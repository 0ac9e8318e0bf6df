//! Typed collection handles.
//!
//! A [`TypedCollection`] binds a declared document type to one of the
//! driver's collections. Every value crossing it (inserted documents,
//! filters, identifiers) runs through the type's codec, and every fluent
//! builder it hands out is a decorator from [`crate::decorate`].
//!
//! # Example
//!
//! ```ignore
//! use docbind::prelude::*;
//!
//! # async fn example<Dr: docbind::driver::Driver>(store: &Store<Dr>) -> DocbindResult<()> {
//! let tickets = store.collection::<Ticket>()?;
//! tickets.insert_one(Ticket { id: None, score: Some(3) }).await?;
//!
//! let open = tickets
//!     .find()
//!     .filter(Filter::gt("score", 0))
//!     .limit(10)
//!     .collect()
//!     .await?;
//! # Ok(()) }
//! ```

use bson::{Bson, Document, doc};

use crate::{
    codec::Codec,
    decorate::{DecoratedAggregate, DecoratedFind, DecoratedMapReduce},
    document::{Document as DocumentType, Mapped},
    driver::DriverCollection,
    error::DocbindResult,
    query::FilterSpec,
};

/// A type-safe collection handle for the declared document type `D`.
#[derive(Debug)]
pub struct TypedCollection<C: DriverCollection, D: DocumentType> {
    driver: C,
    codec: Codec<D>,
}

impl<C: DriverCollection, D: DocumentType> TypedCollection<C, D> {
    pub(crate) fn new(driver: C, codec: Codec<D>) -> Self {
        Self { driver, codec }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// The codec bound to this collection's declared type.
    pub fn codec(&self) -> &Codec<D> {
        &self.codec
    }

    /// Inserts documents into the collection.
    ///
    /// A document whose identifier field is absent is stored without one and
    /// the driver assigns a canonical object identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the driver rejects the insert
    /// (for example on a duplicate identifier).
    pub async fn insert(&self, documents: Vec<D>) -> DocbindResult<()> {
        self.driver
            .insert_many(
                documents
                    .iter()
                    .map(|document| self.codec.encode(document))
                    .collect::<DocbindResult<Vec<Document>>>()?,
            )
            .await
    }

    /// Inserts a single document.
    pub async fn insert_one(&self, document: D) -> DocbindResult<()> {
        self.insert(vec![document]).await
    }

    /// Starts a decorated find over the collection.
    pub fn find(&self) -> DecoratedFind<C::Find, D> {
        DecoratedFind::new(self.driver.find(), self.codec.clone())
    }

    /// Finds the first document matching the filter.
    pub async fn find_one(&self, filter: impl Into<FilterSpec>) -> DocbindResult<Option<D>> {
        self.find().filter(filter).first().await
    }

    /// Finds a document by its identifier, given in the declared
    /// application representation.
    pub async fn find_by_id(&self, id: impl Into<Bson>) -> DocbindResult<Option<D>> {
        let stored = self.codec.store_id(id)?;
        self.find()
            .filter(doc! { "_id": stored })
            .first()
            .await
    }

    /// Replaces the first document matching the filter, returning the
    /// number of documents modified (0 or 1).
    pub async fn replace_one(
        &self,
        filter: impl Into<FilterSpec>,
        replacement: D,
    ) -> DocbindResult<u64> {
        let filter = self.codec.filter_document(filter)?;
        let replacement = self.codec.encode(&replacement)?;
        self.driver.replace_one(filter, replacement).await
    }

    /// Deletes every document matching the filter, returning the number
    /// deleted.
    pub async fn delete(&self, filter: impl Into<FilterSpec>) -> DocbindResult<u64> {
        let filter = self.codec.filter_document(filter)?;
        self.driver.delete_many(filter).await
    }

    /// Deletes a document by its identifier, given in the declared
    /// application representation.
    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> DocbindResult<u64> {
        let stored = self.codec.store_id(id)?;
        self.driver
            .delete_many(doc! { "_id": stored })
            .await
    }

    /// Counts documents matching the filter; `None` counts the whole
    /// collection.
    pub async fn count(&self, filter: Option<FilterSpec>) -> DocbindResult<u64> {
        let filter = match filter {
            Some(spec) => self.codec.filter_document(spec)?,
            None => Document::new(),
        };
        self.driver.count(filter).await
    }

    /// Starts a decorated aggregation over the collection.
    ///
    /// `$match` stages are rewritten through the collection's codec and
    /// `$sort` stages through the key-mapping rule before the pipeline
    /// reaches the driver. Results decode as `R`.
    ///
    /// # Errors
    ///
    /// Fails fast if the pipeline cannot be rewritten or `R` has unusable
    /// mapping metadata.
    pub fn aggregate<R: Mapped>(
        &self,
        pipeline: Vec<Document>,
    ) -> DocbindResult<DecoratedAggregate<C::Aggregate, R>> {
        let result_codec = self.codec.registry().codec_for::<R>()?;
        let stages = self.codec.pipeline_documents(pipeline)?;
        Ok(DecoratedAggregate::new(
            self.driver.aggregate(stages),
            result_codec,
        ))
    }

    /// Starts a decorated map-reduce over the collection with the given
    /// map and reduce functions (store-side JavaScript source). Results
    /// decode as `R`.
    ///
    /// # Errors
    ///
    /// Fails fast if `R` has unusable mapping metadata.
    pub fn map_reduce<R: Mapped>(
        &self,
        map: &str,
        reduce: &str,
    ) -> DocbindResult<DecoratedMapReduce<C::MapReduce, D, R>> {
        let result_codec = self.codec.registry().codec_for::<R>()?;
        Ok(DecoratedMapReduce::new(
            self.driver.map_reduce(map, reduce),
            self.codec.clone(),
            result_codec,
        ))
    }

    /// Drops this collection and all its documents.
    pub async fn drop(&self) -> DocbindResult<()> {
        self.driver.drop().await
    }
}
