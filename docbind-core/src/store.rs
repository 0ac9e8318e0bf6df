//! Main store handle binding a driver to the codec registry.
//!
//! A [`Store`] owns a driver and the process-wide [`CodecRegistry`]. Typed
//! collection handles are obtained through [`Store::collection`], which is
//! the fail-fast codec lookup point: an unusable type declaration errors
//! here, before any document is sent to the store.
//!
//! # Example
//!
//! ```ignore
//! use docbind::{prelude::*, memory::MemoryDriver};
//!
//! let store = Store::new(MemoryDriver::new());
//! let users = store.collection::<User>()?;
//! ```

use crate::{
    codec::CodecRegistry,
    collection::TypedCollection,
    document::Document,
    driver::Driver,
    error::DocbindResult,
};

/// A document store bound to a specific driver implementation.
#[derive(Debug)]
pub struct Store<Dr: Driver> {
    driver: Dr,
    registry: CodecRegistry,
}

impl<Dr: Driver> Store<Dr> {
    /// Creates a new store over the given driver with a fresh codec
    /// registry.
    pub fn new(driver: Dr) -> Self {
        Self { driver, registry: CodecRegistry::new() }
    }

    /// The store's codec registry.
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Gets a typed collection for the declared document type.
    ///
    /// The collection name is taken from the type's `collection_name()`.
    ///
    /// # Errors
    ///
    /// Returns [`DocbindError::Configuration`](crate::error::DocbindError)
    /// if the type's mapping metadata is unusable.
    pub fn collection<D: Document>(&self) -> DocbindResult<TypedCollection<Dr::Collection, D>> {
        let codec = self.registry.codec_for::<D>()?;
        Ok(TypedCollection::new(
            self.driver.collection(D::collection_name()),
            codec,
        ))
    }

    /// Creates a new collection with the given name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection already exists or creation fails.
    pub async fn create_collection(&self, name: &str) -> DocbindResult<()> {
        self.driver.create_collection(name).await
    }

    /// Drops (deletes) a collection with the given name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or deletion fails.
    pub async fn drop_collection(&self, name: &str) -> DocbindResult<()> {
        self.driver.drop_collection(name).await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocbindResult<Vec<String>> {
        self.driver.list_collections().await
    }

    /// Shuts down the store and releases driver resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    pub async fn shutdown(self) -> DocbindResult<()> {
        self.driver.shutdown().await
    }
}
