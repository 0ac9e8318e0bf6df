//! Decorators over the driver's fluent query builders.
//!
//! Each decorator implements the same surface as the builder it wraps and
//! forwards every call to the inner delegate. Exactly one category of call is
//! intercepted: those whose argument is a filter, sort key, projection, or
//! scope expression, which are re-serialized through the collection's codec
//! before reaching the driver. Scalar configuration (limits, batch sizes,
//! time limits, flags, collations) forwards verbatim.
//!
//! Fluent methods return the decorator itself so interception survives
//! chaining. A conversion failure inside a chain is held and surfaced at the
//! terminal call, and nothing reaches the driver after a failure. Terminal
//! methods decode result documents through the codec for the declared result
//! type and abort on the first undecodable record.

use std::time::Duration;

use bson::{Document, doc};
use serde::Serialize;

use crate::{
    codec::Codec,
    document::Mapped,
    driver::{AggregateDriver, FindDriver, MapReduceDriver},
    error::{DocbindError, DocbindResult},
    query::{FilterSpec, SortDirection},
};

/// A decorated find builder bound to the declared document type `D`.
#[derive(Debug)]
pub struct DecoratedFind<B, D> {
    inner: B,
    codec: Codec<D>,
    error: Option<DocbindError>,
}

impl<B: FindDriver, D: Mapped> DecoratedFind<B, D> {
    pub(crate) fn new(inner: B, codec: Codec<D>) -> Self {
        Self { inner, codec, error: None }
    }

    /// The single interception rule: convert the supplied value through the
    /// codec, then forward the result to the delegate. On failure the chain
    /// is poisoned and the error surfaces at the terminal call.
    fn intercept(
        self,
        convert: impl FnOnce(&Codec<D>) -> DocbindResult<Document>,
        forward: impl FnOnce(B, Document) -> B,
    ) -> Self {
        let Self { inner, codec, error } = self;
        if error.is_some() {
            return Self { inner, codec, error };
        }
        match convert(&codec) {
            Ok(converted) => Self { inner: forward(inner, converted), codec, error: None },
            Err(err) => Self { inner, codec, error: Some(err) },
        }
    }

    fn forward(self, call: impl FnOnce(B) -> B) -> Self {
        let Self { inner, codec, error } = self;
        if error.is_some() {
            return Self { inner, codec, error };
        }
        Self { inner: call(inner), codec, error }
    }

    /// Sets the query filter, a typed expression or a raw document; either
    /// way serialized through the codec.
    pub fn filter(self, filter: impl Into<FilterSpec>) -> Self {
        let spec = filter.into();
        self.intercept(move |codec| codec.filter_document(spec), B::filter)
    }

    /// Sets the sort specification; declared identifier field names map to
    /// their stored form.
    pub fn sort(self, sort: Document) -> Self {
        self.intercept(move |codec| codec.keyed_document(&sort), B::sort)
    }

    /// Convenience for a single-key sort by a declared field name.
    pub fn sort_by(self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field: String = field.into();
        self.sort(doc! {
            field: match direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            }
        })
    }

    /// Sets the projection; declared identifier field names map to their
    /// stored form.
    pub fn projection(self, projection: Document) -> Self {
        self.intercept(move |codec| codec.keyed_document(&projection), B::projection)
    }

    /// Limits the number of returned documents. Forwarded verbatim.
    pub fn limit(self, limit: i64) -> Self {
        self.forward(|inner| inner.limit(limit))
    }

    /// Skips the first `skip` matching documents. Forwarded verbatim.
    pub fn skip(self, skip: u64) -> Self {
        self.forward(|inner| inner.skip(skip))
    }

    /// Sets the cursor batch size. Forwarded verbatim.
    pub fn batch_size(self, batch_size: u32) -> Self {
        self.forward(|inner| inner.batch_size(batch_size))
    }

    /// Sets the server-side time limit. Forwarded verbatim.
    pub fn max_time(self, max_time: Duration) -> Self {
        self.forward(|inner| inner.max_time(max_time))
    }

    /// Sets the collation. Forwarded verbatim.
    pub fn collation(self, collation: Document) -> Self {
        self.forward(|inner| inner.collation(collation))
    }

    /// Runs the query and decodes the first matching document.
    pub async fn first(self) -> DocbindResult<Option<D>> {
        let Self { inner, codec, error } = self;
        if let Some(err) = error {
            return Err(err);
        }
        match inner.first().await? {
            Some(doc) => Ok(Some(codec.decode(doc)?)),
            None => Ok(None),
        }
    }

    /// Runs the query and decodes all matching documents. A record that
    /// fails to decode aborts materialization with its error.
    pub async fn collect(self) -> DocbindResult<Vec<D>> {
        let Self { inner, codec, error } = self;
        if let Some(err) = error {
            return Err(err);
        }
        inner
            .collect()
            .await?
            .into_iter()
            .map(|doc| codec.decode(doc))
            .collect()
    }
}

/// A decorated aggregation builder. The pipeline is rewritten when the
/// builder is created; every remaining method is verbatim configuration.
#[derive(Debug)]
pub struct DecoratedAggregate<B, R> {
    inner: B,
    codec: Codec<R>,
}

impl<B: AggregateDriver, R: Mapped> DecoratedAggregate<B, R> {
    pub(crate) fn new(inner: B, codec: Codec<R>) -> Self {
        Self { inner, codec }
    }

    fn forward(self, call: impl FnOnce(B) -> B) -> Self {
        let Self { inner, codec } = self;
        Self { inner: call(inner), codec }
    }

    /// Sets the cursor batch size. Forwarded verbatim.
    pub fn batch_size(self, batch_size: u32) -> Self {
        self.forward(|inner| inner.batch_size(batch_size))
    }

    /// Enables writing temporary data to disk. Forwarded verbatim.
    pub fn allow_disk_use(self, allow_disk_use: bool) -> Self {
        self.forward(|inner| inner.allow_disk_use(allow_disk_use))
    }

    /// Bypasses document validation for writing stages. Forwarded verbatim.
    pub fn bypass_document_validation(self, bypass: bool) -> Self {
        self.forward(|inner| inner.bypass_document_validation(bypass))
    }

    /// Sets the server-side time limit. Forwarded verbatim.
    pub fn max_time(self, max_time: Duration) -> Self {
        self.forward(|inner| inner.max_time(max_time))
    }

    /// Sets the collation. Forwarded verbatim.
    pub fn collation(self, collation: Document) -> Self {
        self.forward(|inner| inner.collation(collation))
    }

    /// Runs the aggregation and decodes the result documents as `R`.
    pub async fn collect(self) -> DocbindResult<Vec<R>> {
        let Self { inner, codec } = self;
        inner
            .collect()
            .await?
            .into_iter()
            .map(|doc| codec.decode(doc))
            .collect()
    }
}

/// A decorated map-reduce builder with result type `R`.
#[derive(Debug)]
pub struct DecoratedMapReduce<B, D, R> {
    inner: B,
    codec: Codec<D>,
    result_codec: Codec<R>,
    error: Option<DocbindError>,
}

impl<B: MapReduceDriver, D: Mapped, R: Mapped> DecoratedMapReduce<B, D, R> {
    pub(crate) fn new(inner: B, codec: Codec<D>, result_codec: Codec<R>) -> Self {
        Self { inner, codec, result_codec, error: None }
    }

    fn intercept(
        self,
        convert: impl FnOnce(&Codec<D>) -> DocbindResult<Document>,
        forward: impl FnOnce(B, Document) -> B,
    ) -> Self {
        let Self { inner, codec, result_codec, error } = self;
        if error.is_some() {
            return Self { inner, codec, result_codec, error };
        }
        match convert(&codec) {
            Ok(converted) => Self {
                inner: forward(inner, converted),
                codec,
                result_codec,
                error: None,
            },
            Err(err) => Self { inner, codec, result_codec, error: Some(err) },
        }
    }

    fn forward(self, call: impl FnOnce(B) -> B) -> Self {
        let Self { inner, codec, result_codec, error } = self;
        if error.is_some() {
            return Self { inner, codec, result_codec, error };
        }
        Self { inner: call(inner), codec, result_codec, error }
    }

    /// Sets the filter applied before the map phase, serialized through the
    /// collection's codec.
    pub fn filter(self, filter: impl Into<FilterSpec>) -> Self {
        let spec = filter.into();
        self.intercept(move |codec| codec.filter_document(spec), B::filter)
    }

    /// Sets the input sort; declared identifier field names map to their
    /// stored form.
    pub fn sort(self, sort: Document) -> Self {
        self.intercept(move |codec| codec.keyed_document(&sort), B::sort)
    }

    /// Sets the global scope from a typed value, structurally serialized
    /// through the serialization engine.
    pub fn scope<S: Serialize>(self, scope: &S) -> Self {
        match self.codec.value_document(scope) {
            Ok(doc) => self.forward(|inner| inner.scope(doc)),
            Err(err) => {
                let Self { inner, codec, result_codec, error } = self;
                Self { inner, codec, result_codec, error: error.or(Some(err)) }
            }
        }
    }

    /// Limits the number of documents fed to the map phase. Forwarded
    /// verbatim.
    pub fn limit(self, limit: i64) -> Self {
        self.forward(|inner| inner.limit(limit))
    }

    /// Keeps intermediate values as JavaScript objects. Forwarded verbatim.
    pub fn js_mode(self, js_mode: bool) -> Self {
        self.forward(|inner| inner.js_mode(js_mode))
    }

    /// Includes timing information in the result. Forwarded verbatim.
    pub fn verbose(self, verbose: bool) -> Self {
        self.forward(|inner| inner.verbose(verbose))
    }

    /// Sets the server-side time limit. Forwarded verbatim.
    pub fn max_time(self, max_time: Duration) -> Self {
        self.forward(|inner| inner.max_time(max_time))
    }

    /// Sets the collation. Forwarded verbatim.
    pub fn collation(self, collation: Document) -> Self {
        self.forward(|inner| inner.collation(collation))
    }

    /// Runs the operation and decodes the inline results as `R`.
    pub async fn collect(self) -> DocbindResult<Vec<R>> {
        let Self { inner, result_codec, error, .. } = self;
        if let Some(err) = error {
            return Err(err);
        }
        inner
            .collect()
            .await?
            .into_iter()
            .map(|doc| result_codec.decode(doc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::CodecRegistry, query::Filter};
    use async_trait::async_trait;
    use bson::{Bson, doc, oid::ObjectId};
    use docbind_macros::Document;
    use serde::{Deserialize, Serialize};
    use std::sync::{Arc, Mutex};

    const HEX: &str = "507f1f77bcf86cd799439011";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
    #[document(collection = "tickets", crate = docbind_core)]
    struct Ticket {
        #[document(id, object_id)]
        id: Option<String>,
        score: Option<i32>,
    }

    /// Captures every call forwarded to the "driver" so tests can assert on
    /// exactly what crossed the boundary.
    #[derive(Clone, Default, Debug)]
    struct Recorder(Arc<Mutex<Vec<(String, Bson)>>>);

    impl Recorder {
        fn record(&self, call: &str, value: impl Into<Bson>) {
            self.0
                .lock()
                .unwrap()
                .push((call.to_string(), value.into()));
        }

        fn calls(&self) -> Vec<(String, Bson)> {
            self.0.lock().unwrap().clone()
        }
    }

    #[derive(Debug)]
    struct RecordingFind {
        recorder: Recorder,
        results: Vec<Document>,
    }

    #[async_trait]
    impl FindDriver for RecordingFind {
        fn filter(self, filter: Document) -> Self {
            self.recorder.record("filter", filter);
            self
        }
        fn sort(self, sort: Document) -> Self {
            self.recorder.record("sort", sort);
            self
        }
        fn projection(self, projection: Document) -> Self {
            self.recorder.record("projection", projection);
            self
        }
        fn limit(self, limit: i64) -> Self {
            self.recorder.record("limit", limit);
            self
        }
        fn skip(self, skip: u64) -> Self {
            self.recorder.record("skip", skip as i64);
            self
        }
        fn batch_size(self, batch_size: u32) -> Self {
            self.recorder.record("batch_size", batch_size as i32);
            self
        }
        fn max_time(self, max_time: Duration) -> Self {
            self.recorder.record("max_time", max_time.as_millis() as i64);
            self
        }
        fn collation(self, collation: Document) -> Self {
            self.recorder.record("collation", collation);
            self
        }
        async fn first(self) -> DocbindResult<Option<Document>> {
            Ok(self.results.into_iter().next())
        }
        async fn collect(self) -> DocbindResult<Vec<Document>> {
            Ok(self.results)
        }
    }

    fn decorated(results: Vec<Document>) -> (DecoratedFind<RecordingFind, Ticket>, Recorder) {
        let recorder = Recorder::default();
        let codec = CodecRegistry::new().codec_for::<Ticket>().unwrap();
        let find = RecordingFind { recorder: recorder.clone(), results };
        (DecoratedFind::new(find, codec), recorder)
    }

    #[tokio::test]
    async fn typed_filter_is_initialized_with_type_context() {
        let (find, recorder) = decorated(vec![]);
        find.filter(Filter::eq("id", HEX)).collect().await.unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        let filter = calls[0].1.as_document().unwrap();
        assert!(matches!(
            filter.get_document("_id").unwrap().get("$eq"),
            Some(Bson::ObjectId(_))
        ));
    }

    #[tokio::test]
    async fn raw_filter_is_reserialized_with_operators_untouched() {
        let (find, recorder) = decorated(vec![]);
        find.filter(doc! { "id": { "$in": [HEX] }, "score": { "$gt": 1 } })
            .collect()
            .await
            .unwrap();

        let calls = recorder.calls();
        let filter = calls[0].1.as_document().unwrap();
        let ids = filter.get_document("_id").unwrap().get_array("$in").unwrap();
        assert!(matches!(ids[0], Bson::ObjectId(_)));
        assert_eq!(
            filter.get_document("score").unwrap(),
            &doc! { "$gt": 1 }
        );
    }

    #[tokio::test]
    async fn configuration_calls_forward_verbatim() {
        let (find, recorder) = decorated(vec![]);
        find.limit(10)
            .skip(5)
            .batch_size(100)
            .filter(doc! { "score": 1 })
            .collect()
            .await
            .unwrap();

        let calls = recorder.calls();
        assert_eq!(
            calls
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>(),
            vec!["limit", "skip", "batch_size", "filter"],
        );
        assert_eq!(calls[0].1, Bson::Int64(10));
        assert_eq!(calls[1].1, Bson::Int64(5));
        assert_eq!(calls[2].1, Bson::Int32(100));
    }

    #[tokio::test]
    async fn chained_calls_match_a_pre_serialized_query() {
        let (decorated_find, decorated_recorder) = decorated(vec![]);
        decorated_find
            .batch_size(50)
            .limit(3)
            .filter(doc! { "id": HEX })
            .collect()
            .await
            .unwrap();

        let direct_recorder = Recorder::default();
        let direct = RecordingFind { recorder: direct_recorder.clone(), results: vec![] };
        direct
            .batch_size(50)
            .limit(3)
            .filter(doc! { "_id": ObjectId::parse_str(HEX).unwrap() })
            .collect()
            .await
            .unwrap();

        assert_eq!(decorated_recorder.calls(), direct_recorder.calls());
    }

    #[tokio::test]
    async fn conversion_failure_surfaces_at_the_terminal_and_skips_the_driver() {
        let (find, recorder) = decorated(vec![]);
        let err = find
            .filter(doc! { "id": "not a valid identifier" })
            .limit(1)
            .collect()
            .await
            .unwrap_err();

        assert!(matches!(err, DocbindError::Format(_)));
        // Nothing after the failed conversion crossed the boundary.
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn undecodable_record_aborts_materialization() {
        let good = doc! { "_id": ObjectId::parse_str(HEX).unwrap(), "score": 1 };
        let bad = doc! { "_id": ObjectId::parse_str(HEX).unwrap(), "score": "seven" };
        let (find, _) = decorated(vec![good, bad]);

        let err = find.collect().await.unwrap_err();
        assert!(matches!(err, DocbindError::Format(_)));
    }

    #[tokio::test]
    async fn first_decodes_through_the_codec() {
        let stored = doc! { "_id": ObjectId::parse_str(HEX).unwrap(), "score": 9 };
        let (find, _) = decorated(vec![stored]);

        let ticket = find.first().await.unwrap().unwrap();
        assert_eq!(ticket.id.as_deref(), Some(HEX));
        assert_eq!(ticket.score, Some(9));
    }

    #[derive(Debug)]
    struct RecordingMapReduce {
        recorder: Recorder,
        results: Vec<Document>,
    }

    #[async_trait]
    impl MapReduceDriver for RecordingMapReduce {
        fn filter(self, filter: Document) -> Self {
            self.recorder.record("filter", filter);
            self
        }
        fn sort(self, sort: Document) -> Self {
            self.recorder.record("sort", sort);
            self
        }
        fn scope(self, scope: Document) -> Self {
            self.recorder.record("scope", scope);
            self
        }
        fn limit(self, limit: i64) -> Self {
            self.recorder.record("limit", limit);
            self
        }
        fn js_mode(self, js_mode: bool) -> Self {
            self.recorder.record("js_mode", js_mode);
            self
        }
        fn verbose(self, verbose: bool) -> Self {
            self.recorder.record("verbose", verbose);
            self
        }
        fn max_time(self, max_time: Duration) -> Self {
            self.recorder.record("max_time", max_time.as_millis() as i64);
            self
        }
        fn collation(self, collation: Document) -> Self {
            self.recorder.record("collation", collation);
            self
        }
        async fn collect(self) -> DocbindResult<Vec<Document>> {
            Ok(self.results)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, docbind_macros::Mapped)]
    #[document(crate = docbind_core)]
    struct ScoreTotal {
        #[document(id, object_id)]
        id: Option<String>,
        value: f64,
    }

    #[tokio::test]
    async fn map_reduce_intercepts_filter_sort_and_scope_only() {
        let recorder = Recorder::default();
        let registry = CodecRegistry::new();
        let decorated = DecoratedMapReduce::new(
            RecordingMapReduce { recorder: recorder.clone(), results: vec![] },
            registry.codec_for::<Ticket>().unwrap(),
            registry.codec_for::<ScoreTotal>().unwrap(),
        );

        #[derive(Serialize)]
        struct Scope {
            threshold: i32,
        }

        let totals: Vec<ScoreTotal> = decorated
            .filter(Filter::eq("id", HEX))
            .sort(doc! { "id": 1 })
            .scope(&Scope { threshold: 10 })
            .js_mode(true)
            .limit(25)
            .collect()
            .await
            .unwrap();
        assert!(totals.is_empty());

        let calls = recorder.calls();
        assert_eq!(
            calls
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>(),
            vec!["filter", "sort", "scope", "js_mode", "limit"],
        );

        let filter = calls[0].1.as_document().unwrap();
        assert!(matches!(
            filter.get_document("_id").unwrap().get("$eq"),
            Some(Bson::ObjectId(_))
        ));
        assert_eq!(calls[1].1.as_document().unwrap(), &doc! { "_id": 1 });
        assert_eq!(calls[2].1.as_document().unwrap(), &doc! { "threshold": 10 });
    }
}
