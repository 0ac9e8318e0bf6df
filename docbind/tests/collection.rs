//! End-to-end tests for typed collections over the in-memory driver.

use bson::{Bson, doc, oid::ObjectId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use docbind::{memory::MemoryDriver, prelude::*};

const HEX: &str = "507f1f77bcf86cd799439011";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Mapped)]
struct MockEmbedded {
    name: String,
    count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "mock_objects")]
struct MockObject {
    #[document(id, object_id)]
    id: Option<String>,
    string: Option<String>,
    integer: Option<i32>,
    long: Option<i64>,
    double: Option<f64>,
    boolean: Option<bool>,
    created: Option<bson::DateTime>,
    token: Option<bson::Uuid>,
    #[serde(default)]
    simple_list: Vec<String>,
    #[document(embed)]
    object: Option<MockEmbedded>,
    #[document(embed)]
    #[serde(default)]
    object_list: Vec<MockEmbedded>,
}

impl MockObject {
    fn empty() -> Self {
        MockObject {
            id: None,
            string: None,
            integer: None,
            long: None,
            double: None,
            boolean: None,
            created: None,
            token: None,
            simple_list: vec![],
            object: None,
            object_list: vec![],
        }
    }

    fn populated() -> Self {
        MockObject {
            id: Some(HEX.to_string()),
            string: Some("a string".to_string()),
            integer: Some(10),
            long: Some(10_000_000_000),
            double: Some(4.65),
            boolean: Some(true),
            created: Some(bson::DateTime::from_chrono(Utc::now())),
            token: Some(bson::Uuid::new()),
            simple_list: vec!["a".to_string(), "b".to_string()],
            object: Some(MockEmbedded { name: "nested".to_string(), count: 1 }),
            object_list: vec![
                MockEmbedded { name: "first".to_string(), count: 1 },
                MockEmbedded { name: "second".to_string(), count: 2 },
            ],
        }
    }
}

fn store() -> (Store<MemoryDriver>, MemoryDriver) {
    let driver = MemoryDriver::new();
    (Store::new(driver.clone()), driver)
}

#[tokio::test]
async fn insert_without_identifier_yields_a_driver_assigned_hex_id() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();

    objects.insert_one(MockObject::empty()).await.unwrap();

    let found = objects.find().first().await.unwrap().unwrap();
    let id = found.id.expect("driver assigns an identifier on insert");
    assert_eq!(id.len(), 24);
    assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
}

#[tokio::test]
async fn populated_object_round_trips_with_structural_equality() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();
    let original = MockObject::populated();

    objects.insert_one(original.clone()).await.unwrap();
    let found = objects.find_by_id(HEX).await.unwrap().unwrap();

    assert_eq!(found, original);
    // The embedded list survives with full structure, including order.
    assert_eq!(found.object_list.len(), 2);
    assert_eq!(found.object_list[1].name, "second");
}

#[tokio::test]
async fn identifier_is_stored_in_canonical_binary_form() {
    let (store, driver) = store();
    let objects = store.collection::<MockObject>().unwrap();

    objects.insert_one(MockObject::populated()).await.unwrap();

    // Look at the raw document through the driver, beneath the codec layer.
    let raw = driver
        .collection("mock_objects")
        .find()
        .collect()
        .await
        .unwrap();
    assert_eq!(
        raw[0].get("_id"),
        Some(&Bson::ObjectId(ObjectId::parse_str(HEX).unwrap()))
    );
    assert!(raw[0].get("id").is_none());
}

#[tokio::test]
async fn unset_fields_and_stored_nulls_both_read_back_as_none() {
    let (store, driver) = store();
    let objects = store.collection::<MockObject>().unwrap();

    // One document written through the codec with unset fields, one written
    // raw with explicit nulls.
    objects.insert_one(MockObject::empty()).await.unwrap();
    driver
        .collection("mock_objects")
        .insert_many(vec![doc! { "string": Bson::Null, "integer": Bson::Null }])
        .await
        .unwrap();

    let found = objects.find().collect().await.unwrap();
    assert_eq!(found.len(), 2);
    for object in found {
        assert_eq!(object.string, None);
        assert_eq!(object.integer, None);
    }
}

#[tokio::test]
async fn unknown_store_fields_are_ignored_on_decode() {
    let (store, driver) = store();
    driver
        .collection("mock_objects")
        .insert_many(vec![doc! { "string": "kept", "legacy": { "deep": true } }])
        .await
        .unwrap();

    let objects = store.collection::<MockObject>().unwrap();
    let found = objects.find().first().await.unwrap().unwrap();
    assert_eq!(found.string.as_deref(), Some("kept"));
}

#[tokio::test]
async fn typed_filters_convert_identifier_operands() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();
    objects.insert_one(MockObject::populated()).await.unwrap();

    let by_id = objects
        .find()
        .filter(Filter::eq("id", HEX))
        .collect()
        .await
        .unwrap();
    assert_eq!(by_id.len(), 1);

    let none = objects
        .find()
        .filter(Filter::eq("id", "ffffffffffffffffffffffff"))
        .collect()
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn typed_expressions_run_against_declared_fields() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();

    for (n, name) in [(1, "alpha"), (5, "beta"), (9, "gamma")] {
        let mut object = MockObject::empty();
        object.integer = Some(n);
        object.string = Some(name.to_string());
        objects.insert_one(object).await.unwrap();
    }

    let big = objects
        .find()
        .filter(Filter::gt("integer", 3))
        .collect()
        .await
        .unwrap();
    assert_eq!(big.len(), 2);

    let prefixed = objects
        .find()
        .filter(Filter::starts_with("string", "al"))
        .collect()
        .await
        .unwrap();
    assert_eq!(prefixed.len(), 1);
    assert_eq!(prefixed[0].string.as_deref(), Some("alpha"));

    let either = objects
        .find()
        .filter(Filter::eq("string", "alpha").or(Filter::gte("integer", 9)))
        .collect()
        .await
        .unwrap();
    assert_eq!(either.len(), 2);
}

#[tokio::test]
async fn chained_configuration_matches_a_pre_serialized_query() {
    let (store, driver) = store();
    let objects = store.collection::<MockObject>().unwrap();

    for n in 0..8 {
        let mut object = MockObject::empty();
        object.integer = Some(n);
        objects.insert_one(object).await.unwrap();
    }

    let decorated: Vec<MockObject> = objects
        .find()
        .batch_size(2)
        .limit(3)
        .filter(Filter::gte("integer", 2))
        .collect()
        .await
        .unwrap();

    // The same calls against the bare driver, with the filter already in
    // store-native form.
    let direct = driver
        .collection("mock_objects")
        .find()
        .batch_size(2)
        .limit(3)
        .filter(doc! { "integer": { "$gte": 2 } })
        .collect()
        .await
        .unwrap();

    assert_eq!(decorated.len(), direct.len());
    let decorated_values: Vec<i32> = decorated.iter().filter_map(|o| o.integer).collect();
    let direct_values: Vec<i32> = direct
        .iter()
        .map(|d| d.get_i32("integer").unwrap())
        .collect();
    assert_eq!(decorated_values, direct_values);
}

#[tokio::test]
async fn sort_maps_declared_identifier_names() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();

    for n in 0..3 {
        let mut object = MockObject::empty();
        object.integer = Some(n);
        objects.insert_one(object).await.unwrap();
    }

    let sorted = objects
        .find()
        .sort(doc! { "integer": -1 })
        .collect()
        .await
        .unwrap();
    let values: Vec<i32> = sorted.iter().filter_map(|o| o.integer).collect();
    assert_eq!(values, vec![2, 1, 0]);

    // Sorting on the declared identifier name reaches the stored _id.
    let by_id = objects
        .find()
        .sort_by("id", SortDirection::Asc)
        .collect()
        .await
        .unwrap();
    assert_eq!(by_id.len(), 3);
}

#[tokio::test]
async fn aggregation_pipeline_is_rewritten_and_decoded() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();

    objects.insert_one(MockObject::populated()).await.unwrap();
    let mut other = MockObject::empty();
    other.integer = Some(99);
    objects.insert_one(other).await.unwrap();

    let results: Vec<MockObject> = objects
        .aggregate(vec![
            doc! { "$match": { "id": HEX } },
            doc! { "$limit": 1 },
        ])
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id.as_deref(), Some(HEX));
}

#[tokio::test]
async fn replace_delete_and_count_by_identifier() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();

    objects.insert_one(MockObject::populated()).await.unwrap();
    assert_eq!(objects.count(None).await.unwrap(), 1);

    let mut replacement = MockObject::populated();
    replacement.string = Some("replaced".to_string());
    let modified = objects
        .replace_one(Filter::eq("id", HEX), replacement)
        .await
        .unwrap();
    assert_eq!(modified, 1);

    let found = objects.find_by_id(HEX).await.unwrap().unwrap();
    assert_eq!(found.string.as_deref(), Some("replaced"));

    assert_eq!(objects.delete_by_id(HEX).await.unwrap(), 1);
    assert_eq!(objects.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_identifier_fails_before_reaching_the_driver() {
    let (store, _) = store();
    let objects = store.collection::<MockObject>().unwrap();

    let err = objects.find_by_id("not-hex").await.unwrap_err();
    assert!(matches!(err, DocbindError::Format(_)));

    let err = objects
        .find()
        .filter(Filter::eq("id", "too-short"))
        .collect()
        .await
        .unwrap_err();
    assert!(matches!(err, DocbindError::Format(_)));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "blobs")]
struct Blob {
    #[document(id, object_id)]
    id: Option<Vec<u8>>,
    size: i32,
}

#[tokio::test]
async fn byte_sequence_identifiers_round_trip_as_twelve_bytes() {
    let (store, _) = store();
    let blobs = store.collection::<Blob>().unwrap();

    blobs
        .insert_one(Blob { id: None, size: 1 })
        .await
        .unwrap();
    let assigned = blobs.find().first().await.unwrap().unwrap();
    assert_eq!(assigned.id.as_ref().unwrap().len(), 12);

    let fixed: Vec<u8> = (1u8..=12).collect();
    blobs
        .insert_one(Blob { id: Some(fixed.clone()), size: 2 })
        .await
        .unwrap();
    let found = blobs
        .find()
        .filter(Filter::eq("size", 2))
        .first()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, Some(fixed));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "events")]
struct Event {
    // Identifier mapped to _id but stored as whatever the caller supplies.
    #[document(id)]
    id: Option<String>,
    kind: String,
}

#[tokio::test]
async fn unconverted_identifiers_store_the_declared_value_as_is() {
    let (store, driver) = store();
    let events = store.collection::<Event>().unwrap();

    events
        .insert_one(Event { id: Some("evt-1".to_string()), kind: "login".to_string() })
        .await
        .unwrap();

    let raw = driver.collection("events").find().collect().await.unwrap();
    assert_eq!(raw[0].get_str("_id").unwrap(), "evt-1");

    let found = events.find_by_id("evt-1").await.unwrap().unwrap();
    assert_eq!(found.kind, "login");
}

#[tokio::test]
async fn collection_admin_mirrors_the_driver() {
    let (store, _) = store();
    store.create_collection("scratch").await.unwrap();
    assert!(store
        .list_collections()
        .await
        .unwrap()
        .contains(&"scratch".to_string()));
    store.drop_collection("scratch").await.unwrap();
    store.shutdown().await.unwrap();
}
