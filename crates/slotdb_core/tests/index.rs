//! Integration tests for hash indexes.

use serde_json::{json, Value};
use slotdb_core::{Config, CoreError, FilterOptions, SortSpec, Store};

async fn memory_store() -> Store {
    Store::open_in_memory(Config::default()).await.unwrap()
}

async fn lookup(store: &Store, condition: Value) -> Vec<Value> {
    store
        .filter_by_index(&condition, |_| true, FilterOptions::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn index_built_over_existing_records() {
    let store = memory_store().await;
    for id in 1..=3 {
        store.add(json!({ "id": id })).await.unwrap();
    }
    let info = store.create_index(0, &["id"]).await.unwrap();
    assert_eq!(info.buckets, 108_631);
    assert_eq!(info.occupied, 3);

    assert_eq!(lookup(&store, json!({"id": 2})).await, vec![json!({"id": 2})]);
    assert!(lookup(&store, json!({"id": 4})).await.is_empty());
    assert_eq!(store.stats().index_lookups, 2);
}

#[tokio::test]
async fn colliding_values_all_resolve() {
    let store = memory_store().await;
    store.create_index(3, &["id"]).await.unwrap();
    for id in 0..20 {
        store.add(json!({ "id": id, "copy": 0 })).await.unwrap();
    }
    store.add(json!({"id": 5, "copy": 1})).await.unwrap();

    for id in 0..20 {
        let found = lookup(&store, json!({ "id": id })).await;
        let expected = if id == 5 { 2 } else { 1 };
        assert_eq!(found.len(), expected, "id {id}");
        assert!(found.iter().all(|r| r["id"] == id));
    }
    assert!(store.check_integrity().await.unwrap().is_ok());
}

#[tokio::test]
async fn missing_field_does_not_match_null() {
    let store = memory_store().await;
    store.create_index(0, &["x"]).await.unwrap();
    store.add(json!({"x": null, "tag": "null"})).await.unwrap();
    store.add(json!({"y": 1, "tag": "missing"})).await.unwrap();

    let found = lookup(&store, json!({"x": null})).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["tag"], "null");
}

#[tokio::test]
async fn multi_property_index_ignores_condition_order() {
    let store = memory_store().await;
    store.create_index(0, &["b", "a"]).await.unwrap();
    store.add(json!({"a": 1, "b": 2})).await.unwrap();
    store.add(json!({"a": 2, "b": 1})).await.unwrap();
    store.add(json!({"a": 1, "b": 2, "c": true})).await.unwrap();

    assert_eq!(store.indexes()[0].properties, vec!["a", "b"]);
    let found = lookup(&store, json!({"b": 2, "a": 1})).await;
    assert_eq!(found.len(), 2);
    assert!(matches!(
        store
            .filter_by_index(&json!({"a": 1}), |_| true, FilterOptions::new())
            .await,
        Err(CoreError::NotFound { kind: "index", .. })
    ));
}

#[tokio::test]
async fn predicate_and_options_apply_after_lookup() {
    let store = memory_store().await;
    store.create_index(0, &["group"]).await.unwrap();
    for n in 0..10 {
        store
            .add(json!({ "group": n % 2, "n": n }))
            .await
            .unwrap();
    }
    let found = store
        .filter_by_index(
            &json!({"group": 0}),
            |v| v["n"].as_i64().unwrap() > 0,
            FilterOptions::new().sort(SortSpec::new().desc("n")).limit(2),
        )
        .await
        .unwrap();
    let ns: Vec<i64> = found.iter().map(|v| v["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![8, 6]);
}

#[tokio::test]
async fn updates_keep_index_in_step() {
    let store = memory_store().await;
    store.create_index(0, &["tag"]).await.unwrap();
    store.add(json!({"tag": "a", "n": 1})).await.unwrap();
    store.add(json!({"tag": "a", "n": 2})).await.unwrap();

    // Same slot, new hash.
    store
        .update(json!({"tag": "b"}), |v| v["n"] == 1, None)
        .await
        .unwrap();
    assert_eq!(lookup(&store, json!({"tag": "b"})).await.len(), 1);
    assert_eq!(lookup(&store, json!({"tag": "a"})).await.len(), 1);

    // Moved record, unchanged hash.
    store
        .update(json!({"pad": "p".repeat(200)}), |v| v["n"] == 2, None)
        .await
        .unwrap();
    let found = lookup(&store, json!({"tag": "a"})).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["pad"].as_str().unwrap().len(), 200);
}

#[tokio::test]
async fn deleted_records_drop_out_of_lookups() {
    let store = memory_store().await;
    store.create_index(0, &["k"]).await.unwrap();
    store.add(json!({"k": "same", "n": 1})).await.unwrap();
    store.add(json!({"k": "same", "n": 2})).await.unwrap();
    store.delete(|v| v["n"] == 1, None).await.unwrap();

    let found = lookup(&store, json!({"k": "same"})).await;
    assert_eq!(found, vec![json!({"k": "same", "n": 2})]);

    // The freed slot is reused by a record with another key.
    store.add(json!({"k": "oth", "n": 3})).await.unwrap();
    assert_eq!(lookup(&store, json!({"k": "same"})).await.len(), 1);
    assert_eq!(lookup(&store, json!({"k": "oth"})).await.len(), 1);
}

#[tokio::test]
async fn grow_and_delete_index() {
    let store = memory_store().await;
    store.create_index(3, &["id"]).await.unwrap();
    for id in 0..10 {
        store.add(json!({ "id": id })).await.unwrap();
    }
    let grown = store.grow_index(100, &["id"]).await.unwrap();
    assert_eq!(grown.buckets, 107);
    assert_eq!(grown.occupied, 10);
    assert_eq!(lookup(&store, json!({"id": 7})).await.len(), 1);

    store.delete_index(&["id"]).await.unwrap();
    assert!(store.indexes().is_empty());
    assert!(matches!(
        store
            .filter_by_index(&json!({"id": 7}), |_| true, FilterOptions::new())
            .await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.delete_index(&["id"]).await,
        Err(CoreError::NotFound { .. })
    ));
}

#[tokio::test]
async fn index_definition_errors() {
    let store = memory_store().await;
    store.create_index(0, &["a"]).await.unwrap();
    assert!(matches!(
        store.create_index(0, &["a"]).await,
        Err(CoreError::DuplicateDefinition { kind: "index", .. })
    ));
    let none: [&str; 0] = [];
    assert!(matches!(
        store.create_index(0, &none).await,
        Err(CoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store.create_index(u64::MAX, &["b"]).await,
        Err(CoreError::InvalidArgument { .. })
    ));
    assert!(matches!(
        store
            .filter_by_index(&json!({}), |_| true, FilterOptions::new())
            .await,
        Err(CoreError::InvalidArgument { .. })
    ));
}
