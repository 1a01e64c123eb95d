//! Integration tests for collections, indexes and queries through the public API

use memdex_core::{
    AddOptions, Collection, CollectionConfig, CollectionEvent, ErrorKind, IndexOptions, KeyField, OnConflict, OrderBy,
    OrderedIndex, QueryParser, QueryState, RangeOptions, Record, RecordRef, RemoveOptions, Value,
};
use serde_json::json;

fn collection() -> Collection {
    Collection::new(CollectionConfig::new("users")).unwrap()
}

fn ages(records: &[RecordRef]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get("age").and_then(|v| v.as_i64()).unwrap())
        .collect()
}

fn names(records: &[RecordRef]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("name").and_then(|v| v.as_str().map(str::to_string)).unwrap())
        .collect()
}

#[test]
fn test_skip_conflict_keeps_stored_values() {
    let mut users = collection();
    let first = users.add(
        Record::from_json(json!({"id": 7, "name": "ann", "age": 40})).unwrap(),
        &AddOptions::new().on_conflict(OnConflict::Skip),
    );
    users.add(
        Record::from_json(json!({"id": 7, "name": "bea", "age": 12, "extra": true})).unwrap(),
        &AddOptions::new().on_conflict(OnConflict::Skip),
    );

    assert_eq!(users.len(), 1);
    let stored = first.read();
    assert_eq!(stored.get("name"), Some(&Value::from("ann")));
    assert_eq!(stored.get("age"), Some(&Value::Int(40)));
    assert!(!stored.contains_key("extra"));
}

#[test]
fn test_add_many_then_get_all_is_order_independent() {
    for reversed in [false, true] {
        let mut users = collection();
        let r1 = RecordRef::new(Record::new().with("id", 1));
        let r2 = RecordRef::new(Record::new().with("id", 2));
        let input = if reversed {
            vec![r2.clone(), r1.clone()]
        } else {
            vec![r1.clone(), r2.clone()]
        };
        users.add_many(input, &AddOptions::new());

        let all = users.get_all(&[], None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|r| r.ptr_eq(&r1)));
        assert!(all.iter().any(|r| r.ptr_eq(&r2)));
    }
}

#[test]
fn test_between_half_open_on_primary() {
    let users = Collection::with_records(
        CollectionConfig::default(),
        (1..=5).map(|id| Record::new().with("id", id)),
    )
    .unwrap();

    let found = users
        .between(&[Value::Int(2)], &[Value::Int(4)], &RangeOptions::new(), None)
        .unwrap();
    let ids: Vec<i64> = found
        .iter()
        .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
        .collect();
    assert_eq!(ids, vec![2, 3]);
}

#[test]
fn test_filter_where_then_order_desc() {
    let mut users = collection();
    users
        .add_json(json!([{"id": 1, "age": 30}, {"id": 2, "age": 19}, {"id": 3, "age": 45}]), &AddOptions::new())
        .unwrap();

    let result = users
        .filter_json(&json!({"where": {"age": {">=": 20}}, "orderBy": [["age", "DESC"]]}))
        .unwrap();
    assert_eq!(ages(&result), vec![45, 30]);
}

#[test]
fn test_skip_then_limit_slices_snapshot() {
    let mut users = collection();
    for (id, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        users.add(Record::new().with("id", id as i64).with("name", *name), &AddOptions::new());
    }

    let result = users.query().skip(1).unwrap().limit(2).unwrap().run();
    assert_eq!(names(&result), vec!["b", "c"]);

    let past_end = users.query().skip(10).unwrap().run();
    assert!(past_end.is_empty());
}

#[test]
fn test_index_access_after_get_is_illegal() {
    let mut users = collection();
    users.add(Record::new().with("id", 1), &AddOptions::new());

    let mut query = users.query();
    query.get(&[Value::Int(1)]).unwrap();
    assert_eq!(query.state(), QueryState::Fetched);

    let err = query
        .between(&[Value::Int(0)], &[Value::Int(5)], &RangeOptions::new())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(err.to_string(), "Index inaccessible after first operation");
}

#[test]
fn test_removing_unknown_record_changes_nothing() {
    let mut users = collection();
    users
        .create_index("by_age", vec![KeyField::path("age")], IndexOptions::new())
        .unwrap();
    users.add(Record::new().with("id", 1).with("age", 20), &AddOptions::new());

    let stranger = RecordRef::new(Record::new().with("id", 99).with("age", 20));
    let mut events = users.subscribe();

    assert!(users.remove(&stranger, &RemoveOptions::default()).is_none());
    assert!(users.remove(Value::from("nope"), &RemoveOptions::default()).is_none());
    assert_eq!(users.len(), 1);
    assert_eq!(users.get_index("by_age").unwrap().len(), 1);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_or_fold_is_left_to_right() {
    let mut users = collection();
    users
        .add_json(
            json!([
                {"id": 1, "name": "ann", "age": 15, "role": "admin"},
                {"id": 2, "name": "bob", "age": 30, "role": "user"},
                {"id": 3, "name": "cat", "age": 10, "role": "user"}
            ]),
            &AddOptions::new(),
        )
        .unwrap();

    // (role == admin OR age >= 18) AND name != bob
    let result = users
        .filter_json(&json!({
            "where": [
                {"role": {"==": "admin"}},
                "or",
                {"age": {">=": 18}},
                {"name": {"!=": "bob"}}
            ]
        }))
        .unwrap();
    assert_eq!(names(&result), vec!["ann"]);

    // role == user AND age >= 18 OR name == cat, folded as ((user AND adult) OR cat)
    let result = users
        .filter_json(&json!({
            "where": {"role": {"==": "user"}, "age": {">=": 18}, "name": {"|==": "cat"}}
        }))
        .unwrap();
    assert_eq!(names(&result), vec!["bob", "cat"]);
}

#[test]
fn test_operator_catalogue() {
    let mut users = collection();
    users
        .add_json(
            json!([
                {"id": 1, "name": "John Smith", "tags": ["a", "b"], "score": "10"},
                {"id": 2, "name": "jane doe", "tags": ["c"], "score": 7},
                {"id": 3, "name": "Jo", "score": null}
            ]),
            &AddOptions::new(),
        )
        .unwrap();

    let ids = |query: serde_json::Value| -> Vec<i64> {
        users
            .filter_json(&query)
            .unwrap()
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
            .collect()
    };

    assert_eq!(ids(json!({"where": {"score": {"==": 10}}})), vec![1]);
    assert_eq!(ids(json!({"where": {"score": {"===": 10}}})), Vec::<i64>::new());
    assert_eq!(ids(json!({"where": {"score": {"==": null}}})), vec![3]);
    assert_eq!(ids(json!({"where": {"score": {">": 8}}})), vec![1]);
    assert_eq!(ids(json!({"where": {"id": {"in": [1, 3]}}})), vec![1, 3]);
    assert_eq!(ids(json!({"where": {"id": {"notIn": [1, 3]}}})), vec![2]);
    assert_eq!(ids(json!({"where": {"tags": {"contains": "c"}}})), vec![2]);
    assert_eq!(ids(json!({"where": {"tags": {"notContains": "c"}}})), vec![1, 3]);
    assert_eq!(ids(json!({"where": {"tags": {"isectNotEmpty": ["b", "z"]}}})), vec![1]);
    assert_eq!(ids(json!({"where": {"tags": {"isectEmpty": ["b", "z"]}}})), vec![2, 3]);
    assert_eq!(ids(json!({"where": {"name": {"like": "J%"}}})), vec![1, 3]);
    assert_eq!(ids(json!({"where": {"name": {"likei": "j%"}}})), vec![1, 2, 3]);
    assert_eq!(ids(json!({"where": {"name": {"notLike": "J_"}}})), vec![1, 2]);

    let err = users.filter_json(&json!({"where": {"name": {"likeq": "x"}}})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = users.filter_json(&json!({"limit": "all"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_numeric_aware_sort() {
    let mut users = collection();
    for (id, name) in ["item10", "Item2", "item1"].iter().enumerate() {
        users.add(Record::new().with("id", id as i64).with("name", *name), &AddOptions::new());
    }

    let sorted = users
        .query()
        .order_by(&[OrderBy::asc("name")], Some("en"))
        .unwrap()
        .run();
    assert_eq!(names(&sorted), vec!["item1", "Item2", "item10"]);
}

#[test]
fn test_compound_secondary_index() {
    let mut users = collection();
    users
        .create_index(
            "by_city_age",
            vec![KeyField::path("address.city"), KeyField::path("age")],
            IndexOptions::new(),
        )
        .unwrap();
    users
        .add_json(
            json!([
                {"id": 1, "name": "a", "age": 30, "address": {"city": "Oslo"}},
                {"id": 2, "name": "b", "age": 20, "address": {"city": "Oslo"}},
                {"id": 3, "name": "c", "age": 25, "address": {"city": "Rome"}},
                {"id": 4, "name": "d", "age": 40, "address": {"city": "Oslo"}}
            ]),
            &AddOptions::new(),
        )
        .unwrap();

    let oslo = users.get_all(&[vec![Value::from("Oslo")]], Some("by_city_age")).unwrap();
    assert_eq!(names(&oslo), vec!["b", "a", "d"]);

    let young_oslo = users
        .between(
            &[Value::from("Oslo"), Value::Int(20)],
            &[Value::from("Oslo"), Value::Int(30)],
            &RangeOptions::new().right_inclusive(true),
            Some("by_city_age"),
        )
        .unwrap();
    assert_eq!(names(&young_oslo), vec!["b", "a"]);
}

#[test]
fn test_record_writes_reach_indexes_after_flush() {
    let mut users = collection();
    users
        .create_index("by_age", vec![KeyField::path("age")], IndexOptions::new())
        .unwrap();
    let ann = users.add(Record::new().with("id", 1).with("age", 20), &AddOptions::new());
    let mut events = users.subscribe();

    ann.write().set_by_path("age", 21).unwrap();
    assert_eq!(users.flush_changes(), 1);

    let found = users.get_all(&[vec![Value::Int(21)]], Some("by_age")).unwrap();
    assert!(found[0].ptr_eq(&ann));
    assert!(matches!(events.try_recv().unwrap(), CollectionEvent::Change { .. }));
}

#[test]
fn test_change_events_can_be_disabled() {
    let mut users = Collection::new(CollectionConfig::default().emit_record_events(false)).unwrap();
    let ann = users.add(Record::new().with("id", 1).with("age", 20), &AddOptions::new());
    let mut events = users.subscribe();

    ann.set("age", 22);
    assert_eq!(users.flush_changes(), 1);
    assert!(events.try_recv().is_err());
    assert_eq!(users.get(1).unwrap().get("age"), Some(Value::Int(22)));
}

#[test]
fn test_parsed_spec_reusable_across_collections() {
    let spec = QueryParser::parse(r#"{"where": {"age": {"<": 18}}, "orderBy": "age"}"#).unwrap();

    let mut a = collection();
    a.add_json(json!([{"id": 1, "age": 12}, {"id": 2, "age": 30}, {"id": 3, "age": 5}]), &AddOptions::new())
        .unwrap();
    let mut b = collection();
    b.add_json(json!([{"id": 1, "age": 17}]), &AddOptions::new()).unwrap();

    assert_eq!(ages(&a.filter(&spec).unwrap()), vec![5, 12]);
    assert_eq!(ages(&b.filter(&spec).unwrap()), vec![17]);
}

#[test]
fn test_standalone_index() {
    let mut index = OrderedIndex::new(vec![KeyField::path("n")], IndexOptions::new()).unwrap();
    let records: Vec<RecordRef> = (0..10)
        .map(|n| RecordRef::new(Record::new().with("n", n % 3)))
        .collect();
    for record in &records {
        assert!(index.insert_record(record));
    }

    assert_eq!(index.len(), 10);
    assert_eq!(index.key_count(), 3);
    assert_eq!(index.get(&[Value::Int(0)]).len(), 4);

    for record in &records[..4] {
        assert!(index.remove(record).is_some());
    }
    assert_eq!(index.len(), 6);
    assert!(index.remove(&records[0]).is_none());
}
