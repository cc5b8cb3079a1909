//! EntityStore against a live PostgreSQL (`DATABASE_URL`). Skipped when it is not set.

mod common;

use common::TestDb;
use relational_store::{Direction, Entity, Key, PageRequest, Sort, StoreError, Value};

fn key(id: i32) -> Key {
    Key::new(Entity::new().with("id", id))
}

fn row(id: i32, value1: &str) -> Entity {
    Entity::new().with("id", id).with("value1", value1)
}

fn ids(entities: &[Entity]) -> Vec<Value> {
    entities.iter().map(|e| e.get("id").cloned().unwrap_or(Value::Null)).collect()
}

macro_rules! test_db {
    () => {
        match TestDb::create().await {
            Some(db) => db,
            None => return,
        }
    };
}

#[tokio::test]
async fn test_discovered_fields() {
    let db = test_db!();
    let store = db.test_table(50).await;
    let names: Vec<_> = store.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["id", "value1", "value2", "amount"]);
    let keys: Vec<_> = store.key_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(keys, ["id"]);
    assert_eq!(store.table_name(), "test");
    assert_eq!(store.batch_size(), 50);
    db.teardown().await;
}

#[tokio::test]
async fn test_missing_table_is_schema_error() {
    let db = test_db!();
    let err = relational_store::EntityStore::discover(
        db.pool.clone(),
        &db.schema,
        "nope",
        std::sync::Arc::new(relational_store::NoFilter),
        Default::default(),
    )
    .await
    .err()
    .expect("missing table");
    assert!(matches!(err, StoreError::Schema(_)));
    db.teardown().await;
}

#[tokio::test]
async fn test_round_trip_with_nullable_field() {
    let db = test_db!();
    let store = db.test_table(50).await;
    let first = row(1, "T1").with("value2", "V1");
    let second = row(2, "T2");
    assert_eq!(store.insert(&first).await.unwrap(), first);
    assert_eq!(store.insert(&second).await.unwrap(), second);

    assert_eq!(store.find(&key(1)).await.unwrap(), Some(first.clone()));
    let found = store.find(&key(2)).await.unwrap().unwrap();
    assert_eq!(found, second);
    assert!(!found.contains("value2"));
    assert_eq!(store.find(&key(3)).await.unwrap(), None);

    let all = store.find_all(&Sort::by(["id"], Direction::Ascending)).await.unwrap();
    assert_eq!(all, vec![first, second]);
    assert_eq!(store.count().await.unwrap(), 2);
    db.teardown().await;
}

#[tokio::test]
async fn test_invalid_insert_writes_nothing() {
    let db = test_db!();
    let store = db.test_table(50).await;
    let err = store.insert(&Entity::new().with("id", 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    let err = store
        .insert_all(&[row(1, "T1"), Entity::new().with("id", 2).with("value1", Value::Null)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(store.count().await.unwrap(), 0);
    db.teardown().await;
}

#[tokio::test]
async fn test_insert_all_in_batches() {
    let db = test_db!();
    let store = db.test_table(3).await;
    let rows: Vec<Entity> = (1..=7).map(|i| row(i, &format!("T{}", i))).collect();
    let inserted = store.insert_all(&rows).await.unwrap();
    assert_eq!(inserted, rows);
    assert_eq!(store.count().await.unwrap(), 7);
    db.teardown().await;
}

#[tokio::test]
async fn test_failed_insert_batch_keeps_earlier_batches() {
    let db = test_db!();
    let store = db.test_table(2).await;
    let rows = vec![
        row(1, "T1"),
        row(2, "T2"),
        row(3, "T3"),
        row(4, "T4").with("amount", -1i64),
    ];
    let err = store.insert_all(&rows).await.unwrap_err();
    assert!(matches!(err, StoreError::Insert(_)));
    let left = store.find_all(&Sort::by(["id"], Direction::Ascending)).await.unwrap();
    assert_eq!(ids(&left), [Value::Integer(1), Value::Integer(2)]);
    db.teardown().await;
}

#[tokio::test]
async fn test_duplicate_key_insert_fails() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store.insert(&row(1, "T1")).await.unwrap();
    let err = store.insert(&row(1, "again")).await.unwrap_err();
    assert!(matches!(err, StoreError::Insert(_)));
    assert!(!err.is_client_error());
    db.teardown().await;
}

#[tokio::test]
async fn test_find_all_keys() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store.insert_all(&[row(1, "T1"), row(2, "T2"), row(3, "T3")]).await.unwrap();

    let found = store
        .find_all_keys(&[key(3), key(99), key(1), key(3)], &Sort::by(["id"], Direction::Descending))
        .await
        .unwrap();
    assert_eq!(ids(&found), [Value::Integer(3), Value::Integer(1)]);
    assert!(store.find_all_keys(&[], &Sort::unsorted()).await.unwrap().is_empty());
    assert!(store.find_all_keys(&[key(42)], &Sort::unsorted()).await.unwrap().is_empty());
    db.teardown().await;
}

#[tokio::test]
async fn test_paging() {
    let db = test_db!();
    let store = db.test_table(50).await;
    let rows: Vec<Entity> = (1..=11).map(|i| row(i, "T")).collect();
    store.insert_all(&rows).await.unwrap();

    let first = store.find_page(PageRequest::new(0, 10).unwrap(), &Sort::unsorted()).await.unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_count, 11);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.items[0], rows[0]);

    let second = store.find_page(PageRequest::new(1, 10).unwrap(), &Sort::unsorted()).await.unwrap();
    assert_eq!(second.items, vec![rows[10].clone()]);
    assert_eq!(second.page_number, 1);

    let past = store.find_page(PageRequest::new(5, 10).unwrap(), &Sort::unsorted()).await.unwrap();
    assert!(past.items.is_empty());
    assert_eq!(past.total_count, 11);

    let desc = store
        .find_page(PageRequest::new(0, 3).unwrap(), &Sort::by(["id"], Direction::Descending))
        .await
        .unwrap();
    assert_eq!(ids(&desc.items), [Value::Integer(11), Value::Integer(10), Value::Integer(9)]);
    db.teardown().await;
}

#[tokio::test]
async fn test_unknown_sort_field() {
    let db = test_db!();
    let store = db.test_table(50).await;
    let err = store.find_all(&Sort::by(["nope"], Direction::Ascending)).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    db.teardown().await;
}

#[tokio::test]
async fn test_find_where() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store
        .insert_all(&[row(1, "T1"), row(2, "T2"), row(3, "T2"), row(4, "T2")])
        .await
        .unwrap();

    let found = store.find_where("value1 = T2", &Sort::by(["id"], Direction::Ascending)).await.unwrap();
    assert_eq!(ids(&found), [Value::Integer(2), Value::Integer(3), Value::Integer(4)]);
    assert_eq!(store.count_where("value1 = T2").await.unwrap(), 3);
    assert_eq!(store.count_where("value1 = none").await.unwrap(), 0);

    let page = store
        .find_where_page("value1 = T2", PageRequest::new(1, 2).unwrap(), &Sort::unsorted())
        .await
        .unwrap();
    assert_eq!(ids(&page.items), [Value::Integer(4)]);
    assert_eq!(page.total_count, 3);
    assert_eq!(page.total_pages, 2);

    let err = store.find_where("id > 3", &Sort::unsorted()).await.unwrap_err();
    assert!(matches!(err, StoreError::QueryParse(_)));
    assert!(err.is_client_error());
    db.teardown().await;
}

#[tokio::test]
async fn test_update_keeps_absent_fields() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store.insert(&row(1, "T1").with("value2", "V1").with("amount", 5i64)).await.unwrap();

    let updated = store.update(&Entity::new().with("id", 1).with("value2", "V2")).await.unwrap();
    assert_eq!(updated, row(1, "T1").with("value2", "V2").with("amount", 5i64));

    let cleared = store.update(&Entity::new().with("id", 1).with("value2", Value::Null)).await.unwrap();
    assert_eq!(cleared, row(1, "T1").with("amount", 5i64));
    assert_eq!(store.find(&key(1)).await.unwrap(), Some(cleared));
    db.teardown().await;
}

#[tokio::test]
async fn test_update_rejections() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store.insert(&row(1, "T1")).await.unwrap();

    let err = store.update(&Entity::new().with("id", 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::Update(_)));
    let err = store.update(&row(1, "T1").with("value1", Value::Null)).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    let err = store.update(&row(99, "T99")).await.unwrap_err();
    assert!(matches!(err, StoreError::Update(_)));
    assert_eq!(store.find(&key(1)).await.unwrap(), Some(row(1, "T1")));
    db.teardown().await;
}

#[tokio::test]
async fn test_update_all_groups_by_shape() {
    let db = test_db!();
    let store = db.test_table(2).await;
    let rows: Vec<Entity> = (1..=5).map(|i| row(i, "old").with("value2", "old")).collect();
    store.insert_all(&rows).await.unwrap();

    let updates = vec![
        Entity::new().with("id", 1).with("value1", "new1"),
        Entity::new().with("id", 2).with("value2", "new2"),
        Entity::new().with("id", 3).with("value1", "new3"),
        Entity::new().with("id", 4).with("value1", "new4").with("value2", "new4"),
        Entity::new().with("id", 5).with("value1", "new5"),
    ];
    let updated = store.update_all(&updates).await.unwrap();
    assert_eq!(
        updated,
        vec![
            row(1, "new1").with("value2", "old"),
            row(2, "old").with("value2", "new2"),
            row(3, "new3").with("value2", "old"),
            row(4, "new4").with("value2", "new4"),
            row(5, "new5").with("value2", "old"),
        ]
    );
    let stored = store.find_all(&Sort::by(["id"], Direction::Ascending)).await.unwrap();
    assert_eq!(stored, updated);
    db.teardown().await;
}

#[tokio::test]
async fn test_update_all_groups_are_not_atomic() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store.insert_all(&[row(1, "T1"), row(2, "T2")]).await.unwrap();

    let err = store
        .update_all(&[
            Entity::new().with("id", 1).with("value1", "changed"),
            Entity::new().with("id", 2).with("amount", -5i64),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Update(_)));
    assert_eq!(store.find(&key(1)).await.unwrap(), Some(row(1, "changed")));
    assert_eq!(store.find(&key(2)).await.unwrap(), Some(row(2, "T2")));
    db.teardown().await;
}

#[tokio::test]
async fn test_update_all_rejects_shapeless_entity_before_writing() {
    let db = test_db!();
    let store = db.test_table(50).await;
    store.insert(&row(1, "T1")).await.unwrap();
    let err = store
        .update_all(&[Entity::new().with("id", 1).with("value1", "changed"), Entity::new().with("id", 1)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Update(_)));
    assert_eq!(store.find(&key(1)).await.unwrap(), Some(row(1, "T1")));
    db.teardown().await;
}

#[tokio::test]
async fn test_delete() {
    let db = test_db!();
    let store = db.test_table(2).await;
    let rows: Vec<Entity> = (1..=5).map(|i| row(i, "T")).collect();
    store.insert_all(&rows).await.unwrap();

    store.delete(&key(1)).await.unwrap();
    store.delete(&key(1)).await.unwrap();
    assert_eq!(store.find(&key(1)).await.unwrap(), None);

    store.delete_all(&[key(2), key(3), key(99), key(4)]).await.unwrap();
    store.delete_all(&[]).await.unwrap();
    let left = store.find_all(&Sort::unsorted()).await.unwrap();
    assert_eq!(left, vec![rows[4].clone()]);
    db.teardown().await;
}

#[tokio::test]
async fn test_auto_increment_key() {
    let db = test_db!();
    db.exec(r#"CREATE TABLE {schema}."auto" (id bigserial PRIMARY KEY, name text NOT NULL)"#).await;
    let store = db.store("auto", 50).await;

    let first = store.insert(&Entity::new().with("name", "a")).await.unwrap();
    let id = match first.get("id") {
        Some(Value::Long(id)) => *id,
        other => panic!("generated id missing: {:?}", other),
    };
    assert_eq!(first.get("name"), Some(&Value::Text("a".into())));

    // A supplied value for the generated column is ignored.
    let more = store
        .insert_all(&[Entity::new().with("name", "b"), Entity::new().with("id", 500i64).with("name", "c")])
        .await
        .unwrap();
    let more_ids: Vec<_> = more.iter().filter_map(|e| e.get("id").cloned()).collect();
    assert_eq!(more_ids, [Value::Long(id + 1), Value::Long(id + 2)]);

    let key = store.key_codec().parse(&(id + 2).to_string()).unwrap();
    assert_eq!(store.find(&key).await.unwrap(), Some(more[1].clone()));
    db.teardown().await;
}

#[tokio::test]
async fn test_composite_key_and_cast_types() {
    let db = test_db!();
    db.exec(
        r#"CREATE TABLE {schema}."event" (
            region varchar(8),
            seq integer,
            flag bit(1) NOT NULL,
            rank smallint,
            happened_on date,
            PRIMARY KEY (region, seq)
        )"#,
    )
    .await;
    let store = db.store("event", 50).await;
    let names: Vec<_> = store.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["region", "seq", "flag", "rank", "happenedOn"]);

    let event = Entity::new()
        .with("region", "eu")
        .with("seq", 1)
        .with("flag", true)
        .with("rank", 3)
        .with("happenedOn", chrono::NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
    store.insert(&event).await.unwrap();
    // Dates may be given as text.
    store
        .insert(&Entity::new().with("region", "eu").with("seq", 2).with("flag", false).with("happenedOn", "2024-05-07"))
        .await
        .unwrap();

    let codec = store.key_codec();
    let raw = codec.encode(&codec.key_of(&event).unwrap()).unwrap();
    let key = codec.parse(&raw).unwrap();
    assert_eq!(store.find(&key).await.unwrap(), Some(event.clone()));

    let updated = store
        .update(&Entity::new().with("region", "eu").with("seq", 1).with("rank", 7).with("flag", false))
        .await
        .unwrap();
    assert_eq!(updated.get("rank"), Some(&Value::Integer(7)));
    assert_eq!(updated.get("flag"), Some(&Value::Boolean(false)));

    let second = codec.key_of(&Entity::new().with("region", "eu").with("seq", 2)).unwrap();
    let both = store
        .find_all_keys(&[key, second], &Sort::by(["seq"], Direction::Ascending))
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
    assert!(!both[1].contains("rank"));
    db.teardown().await;
}

#[tokio::test]
async fn test_round_trip_with_explicit_null() {
    let db = test_db!();
    let store = db.test_table(50).await;
    let entity = row(1, "T1").with("value2", Value::Null).with("amount", Value::Null);
    assert_eq!(store.insert(&entity).await.unwrap(), entity);
    let found = store.find(&key(1)).await.unwrap().unwrap();
    assert_eq!(found, entity);
    assert!(!found.contains("value2"));
    db.teardown().await;
}

#[tokio::test]
async fn test_find_all_keys_beyond_bind_limit() {
    let db = test_db!();
    let store = db.test_table(10).await;
    let rows: Vec<Entity> = (1..=25).map(|i| row(i, "T")).collect();
    store.insert_all(&rows).await.unwrap();

    let keys: Vec<Key> = (1..=70_000).rev().map(key).collect();
    let found = store
        .find_all_keys(&keys, &Sort::by(["id"], Direction::Ascending))
        .await
        .unwrap();
    assert_eq!(found, rows);

    let some: Vec<Key> = [3, 17, 12, 99].into_iter().map(key).collect();
    let found = store
        .find_all_keys(&some, &Sort::by(["id"], Direction::Descending))
        .await
        .unwrap();
    assert_eq!(ids(&found), [Value::Integer(17), Value::Integer(12), Value::Integer(3)]);
    db.teardown().await;
}

#[tokio::test]
async fn test_insert_all_multi_row_batches() {
    let db = test_db!();
    db.exec(r#"CREATE TABLE {schema}."auto" (id bigserial PRIMARY KEY, name text NOT NULL, note text)"#).await;
    let store = db.store("auto", 4).await;
    let entities: Vec<Entity> = (0..10)
        .map(|i| Entity::new().with("name", format!("n{}", i)).with("note", Value::Null))
        .collect();
    let inserted = store.insert_all(&entities).await.unwrap();
    assert_eq!(inserted.len(), 10);
    let mut previous = 0;
    for (entity, stored) in entities.iter().zip(&inserted) {
        assert_eq!(stored.get("name"), entity.get("name"));
        let id = match stored.get("id") {
            Some(Value::Long(id)) => *id,
            other => panic!("generated id missing: {:?}", other),
        };
        assert!(id > previous, "ids follow input order");
        previous = id;
        let found = store.find(&store.key_codec().key_of(stored).unwrap()).await.unwrap();
        assert_eq!(found.as_ref(), Some(stored));
    }
    db.teardown().await;
}

#[tokio::test]
async fn test_every_semantic_type_round_trips() {
    let db = test_db!();
    db.exec(
        r#"CREATE TABLE {schema}."typed" (
            code char(4),
            at timestamp,
            active boolean NOT NULL,
            ratio real,
            score double precision,
            price numeric(12, 3),
            note text,
            starts time,
            PRIMARY KEY (code, at)
        )"#,
    )
    .await;
    let store = db.store("typed", 50).await;
    let types: Vec<_> = store.fields().iter().map(|f| f.semantic_type).collect();
    use relational_store::SemanticType as T;
    assert_eq!(
        types,
        [T::Text, T::Timestamp, T::Boolean, T::Float, T::Double, T::Decimal, T::Text, T::Time]
    );

    let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_micro_opt(3, 4, 5, 123_456)
        .unwrap();
    let entity = Entity::new()
        .with("code", "abcd")
        .with("at", at)
        .with("active", true)
        .with("ratio", 1.5f32)
        .with("score", 2.25f64)
        .with("price", "12.345".parse::<bigdecimal::BigDecimal>().unwrap())
        .with("note", "free text")
        .with("starts", chrono::NaiveTime::from_hms_opt(10, 11, 12).unwrap());
    assert_eq!(store.insert(&entity).await.unwrap(), entity);

    let codec = store.key_codec();
    let key = codec.parse(&codec.encode(&codec.key_of(&entity).unwrap()).unwrap()).unwrap();
    assert_eq!(store.find(&key).await.unwrap(), Some(entity.clone()));

    // textual forms are coerced to the field types, keys included
    let text_key = codec
        .key_of(&Entity::new().with("code", "abcd").with("at", "2024-01-02 03:04:05.123456"))
        .unwrap();
    assert_eq!(text_key, key);
    let updated = store
        .update(
            &Entity::new()
                .with("code", "abcd")
                .with("at", "2024-01-02T03:04:05.123456")
                .with("active", false)
                .with("starts", "08:30:00")
                .with("score", Value::Null),
        )
        .await
        .unwrap();
    assert_eq!(updated.get("active"), Some(&Value::Boolean(false)));
    assert_eq!(
        updated.get("starts"),
        Some(&Value::Time(chrono::NaiveTime::from_hms_opt(8, 30, 0).unwrap()))
    );
    assert!(!updated.contains("score"));
    assert_eq!(updated.get("price"), entity.get("price"));

    let both = store.find_all_keys(&[key.clone(), text_key], &Sort::unsorted()).await.unwrap();
    assert_eq!(both, vec![updated]);

    store.delete(&key).await.unwrap();
    assert_eq!(store.find(&key).await.unwrap(), None);
    db.teardown().await;
}
