use std::collections::HashMap;

use sqlx::PgPool;
use time::macros::datetime;

use aggregator_core::event::Event;
use aggregator_core::store::Store;

fn event(topic: &str, event_id: &str) -> Event {
    Event {
        topic: topic.to_owned(),
        event_id: event_id.to_owned(),
        timestamp: datetime!(2024-01-01 00:00:00 UTC),
        source: "test".to_owned(),
        payload: HashMap::new(),
    }
}

#[sqlx::test(migrations = "../migrations")]
async fn admit_is_idempotent_on_topic_and_event_id(db: PgPool) {
    let store = Store::from_pool(db);

    let first = store.admit(&event("orders", "e1"), "w1").await.unwrap();
    assert!(first.was_new);

    let second = store.admit(&event("orders", "e1"), "w1").await.unwrap();
    assert!(!second.was_new);

    let stats = store.stats_snapshot().await.unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.unique_processed, 1);
    assert_eq!(stats.duplicate_dropped, 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn same_event_id_on_different_topics_are_distinct(db: PgPool) {
    let store = Store::from_pool(db);

    let a = store.admit(&event("orders", "e1"), "w1").await.unwrap();
    let b = store.admit(&event("shipments", "e1"), "w1").await.unwrap();

    assert!(a.was_new);
    assert!(b.was_new);
}

#[sqlx::test(migrations = "../migrations")]
async fn admit_batch_counts_duplicates_within_and_across_calls(db: PgPool) {
    let store = Store::from_pool(db);

    let batch = vec![event("orders", "e1"), event("orders", "e1"), event("orders", "e2")];
    let result = store.admit_batch(&batch, "w1").await.unwrap();
    assert_eq!(result.processed, 2);
    assert_eq!(result.duplicates, 1);

    let stats = store.stats_snapshot().await.unwrap();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.unique_processed, 2);
    assert_eq!(stats.duplicate_dropped, 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn list_events_is_newest_first_and_filters_by_topic(db: PgPool) {
    let store = Store::from_pool(db);

    store.admit(&event("orders", "e1"), "w1").await.unwrap();
    store.admit(&event("shipments", "e1"), "w1").await.unwrap();

    let all = store.list_events(None, 10, 0).await.unwrap();
    assert_eq!(all.len(), 2);

    let orders_only = store.list_events(Some("orders"), 10, 0).await.unwrap();
    assert_eq!(orders_only.len(), 1);
    assert_eq!(orders_only[0].topic, "orders");
}

#[sqlx::test(migrations = "../migrations")]
async fn count_events_respects_topic_filter(db: PgPool) {
    let store = Store::from_pool(db);

    store.admit(&event("orders", "e1"), "w1").await.unwrap();
    store.admit(&event("orders", "e2"), "w1").await.unwrap();
    store.admit(&event("shipments", "e1"), "w1").await.unwrap();

    assert_eq!(store.count_events(None).await.unwrap(), 3);
    assert_eq!(store.count_events(Some("orders")).await.unwrap(), 2);
}

#[sqlx::test(migrations = "../migrations")]
async fn health_reports_true_against_a_live_pool(db: PgPool) {
    let store = Store::from_pool(db);
    assert!(store.health().await);
}
