mod common;

use common::*;
use event_pipeline::messaging::{
    ConnectionState, DropReason, EventConsumer, EventPublisher, InMemoryBroker, PublishOutcome,
    RetryPolicy,
};
use event_pipeline::state::{EventQuery, EventStore, InMemoryEventLog};
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;

/// Create then delete an item end to end through the broker
#[tokio::test]
async fn test_create_then_delete_scenario() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(InMemoryEventLog::new());

    let publisher = publisher(&broker, RecordingSleeper::new());
    publisher.connect_until_ready().await;

    let consumer = consumer(&broker, store.clone(), RecordingSleeper::new());
    consumer.start();

    let mut extra = Map::new();
    extra.insert("title".into(), json!("Release notes"));
    assert!(publisher.publish("create", Some("C005"), extra).await.is_published());
    assert!(publisher.publish("delete", Some("C005"), Map::new()).await.is_published());

    assert!(eventually(|| async { store.len().await.unwrap() == 2 }).await);

    let deletes = store.query(&EventQuery::by_action("delete")).await.unwrap();
    assert_eq!(deletes.returned, 1);
    assert_eq!(deletes.total, 2);
    assert_eq!(deletes.events[0].id, "E00002");
    assert_eq!(deletes.events[0].item_id.as_deref(), Some("C005"));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_events, 2);
    assert_eq!(stats.by_source.get("content-service"), Some(&2));
    assert_eq!(stats.by_action.get("create"), Some(&1));
    assert_eq!(stats.by_action.get("delete"), Some(&1));

    let created = store.query(&EventQuery::by_action("create")).await.unwrap();
    let meta = created.events[0].transport_meta.as_ref().unwrap();
    assert_eq!(meta.topic, TOPIC);
    assert_eq!(meta.offset, 0);
    assert_eq!(meta.key.as_deref(), Some("C005"));
    assert_eq!(created.events[0].extra.get("title"), Some(&json!("Release notes")));

    consumer.shutdown(Duration::from_secs(1)).await;
}

/// A malformed message between two good ones is skipped
#[tokio::test]
async fn test_good_bad_good() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(InMemoryEventLog::new());

    broker.inject(TOPIC, Some("C001"), br#"{"source":"content-service","action":"view","itemId":"C001"}"#);
    broker.inject(TOPIC, Some("C002"), b"{this is not json");
    broker.inject(TOPIC, Some("C003"), br#"{"source":"content-service","action":"view","itemId":"C003"}"#);

    let consumer = consumer(&broker, store.clone(), RecordingSleeper::new());
    consumer.start();

    assert!(eventually(|| async { consumer.messages_skipped() == 1 && store.len().await.unwrap() == 2 }).await);

    let result = store.query(&EventQuery::default()).await.unwrap();
    let items: Vec<_> = result.events.iter().map(|e| e.item_id.as_deref()).collect();
    assert_eq!(items, vec![Some("C001"), Some("C003")]);
    let ids: Vec<_> = result.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["E00001", "E00002"]);
    assert_eq!(consumer.messages_consumed(), 2);

    consumer.shutdown(Duration::from_secs(1)).await;
}

/// Log order follows broker order and ids have no gaps
#[tokio::test]
async fn test_append_order_matches_delivery_order() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(InMemoryEventLog::new());

    let publisher = publisher(&broker, RecordingSleeper::new());
    publisher.connect_until_ready().await;

    for i in 0..20 {
        let item = format!("C{:03}", i + 1);
        let action = if i % 2 == 0 { "view" } else { "create" };
        publisher.publish(action, Some(&item), Map::new()).await;
    }

    let consumer = consumer(&broker, store.clone(), RecordingSleeper::new());
    consumer.start();
    assert!(eventually(|| async { store.len().await.unwrap() == 20 }).await);

    let result = store.query(&EventQuery::default().with_limit(100)).await.unwrap();
    for (index, event) in result.events.iter().enumerate() {
        assert_eq!(event.id, format!("E{:05}", index + 1));
        assert_eq!(event.transport_meta.as_ref().unwrap().offset, index as i64);
    }

    let views = store.query(&EventQuery::by_action("view").with_limit(3)).await.unwrap();
    let items: Vec<_> = views.events.iter().map(|e| e.item_id.clone().unwrap()).collect();
    assert_eq!(items, vec!["C015", "C017", "C019"]);
    assert_eq!(views.matched, 10);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.by_source.values().sum::<u64>() as usize, stats.total_events);

    consumer.shutdown(Duration::from_secs(1)).await;
}

/// Publishing without a connection drops the event and never errors
#[tokio::test]
async fn test_publish_while_disconnected() {
    let broker = InMemoryBroker::new();
    broker.set_available(false);

    let sleeper = RecordingSleeper::new();
    let publisher = publisher(&broker, sleeper.clone());
    publisher.start();

    assert!(eventually(|| async { sleeper.count() >= 2 }).await);
    assert!(!publisher.health().is_connected());
    assert_eq!(publisher.health().broker_label(), "reconnecting");

    let outcome = publisher.publish("create", Some("C001"), Map::new()).await;
    assert_eq!(outcome, PublishOutcome::Dropped(DropReason::NotConnected));
    assert!(broker.messages(TOPIC).is_empty());

    broker.set_available(true);
    assert!(eventually(|| async { publisher.health().is_connected() }).await);

    let outcome = publisher
        .publish_detached("create", Some("C001".to_string()), Map::new())
        .await
        .unwrap();
    assert!(outcome.is_published());
    assert_eq!(broker.messages(TOPIC).len(), 1);

    assert!(sleeper.delays().iter().all(|d| *d == Duration::from_secs(5)));
    assert_eq!(publisher.status().events_dropped, 1);
    assert_eq!(publisher.status().events_published, 1);

    publisher.shutdown(Duration::from_secs(1)).await;
}

/// A send failure while connected triggers a reconnect
#[tokio::test]
async fn test_publisher_reconnects_after_send_failure() {
    let broker = InMemoryBroker::new();
    let sleeper = RecordingSleeper::new();
    let publisher = publisher(&broker, sleeper.clone());
    publisher.start();
    assert!(eventually(|| async { publisher.health().is_connected() }).await);

    broker.set_available(false);
    let outcome = publisher.publish("view", Some("C001"), Map::new()).await;
    assert!(matches!(outcome, PublishOutcome::Dropped(DropReason::Rejected(_))));
    assert!(!publisher.health().is_connected());

    broker.set_available(true);
    assert!(eventually(|| async { publisher.health().is_connected() }).await);
    assert!(publisher.publish("view", Some("C001"), Map::new()).await.is_published());

    publisher.shutdown(Duration::from_secs(1)).await;
    assert_eq!(publisher.health().state(), ConnectionState::Disconnected);
}

/// Subscribe retries during an outage and resumes when the broker returns
#[tokio::test]
async fn test_consumer_survives_outage_at_startup() {
    let broker = InMemoryBroker::new();
    broker.set_available(false);
    let store = Arc::new(InMemoryEventLog::new());

    let sleeper = RecordingSleeper::new();
    let consumer = consumer(&broker, store.clone(), sleeper.clone());
    consumer.start();

    assert!(eventually(|| async { sleeper.count() >= 2 }).await);
    assert_eq!(consumer.health().broker_label(), "reconnecting");
    assert!(sleeper.delays().iter().all(|d| *d == Duration::from_secs(5)));

    broker.set_available(true);
    assert!(eventually(|| async { consumer.health().is_connected() }).await);

    broker.inject(TOPIC, None, br#"{"source":"gateway","action":"login"}"#);
    assert!(eventually(|| async { store.len().await.unwrap() == 1 }).await);

    consumer.shutdown(Duration::from_secs(1)).await;
}

/// An outage mid-stream moves the consumer to reconnecting without losing
/// or duplicating messages
#[tokio::test]
async fn test_consumer_resumes_after_mid_stream_outage() {
    let broker = InMemoryBroker::new();
    let store = Arc::new(InMemoryEventLog::new());

    let consumer = consumer(&broker, store.clone(), RecordingSleeper::new());
    consumer.start();
    assert!(eventually(|| async { consumer.health().is_connected() }).await);

    broker.inject(TOPIC, None, br#"{"source":"a","action":"one"}"#);
    assert!(eventually(|| async { store.len().await.unwrap() == 1 }).await);

    broker.set_available(false);
    assert!(eventually(|| async { consumer.health().state() != ConnectionState::Connected }).await);
    assert_eq!(consumer.health().broker_label(), "reconnecting");

    broker.inject(TOPIC, None, br#"{"source":"a","action":"two"}"#);
    broker.set_available(true);

    assert!(eventually(|| async { store.len().await.unwrap() == 2 }).await);
    assert!(consumer.health().is_connected());
    assert_eq!(broker.committed_offset(GROUP, TOPIC), 2);

    let status = consumer.status().await.unwrap();
    assert_eq!(status.messages_consumed, 2);
    assert!(status.connection.connect_attempts >= 2);

    consumer.shutdown(Duration::from_secs(1)).await;
    assert_eq!(consumer.health().state(), ConnectionState::Disconnected);
}

/// With the default policy a returning broker is picked up on the next
/// attempt, at most one retry interval later
#[tokio::test(start_paused = true)]
async fn test_consumer_reconnects_within_one_retry_interval() {
    let broker = InMemoryBroker::new();
    broker.set_available(false);
    let store = Arc::new(InMemoryEventLog::new());

    let consumer = Arc::new(
        EventConsumer::new(Arc::new(broker.subscriber(GROUP)), store.clone(), TOPIC, GROUP)
            .with_retry_policy(RetryPolicy::default()),
    );
    consumer.start();

    // Attempts at 0s, 5s and 10s
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(consumer.health().snapshot().connect_attempts, 3);
    assert!(!consumer.health().is_connected());

    broker.set_available(true);
    tokio::time::sleep(Duration::from_millis(5_001)).await;
    assert!(consumer.health().is_connected());
    assert_eq!(consumer.health().snapshot().connect_attempts, 4);

    broker.inject(TOPIC, Some("C001"), br#"{"source":"content-service","action":"view","itemId":"C001"}"#);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(store.len().await.unwrap(), 1);

    consumer.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_publisher_reconnects_within_one_retry_interval() {
    let broker = InMemoryBroker::new();
    broker.set_available(false);

    let publisher = Arc::new(
        EventPublisher::new(Arc::new(broker.producer()), SOURCE, TOPIC)
            .with_retry_policy(RetryPolicy::default()),
    );
    publisher.start();

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(publisher.health().snapshot().connect_attempts, 3);
    assert_eq!(publisher.health().broker_label(), "reconnecting");

    broker.set_available(true);
    tokio::time::sleep(Duration::from_millis(5_001)).await;
    assert!(publisher.health().is_connected());

    assert!(publisher.publish("create", Some("C004"), Map::new()).await.is_published());
    assert_eq!(broker.messages(TOPIC).len(), 1);

    publisher.shutdown(Duration::from_secs(1)).await;
}
