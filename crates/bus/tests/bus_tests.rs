use std::sync::Arc;

use aires_bus::{BusHandle, OutboxPublisher, PublisherConfig};
use aires_core::domain::{OutboxMessage, Stage, Topic};
use aires_db::Store;
use tokio::sync::watch;

#[tokio::test]
async fn publish_and_subscribe_round_trip() {
    let bus = BusHandle::new();
    let mut rx = bus.subscribe(Topic::StageInput(Stage::Docs));

    let batch_id = uuid::Uuid::now_v7();
    let message = OutboxMessage::new(batch_id, Topic::StageInput(Stage::Docs), b"hello".to_vec());
    bus.publish(Topic::StageInput(Stage::Docs), message).await.unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.batch_id, batch_id);
    assert_eq!(received.payload, b"hello");
}

#[tokio::test]
async fn outbox_publisher_drains_unpublished_rows() {
    let store = Store::open_in_memory().await.unwrap();
    let bus = Arc::new(BusHandle::new());
    let mut rx = bus.subscribe(Topic::ParseRequested);

    let batch_id = uuid::Uuid::now_v7();
    let message = OutboxMessage::new(batch_id, Topic::ParseRequested, b"payload".to_vec());
    store.insert_outbox_message(message).await.unwrap();

    let publisher = OutboxPublisher::new(store.clone(), bus, PublisherConfig::default());
    let (_tx, rx_shutdown) = watch::channel(false);
    let handle = tokio::spawn(async move {
        publisher.run(rx_shutdown).await;
    });

    let received = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("publisher should deliver within timeout")
        .unwrap();
    assert_eq!(received.batch_id, batch_id);

    handle.abort();
}
