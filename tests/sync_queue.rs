mod common;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use common::{file_url, memory_store, RecordingRemote};
use sign_inventory_sync::connectivity::{ConnectivityEvent, ConnectivityMonitor, Notice};
use sign_inventory_sync::db::{Store, StoreError};
use sign_inventory_sync::inventory::build_records;
use sign_inventory_sync::model::{DraftSign, PendingInventoryRecord, QueuePayload, SignStatus};
use sign_inventory_sync::outbox::SyncQueue;
use sign_inventory_sync::remote::RemoteService;

fn records(session: &str, count: usize) -> Vec<PendingInventoryRecord> {
    let signs: Vec<DraftSign> = (0..count)
        .map(|i| {
            let mut sign = DraftSign::from(&common::entry(&i.to_string(), "S1"));
            sign.status = SignStatus::Present;
            sign
        })
        .collect();
    build_records(session, "S1", &signs)
}

fn monitor(queue: &SyncQueue, remote: &RecordingRemote, online: bool) -> ConnectivityMonitor {
    let remote: Arc<dyn RemoteService> = Arc::new(remote.clone());
    ConnectivityMonitor::new(online, queue.clone(), remote)
}

#[tokio::test]
async fn queue_survives_restart_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);

    let ids = {
        let store = Store::open(&url).await.unwrap();
        let queue = SyncQueue::new(store.clone());
        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(queue.enqueue(records(&format!("offline-{n}"), n + 1)).await.unwrap());
        }
        store.close().await;
        ids
    };

    let queue = SyncQueue::new(Store::open(&url).await.unwrap());
    assert_eq!(queue.count().await.unwrap(), 3);
    let items = queue.items().await.unwrap();
    assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), ids);
    assert_eq!(items[2].payload.len(), 3);
}

#[tokio::test]
async fn successful_drain_empties_queue_and_is_idempotent() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    let first = queue.enqueue(records("offline-1", 2)).await.unwrap();
    let second = queue.enqueue(records("offline-2", 1)).await.unwrap();

    let report = queue.drain(&remote).await.unwrap();
    assert_eq!(report.synced, vec![first, second]);
    assert!(report.failed.is_empty());
    assert_eq!(report.remaining, 0);
    assert_eq!(remote.inserted().await.len(), 3);

    let again = queue.drain(&remote).await.unwrap();
    assert_eq!(again.attempted(), 0);
    assert_eq!(remote.insert_calls().await.len(), 2);
}

#[tokio::test]
async fn failed_item_stays_and_does_not_block_later_items() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    let a = queue.enqueue(records("offline-a", 1)).await.unwrap();
    let b = queue.enqueue(records("offline-b", 1)).await.unwrap();
    let c = queue.enqueue(records("offline-c", 1)).await.unwrap();
    remote.script_inserts(vec![true, false, true]).await;

    let report = queue.drain(&remote).await.unwrap();
    assert_eq!(report.synced, vec![a, c]);
    assert_eq!(report.failed, vec![b]);
    assert_eq!(report.remaining, 1);
    let left = queue.items().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, b);

    let retry = queue.drain(&remote).await.unwrap();
    assert_eq!(retry.synced, vec![b]);
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
async fn empty_item_is_removed_without_remote_call() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    let id = queue
        .enqueue_at(QueuePayload::InventoryRecords(Vec::new()), Utc::now())
        .await
        .unwrap();

    let report = queue.drain(&remote).await.unwrap();
    assert_eq!(report.synced, vec![id]);
    assert!(remote.insert_calls().await.is_empty());
}

#[tokio::test]
async fn corrupt_item_is_skipped_and_kept() {
    let store = memory_store().await;
    let queue = SyncQueue::new(store.clone());
    let remote = RecordingRemote::default();
    sqlx::query("INSERT INTO sync_queue (kind, payload, enqueued_at) VALUES (?, ?, ?)")
        .bind("inventory_records")
        .bind("{not json")
        .bind(Utc::now())
        .execute(store.pool())
        .await
        .unwrap();
    let good = queue.enqueue(records("offline-1", 1)).await.unwrap();

    let report = queue.drain(&remote).await.unwrap();
    assert_eq!(report.synced, vec![good]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.remaining, 1);
    assert!(matches!(
        queue.items().await.unwrap_err(),
        StoreError::Corrupt { .. }
    ));
}

#[tokio::test]
async fn failed_local_delete_does_not_stop_the_pass() {
    let store = memory_store().await;
    let queue = SyncQueue::new(store.clone());
    let remote = RecordingRemote::default();
    let a = queue.enqueue(records("offline-a", 1)).await.unwrap();
    let b = queue.enqueue(records("offline-b", 1)).await.unwrap();
    let c = queue.enqueue(records("offline-c", 1)).await.unwrap();
    sqlx::query(&format!(
        "CREATE TRIGGER keep_item BEFORE DELETE ON sync_queue WHEN OLD.id = {b} \
         BEGIN SELECT RAISE(ABORT, 'locked'); END"
    ))
    .execute(store.pool())
    .await
    .unwrap();

    let report = queue.drain(&remote).await.unwrap();
    assert_eq!(report.synced, vec![a, c]);
    assert_eq!(report.failed, vec![b]);
    assert_eq!(report.remaining, 1);
    assert_eq!(remote.insert_calls().await.len(), 3);
    assert_eq!(queue.items().await.unwrap()[0].id, b);
}

#[tokio::test]
async fn overlapping_drains_submit_each_item_once() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    for n in 0..4 {
        queue.enqueue(records(&format!("offline-{n}"), 1)).await.unwrap();
    }

    let (left, right) = futures::join!(queue.drain(&remote), queue.drain(&remote));
    let synced = left.unwrap().synced.len() + right.unwrap().synced.len();
    assert_eq!(synced, 4);
    assert_eq!(remote.insert_calls().await.len(), 4);
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
async fn only_the_offline_to_online_edge_drains() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    queue.enqueue(records("offline-1", 1)).await.unwrap();
    let monitor = monitor(&queue, &remote, true);

    assert!(monitor.handle_event(ConnectivityEvent::Online).is_none());
    assert!(monitor.handle_event(ConnectivityEvent::Offline).is_none());
    assert!(monitor.handle_event(ConnectivityEvent::Offline).is_none());
    assert_eq!(queue.count().await.unwrap(), 1);

    monitor
        .handle_event(ConnectivityEvent::Online)
        .expect("drain on reconnect")
        .await
        .unwrap();
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
async fn worker_message_requests_a_drain() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    queue.enqueue(records("offline-1", 2)).await.unwrap();
    let monitor = monitor(&queue, &remote, true);

    assert!(monitor.handle_worker_message(r#"{"type":"PING"}"#).is_none());
    monitor
        .handle_worker_message(r#"{"type":"SYNC_OFFLINE_DATA"}"#)
        .expect("drain requested")
        .await
        .unwrap();
    assert_eq!(queue.count().await.unwrap(), 0);
    assert_eq!(remote.inserted().await.len(), 2);
}

#[tokio::test]
async fn monitor_run_follows_event_stream() {
    let queue = SyncQueue::new(memory_store().await);
    let remote = RecordingRemote::default();
    queue.enqueue(records("offline-1", 1)).await.unwrap();
    let monitor = monitor(&queue, &remote, false);
    let mut notices = monitor.notices();

    monitor
        .run(futures::stream::iter(vec![ConnectivityEvent::Online]))
        .await;
    assert!(monitor.is_online());
    assert_eq!(notices.recv().await.unwrap(), Notice::WentOnline);

    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained after reconnect");
}
