//! End-to-end coordinator tests: message in, fetch out, stats persisted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use precache_predictor::storage::{CONFIG_KEY, STATS_KEY};
use precache_predictor::*;

// ─────────────────────── helpers ───────────────────────

/// Fetcher that records every URL and succeeds unless told otherwise.
#[derive(Default)]
struct RecordingFetcher {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn prefetch(&self, url: &str) -> PredictorResult<FetchReport> {
        self.calls.lock().await.push(url.to_string());
        if self.fail {
            return Err(PredictorError::Fetch(format!("{url} unreachable")));
        }
        Ok(FetchReport {
            url: url.to_string(),
            status: 200,
            bytes: 128,
            elapsed_ms: 75,
        })
    }
}

async fn start(
    store: Arc<MemoryStore>,
    fetcher: Arc<RecordingFetcher>,
) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
    let coordinator = Coordinator::load(store, fetcher, PredictorConfig::default())
        .await
        .unwrap();
    coordinator.spawn()
}

async fn navigate(handle: &CoordinatorHandle, tab_id: u64, url: &str) {
    handle
        .request(Message::TabUpdated {
            tab_id,
            url: url.to_string(),
        })
        .await
        .unwrap();
}

/// Poll `getStats` until `pred` holds or give up after ~2 s.
async fn wait_for_stats(handle: &CoordinatorHandle, pred: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..100 {
        let stats = handle.request(Message::GetStats).await.unwrap();
        if pred(&stats) {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("stats condition not reached");
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_startup_writes_defaults() {
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = start(store.clone(), Arc::default()).await;

    let items = store.items().await;
    assert_eq!(items[CONFIG_KEY]["isActive"], true);
    assert_eq!(items[STATS_KEY]["visitedUrls"], "[]");

    drop(handle);
    task.await.unwrap();
}

#[tokio::test]
async fn test_learn_prefetch_and_hit() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(RecordingFetcher::default());
    let (handle, task) = start(store.clone(), fetcher.clone()).await;

    navigate(&handle, 1, "https://shop.test/").await;
    navigate(&handle, 1, "https://shop.test/cart").await;
    navigate(&handle, 1, "https://shop.test/").await;

    let stats = wait_for_stats(&handle, |s| s["prefetchedPages"] == 1).await;
    assert_eq!(stats["successfulPrefetches"], 0);
    assert_eq!(*fetcher.calls.lock().await, vec!["https://shop.test/cart"]);

    navigate(&handle, 1, "https://shop.test/cart").await;
    let stats = handle.request(Message::GetStats).await.unwrap();
    assert_eq!(stats["successfulPrefetches"], 1);
    assert_eq!(stats["totalTimeSaved"], 75);
    assert_eq!(stats["hitRate"], 100);

    drop(handle);
    task.await.unwrap();

    // Persisted after shutdown.
    let record: StatsRecord =
        serde_json::from_value(store.items().await[STATS_KEY].clone()).unwrap();
    assert_eq!(record.successful_prefetches, 1);
    let (_, history) = record.decode().unwrap();
    assert_eq!(history.edge_count("https://shop.test/", "https://shop.test/cart"), 2);
}

#[tokio::test]
async fn test_failed_fetch_is_not_counted() {
    let store = Arc::new(MemoryStore::new());
    let fetcher = Arc::new(RecordingFetcher {
        fail: true,
        ..RecordingFetcher::default()
    });
    let (handle, task) = start(store, fetcher.clone()).await;

    handle
        .send(Message::ImportantPrediction {
            current_url: "https://a.test/".into(),
            predicted_url: "https://a.test/next".into(),
            confidence: 0.9,
        })
        .await
        .unwrap();

    for _ in 0..100 {
        if !fetcher.calls.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = handle.request(Message::GetStats).await.unwrap();
    assert_eq!(stats["prefetchedPages"], 0);

    drop(handle);
    task.await.unwrap();
}

#[tokio::test]
async fn test_settings_survive_restart() {
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = start(store.clone(), Arc::default()).await;

    let reply = handle
        .request(Message::ToggleActive { is_active: false })
        .await
        .unwrap();
    assert_eq!(reply, json!({"success": true}));
    drop(handle);
    task.await.unwrap();

    let coordinator = Coordinator::load(store, Arc::new(RecordingFetcher::default()), PredictorConfig::default())
        .await
        .unwrap();
    assert!(!coordinator.state().settings().is_active);
}

#[tokio::test]
async fn test_reset_all_restores_defaults() {
    let store = Arc::new(MemoryStore::new());
    store.set("legacy", json!(true)).await.unwrap();
    let (handle, task) = start(store.clone(), Arc::default()).await;

    navigate(&handle, 3, "https://a.test/").await;
    navigate(&handle, 3, "https://a.test/b").await;
    let reply = handle.request(Message::ResetAll).await.unwrap();
    assert_eq!(reply["success"], true);

    let exported = handle.request(Message::ExportData).await.unwrap();
    assert_eq!(exported["stats"]["navigationPatterns"], "[]");

    drop(handle);
    task.await.unwrap();
    let items = store.items().await;
    assert!(!items.contains_key("legacy"));
    assert_eq!(items[CONFIG_KEY]["prefetchLevel"], "medium");
}

#[tokio::test]
async fn test_notifications_have_null_reply() {
    let (handle, task) = start(Arc::new(MemoryStore::new()), Arc::default()).await;
    let reply = handle
        .request(Message::TabRemoved { tab_id: 99 })
        .await
        .unwrap();
    assert_eq!(reply, Value::Null);
    drop(handle);
    task.await.unwrap();
}

/// Store whose writes always fail.
struct FullDisk;

#[async_trait]
impl KeyValueStore for FullDisk {
    async fn get(&self, _key: &str) -> PredictorResult<Option<Value>> {
        Ok(None)
    }
    async fn set(&self, _key: &str, _value: Value) -> PredictorResult<()> {
        Err(PredictorError::Storage("disk full".into()))
    }
    async fn clear(&self) -> PredictorResult<()> {
        Err(PredictorError::Storage("disk full".into()))
    }
}

#[tokio::test]
async fn test_store_failures_do_not_block_updates() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let coordinator = Coordinator::load(Arc::new(FullDisk), fetcher, PredictorConfig::default())
        .await
        .unwrap();
    let (handle, task) = coordinator.spawn();

    navigate(&handle, 1, "https://shop.test/").await;
    navigate(&handle, 1, "https://shop.test/cart").await;
    navigate(&handle, 1, "https://shop.test/").await;
    wait_for_stats(&handle, |s| s["prefetchedPages"] == 1).await;

    navigate(&handle, 1, "https://shop.test/cart").await;
    let stats = handle.request(Message::GetStats).await.unwrap();
    assert_eq!(stats["successfulPrefetches"], 1);
    assert_eq!(stats["totalTimeSaved"], 75);

    let reply = handle
        .request(Message::ToggleActive { is_active: false })
        .await
        .unwrap();
    assert_eq!(reply, json!({"success": true}));

    drop(handle);
    task.await.unwrap();
}
