//! Key-value persistence for settings and stats.
//!
//! Two keys are used: `config` holds [`Settings`], `stats` holds a
//! [`StatsRecord`]. Stores are only written from the coordinator's
//! persistence task, so writes land in the order they were issued.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::history::{NavigationHistory, PatternEntries, VisitEntries};
use crate::types::{PredictorError, PredictorResult, Settings, Stats};

pub const CONFIG_KEY: &str = "config";
pub const STATS_KEY: &str = "stats";

/// Minimal async key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PredictorResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> PredictorResult<()>;
    /// Remove every key.
    async fn clear(&self) -> PredictorResult<()>;
}

/// Volatile store, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all items.
    pub async fn items(&self) -> BTreeMap<String, Value> {
        self.items.lock().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PredictorResult<Option<Value>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> PredictorResult<()> {
        self.items.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self) -> PredictorResult<()> {
        self.items.lock().await.clear();
        Ok(())
    }
}

/// A single JSON object on disk, rewritten in full on every change.
///
/// Writes go to a sibling temp file which is then renamed over the
/// target, so a crash never leaves a half-written store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt file is logged and treated as empty.
    pub async fn open(path: impl Into<PathBuf>) -> PredictorResult<Self> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt store {}: {e}", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Opened store {} ({} keys)", path.display(), items.len());
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, items: &BTreeMap<String, Value>) -> PredictorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(items)
            .map_err(|e| PredictorError::Storage(format!("Serialization failed: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> PredictorResult<Option<Value>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> PredictorResult<()> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value);
        self.flush(&items).await
    }

    async fn clear(&self) -> PredictorResult<()> {
        let mut items = self.items.lock().await;
        items.clear();
        self.flush(&items).await
    }
}

/// Persisted stats blob.
///
/// The history tables are stored as JSON strings holding entry lists:
/// `visitedUrls = "[[url, count], ...]"` and
/// `navigationPatterns = "[[from, [[to, count], ...]], ...]"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsRecord {
    pub total_time_saved: u64,
    pub prefetched_pages: u64,
    pub successful_prefetches: u64,
    pub visited_urls: String,
    pub navigation_patterns: String,
}

impl StatsRecord {
    pub fn encode(stats: &Stats, history: &NavigationHistory) -> PredictorResult<Self> {
        Ok(Self {
            total_time_saved: stats.total_time_saved_ms,
            prefetched_pages: stats.total_prefetched,
            successful_prefetches: stats.total_successful,
            visited_urls: serde_json::to_string(&history.visit_entries())?,
            navigation_patterns: serde_json::to_string(&history.pattern_entries())?,
        })
    }

    /// Rebuild counters and history. Empty table strings read as empty
    /// tables; anything unparsable fails the whole record.
    pub fn decode(&self) -> PredictorResult<(Stats, NavigationHistory)> {
        let visits: VisitEntries = parse_table(&self.visited_urls)?;
        let patterns: PatternEntries = parse_table(&self.navigation_patterns)?;

        let stats = Stats {
            total_time_saved_ms: self.total_time_saved,
            total_prefetched: self.prefetched_pages,
            total_successful: self.successful_prefetches,
        };
        Ok((stats, NavigationHistory::from_entries(visits, patterns)))
    }

    /// The record written after a reset.
    pub fn empty() -> Self {
        Self {
            visited_urls: "[]".to_string(),
            navigation_patterns: "[]".to_string(),
            ..Self::default()
        }
    }
}

fn parse_table<T: serde::de::DeserializeOwned + Default>(raw: &str) -> PredictorResult<T> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Load settings, merging stored fields over defaults. When nothing is
/// stored the defaults are written back; a failed write is only logged.
pub async fn load_settings(store: &dyn KeyValueStore) -> PredictorResult<Settings> {
    match store.get(CONFIG_KEY).await? {
        Some(value) => match serde_json::from_value::<Settings>(value) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!("Stored config unreadable, using defaults: {e}");
                Ok(Settings::default())
            }
        },
        None => {
            let settings = Settings::default();
            match store.set(CONFIG_KEY, serde_json::to_value(&settings)?).await {
                Ok(()) => tracing::info!("No stored config, wrote defaults"),
                Err(e) => tracing::warn!("Failed to write default config: {e}"),
            }
            Ok(settings)
        }
    }
}

/// Load stats and history. Absent or corrupt data yields zeroed defaults;
/// when nothing is stored an empty record is written back.
pub async fn load_stats(store: &dyn KeyValueStore) -> PredictorResult<(Stats, NavigationHistory)> {
    let Some(value) = store.get(STATS_KEY).await? else {
        if let Err(e) = store
            .set(STATS_KEY, serde_json::to_value(StatsRecord::empty())?)
            .await
        {
            tracing::warn!("Failed to write empty stats: {e}");
        }
        return Ok((Stats::default(), NavigationHistory::new()));
    };

    let decoded = serde_json::from_value::<StatsRecord>(value)
        .map_err(PredictorError::from)
        .and_then(|record| record.decode());

    match decoded {
        Ok(loaded) => Ok(loaded),
        Err(e) => {
            tracing::warn!("Stored stats corrupt, starting from zero: {e}");
            Ok((Stats::default(), NavigationHistory::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrefetchLevel;
    use serde_json::json;

    fn sample() -> (Stats, NavigationHistory) {
        let mut history = NavigationHistory::new();
        history.record_transition("https://a.com/", "https://a.com/b");
        history.record_transition("https://a.com/", "https://a.com/c");
        history.record_transition("https://a.com/b", "https://a.com/c");
        let stats = Stats {
            total_time_saved_ms: 420,
            total_prefetched: 3,
            total_successful: 2,
        };
        (stats, history)
    }

    #[test]
    fn test_record_roundtrip() {
        let (stats, history) = sample();
        let record = StatsRecord::encode(&stats, &history).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["totalTimeSaved"], 420);
        assert!(json["visitedUrls"].is_string());

        let back: StatsRecord = serde_json::from_value(json).unwrap();
        let (stats2, history2) = back.decode().unwrap();
        assert_eq!(stats2, stats);
        assert_eq!(history2, history);
        assert_eq!(
            history2.predict("https://a.com/", PrefetchLevel::High),
            history.predict("https://a.com/", PrefetchLevel::High)
        );
    }

    #[test]
    fn test_entry_list_format() {
        let (stats, history) = sample();
        let record = StatsRecord::encode(&stats, &history).unwrap();
        let visits: Value = serde_json::from_str(&record.visited_urls).unwrap();
        assert_eq!(visits, json!([["https://a.com/b", 1], ["https://a.com/c", 2]]));
        let patterns: Value = serde_json::from_str(&record.navigation_patterns).unwrap();
        assert_eq!(
            patterns[0],
            json!(["https://a.com/", [["https://a.com/b", 1], ["https://a.com/c", 1]]])
        );
    }

    #[test]
    fn test_corrupt_table_fails_decode() {
        let record = StatsRecord {
            visited_urls: "{not json".into(),
            ..StatsRecord::default()
        };
        assert!(record.decode().is_err());
        assert!(StatsRecord::default().decode().is_ok());
    }

    #[tokio::test]
    async fn test_load_settings_writes_defaults_when_absent() {
        let store = MemoryStore::new();
        let settings = load_settings(&store).await.unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(store.get(CONFIG_KEY).await.unwrap().unwrap()["prefetchLevel"], "medium");
    }

    #[tokio::test]
    async fn test_load_settings_merges_partial_blob() {
        let store = MemoryStore::new();
        store
            .set(CONFIG_KEY, json!({"isActive": false, "blacklist": ["x.com"]}))
            .await
            .unwrap();
        let settings = load_settings(&store).await.unwrap();
        assert!(!settings.is_active);
        assert_eq!(settings.deny_list, vec!["x.com".to_string()]);
        assert_eq!(settings.prefetch_level, PrefetchLevel::Medium);
    }

    #[tokio::test]
    async fn test_corrupt_stats_load_as_zero() {
        let store = MemoryStore::new();
        store
            .set(STATS_KEY, json!({"totalTimeSaved": 10, "visitedUrls": "[[1,2,3"}))
            .await
            .unwrap();
        let (stats, history) = load_stats(&store).await.unwrap();
        assert_eq!(stats, Stats::default());
        assert!(history.is_empty());

        store.set(STATS_KEY, json!("garbage")).await.unwrap();
        let (stats, _) = load_stats(&store).await.unwrap();
        assert_eq!(stats, Stats::default());
    }

    /// Reads succeed, every write fails.
    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
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
    async fn test_failed_default_writes_still_load() {
        let settings = load_settings(&ReadOnlyStore).await.unwrap();
        assert_eq!(settings, Settings::default());
        let (stats, history) = load_stats(&ReadOnlyStore).await.unwrap();
        assert_eq!(stats, Stats::default());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_clear() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.items().await.is_empty());
    }
}
