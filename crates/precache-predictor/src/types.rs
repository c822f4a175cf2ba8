//! Core data types shared by the history store, scoring engine, policy gate
//! and outcome tracker.

use serde::{Deserialize, Serialize};

/// A URL proposed for prefetching, with a weight in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchCandidate {
    pub url: String,
    pub weight: f64,
}

impl PrefetchCandidate {
    /// Build a candidate, clamping the weight into `[0, 1]`.
    pub fn new(url: impl Into<String>, weight: f64) -> Self {
        let weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        Self {
            url: url.into(),
            weight,
        }
    }
}

/// A link with its raw, unclamped score from the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLink {
    pub url: String,
    #[serde(alias = "weight", alias = "confidence")]
    pub score: f64,
}

impl From<ScoredLink> for PrefetchCandidate {
    fn from(link: ScoredLink) -> Self {
        PrefetchCandidate::new(link.url, link.score)
    }
}

/// How many candidates a single prediction may yield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PrefetchLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl PrefetchLevel {
    /// Candidate cap for this level.
    pub fn max_candidates(self) -> usize {
        match self {
            PrefetchLevel::Low => 1,
            PrefetchLevel::Medium => 3,
            PrefetchLevel::High => 5,
        }
    }
}

impl From<String> for PrefetchLevel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "low" => PrefetchLevel::Low,
            "high" => PrefetchLevel::High,
            _ => PrefetchLevel::Medium,
        }
    }
}

/// User-facing settings, stored under the `config` key.
///
/// Missing fields fall back to their defaults so older or partial blobs
/// still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub is_active: bool,
    pub prefetch_level: PrefetchLevel,
    pub battery_saving: bool,
    pub data_saver: bool,
    /// Hostname substrings; when non-empty, a host must match one of them.
    #[serde(rename = "whitelist")]
    pub allow_list: Vec<String>,
    /// Hostname substrings that are never prefetched.
    #[serde(rename = "blacklist")]
    pub deny_list: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_active: true,
            prefetch_level: PrefetchLevel::Medium,
            battery_saving: false,
            data_saver: false,
            allow_list: Vec::new(),
            deny_list: Vec::new(),
        }
    }
}

/// Aggregate prefetch outcome counters. Never decrease except on reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_time_saved_ms: u64,
    pub total_prefetched: u64,
    pub total_successful: u64,
}

impl Stats {
    /// Hit rate in whole percent, 0 when nothing has been prefetched.
    pub fn hit_rate_percent(&self) -> u32 {
        if self.total_prefetched == 0 {
            return 0;
        }
        let rate = self.total_successful as f64 / self.total_prefetched as f64 * 100.0;
        rate.round() as u32
    }

    /// Read-only view handed to the UI layer.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_time_saved: self.total_time_saved_ms,
            prefetched_pages: self.total_prefetched,
            successful_prefetches: self.total_successful,
            hit_rate: self.hit_rate_percent(),
        }
    }
}

/// The `getStats` response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_time_saved: u64,
    pub prefetched_pages: u64,
    pub successful_prefetches: u64,
    pub hit_rate: u32,
}

/// A completed prefetch waiting to be matched against a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPrefetch {
    pub issued_at_ms: u64,
    pub load_time_ms: u64,
}

/// Battery state as reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub charging: bool,
    /// Charge level in `[0, 1]`.
    pub level: f64,
}

/// Connection type as reported by the host environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum NetworkType {
    Cellular,
    Wifi,
    Ethernet,
    #[default]
    Unknown,
}

impl From<String> for NetworkType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cellular" => NetworkType::Cellular,
            "wifi" => NetworkType::Wifi,
            "ethernet" => NetworkType::Ethernet,
            _ => NetworkType::Unknown,
        }
    }
}

/// Network state as reported by the host environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub save_data: bool,
}

/// Session-scoped device conditions consumed by the policy gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    /// `None` when the environment exposes no battery information.
    pub battery: Option<BatteryStatus>,
    pub network: NetworkStatus,
}

/// Normalize a URL to `origin + path`, dropping query and fragment.
///
/// Unparsable URLs and URLs with an opaque origin are returned unchanged.
pub fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            let origin = parsed.origin();
            if !origin.is_tuple() {
                return raw.to_string();
            }
            format!("{}{}", origin.ascii_serialization(), parsed.path())
        }
        Err(e) => {
            tracing::debug!("Keeping raw key for unparsable URL {raw:?}: {e}");
            raw.to_string()
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Errors that can occur in the prediction engine.
#[derive(thiserror::Error, Debug)]
pub enum PredictorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Coordinator channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for PredictorError {
    fn from(e: reqwest::Error) -> Self {
        PredictorError::Fetch(e.to_string())
    }
}

/// Convenience result type.
pub type PredictorResult<T> = Result<T, PredictorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize_url("https://Example.com:443/a/b?x=1#top"),
            "https://example.com/a/b"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/"),
            "http://example.com:8080/"
        );
    }

    #[test]
    fn test_normalize_falls_back_to_raw() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(normalize_url("data:text/plain,hi"), "data:text/plain,hi");
    }

    #[test]
    fn test_settings_merge_defaults() {
        let s: Settings = serde_json::from_str(r#"{"prefetchLevel":"high"}"#).unwrap();
        assert!(s.is_active);
        assert_eq!(s.prefetch_level, PrefetchLevel::High);
        assert!(s.allow_list.is_empty());

        let s: Settings =
            serde_json::from_str(r#"{"prefetchLevel":"turbo","whitelist":["a.com"]}"#).unwrap();
        assert_eq!(s.prefetch_level, PrefetchLevel::Medium);
        assert_eq!(s.allow_list, vec!["a.com".to_string()]);
    }

    #[test]
    fn test_settings_wire_names() {
        let v = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(v["isActive"], true);
        assert_eq!(v["prefetchLevel"], "medium");
        assert!(v["whitelist"].is_array());
        assert!(v["blacklist"].is_array());
    }

    #[test]
    fn test_candidate_weight_clamped() {
        assert_eq!(PrefetchCandidate::new("u", 1.7).weight, 1.0);
        assert_eq!(PrefetchCandidate::new("u", -0.2).weight, 0.0);
        assert_eq!(PrefetchCandidate::new("u", f64::NAN).weight, 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = Stats::default();
        assert_eq!(stats.hit_rate_percent(), 0);
        stats.total_prefetched = 3;
        stats.total_successful = 2;
        assert_eq!(stats.hit_rate_percent(), 67);
    }

    #[test]
    fn test_network_type_from_string() {
        let n: NetworkStatus = serde_json::from_str(r#"{"type":"CELLULAR"}"#).unwrap();
        assert_eq!(n.network_type, NetworkType::Cellular);
        let n: NetworkStatus = serde_json::from_str(r#"{"type":"bluetooth","saveData":true}"#).unwrap();
        assert_eq!(n.network_type, NetworkType::Unknown);
        assert!(n.save_data);
    }
}
