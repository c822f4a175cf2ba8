//! Inter-context message protocol.
//!
//! Every message is a JSON object tagged by its `action` field with
//! camelCase payload fields, so the same values travel between page
//! sessions, the UI and the coordinator regardless of transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::StatsRecord;
use crate::types::{BatteryStatus, NetworkStatus, ScoredLink, Settings};

/// Browser tab identifier.
pub type TabId = u64;

/// Engagement summary sent with each batch of content predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InteractionSummary {
    /// Deepest scroll position reached, in `[0, 1]`.
    pub scroll_depth: f64,
    /// Seconds since the page loaded.
    pub dwell_time: f64,
}

/// One recorded click or hover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub url: String,
    pub timestamp: u64,
    /// Hover duration in ms; absent for clicks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Per-page analytics sent on unload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionData {
    /// Seconds between load and unload.
    pub duration: f64,
    pub scroll_depth: f64,
    pub clicks: Vec<InteractionRecord>,
    pub hovers: Vec<InteractionRecord>,
}

/// Full persisted state, as produced by `exportData` and consumed by
/// `importData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportedData {
    pub config: Settings,
    pub stats: StatsRecord,
}

/// Messages handled by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    // Page -> coordinator
    #[serde(rename_all = "camelCase")]
    ContentPredictions {
        current_url: String,
        #[serde(default)]
        predictions: Vec<ScoredLink>,
        #[serde(default)]
        user_interactions: InteractionSummary,
    },
    #[serde(rename_all = "camelCase")]
    ImportantPrediction {
        current_url: String,
        predicted_url: String,
        confidence: f64,
    },
    #[serde(rename_all = "camelCase")]
    PageAnalytics {
        current_url: String,
        #[serde(default)]
        session_data: SessionData,
    },
    #[serde(rename_all = "camelCase")]
    NavigationPattern {
        #[serde(default)]
        pattern: Value,
        from_url: String,
        to_url: String,
    },
    #[serde(rename_all = "camelCase")]
    VisitContext {
        current_url: String,
        #[serde(default)]
        context: Value,
    },

    // UI -> coordinator
    #[serde(rename_all = "camelCase")]
    ToggleActive { is_active: bool },
    GetStats,
    ConfigUpdated { config: Settings },
    ResetStats,
    ResetAll,
    ExportData,
    ImportData { data: ExportedData },

    // Environment -> coordinator
    BatteryStatus(BatteryStatus),
    NetworkStatus(NetworkStatus),
    #[serde(rename_all = "camelCase")]
    TabUpdated { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
}

impl Message {
    /// The wire `action` name.
    pub fn action(&self) -> &'static str {
        match self {
            Message::ContentPredictions { .. } => "contentPredictions",
            Message::ImportantPrediction { .. } => "importantPrediction",
            Message::PageAnalytics { .. } => "pageAnalytics",
            Message::NavigationPattern { .. } => "navigationPattern",
            Message::VisitContext { .. } => "visitContext",
            Message::ToggleActive { .. } => "toggleActive",
            Message::GetStats => "getStats",
            Message::ConfigUpdated { .. } => "configUpdated",
            Message::ResetStats => "resetStats",
            Message::ResetAll => "resetAll",
            Message::ExportData => "exportData",
            Message::ImportData { .. } => "importData",
            Message::BatteryStatus(_) => "batteryStatus",
            Message::NetworkStatus(_) => "networkStatus",
            Message::TabUpdated { .. } => "tabUpdated",
            Message::TabRemoved { .. } => "tabRemoved",
        }
    }

    /// All action names the coordinator understands.
    pub const ACTIONS: &'static [&'static str] = &[
        "contentPredictions",
        "importantPrediction",
        "pageAnalytics",
        "navigationPattern",
        "visitContext",
        "toggleActive",
        "getStats",
        "configUpdated",
        "resetStats",
        "resetAll",
        "exportData",
        "importData",
        "batteryStatus",
        "networkStatus",
        "tabUpdated",
        "tabRemoved",
    ];
}

/// Coordinator -> page requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageRequest {
    RequestPageAnalysis,
}

/// Page context attached to a `requestPageAnalysis` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub url: String,
    pub scroll_depth: f64,
    pub dwell_time: f64,
    pub link_count: usize,
    pub visible_link_count: usize,
}

/// Response to `requestPageAnalysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub predictions: Vec<ScoredLink>,
    pub context: PageContext,
}
