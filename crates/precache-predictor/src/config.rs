//! Tunables for page analysis, scoring, gating and outcome tracking.
//!
//! Every value has a default matching the shipped extension; hosts may
//! override individual fields.

use serde::{Deserialize, Serialize};

/// Freshness window after which a prefetch no longer counts as a hit.
pub const DEFAULT_FRESHNESS_WINDOW_MS: u64 = 30_000;

/// Confidence attached to a link the user just clicked.
pub const CLICK_CONFIDENCE: f64 = 0.9;

/// Page-side analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Fraction of a link's box that must be inside the viewport.
    pub visible_threshold: f64,
    /// Minimum gap between scroll-triggered re-evaluations.
    pub scroll_throttle_ms: u64,
    /// A hover must last this long to count.
    pub hover_threshold_ms: u64,
    /// Delay before the first prediction report after load.
    pub initial_report_delay_ms: u64,
    /// Dwell time between periodic re-predictions.
    pub repredict_interval_ms: u64,
    /// Recent clicks/hovers retained for page analytics.
    pub max_recorded_interactions: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            visible_threshold: 0.5,
            scroll_throttle_ms: 250,
            hover_threshold_ms: 300,
            initial_report_delay_ms: 5_000,
            repredict_interval_ms: 30_000,
            max_recorded_interactions: 10,
        }
    }
}

/// The five factor weights. They sum to 1.0 by convention only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub visibility: f64,
    pub position: f64,
    pub relative_size: f64,
    pub clicks: f64,
    pub hovers: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            visibility: 0.3,
            position: 0.2,
            relative_size: 0.1,
            clicks: 0.25,
            hovers: 0.15,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.visibility + self.position + self.relative_size + self.clicks + self.hovers
    }
}

/// Link scoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: FactorWeights,
    /// Distance from the vertical centre at which the position bonus hits zero.
    pub position_falloff: f64,
    /// Area fraction below which size contributes nothing.
    pub min_area_fraction: f64,
    /// Area fraction at which the size term saturates.
    pub saturating_area_fraction: f64,
    pub click_cap: u32,
    pub hover_cap: u32,
    pub keyword_bonus: f64,
    pub heading_bonus: f64,
    pub main_content_bonus: f64,
    pub max_links_to_report: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            position_falloff: 0.3,
            min_area_fraction: 0.005,
            saturating_area_fraction: 0.05,
            click_cap: 2,
            hover_cap: 3,
            keyword_bonus: 0.15,
            heading_bonus: 0.1,
            main_content_bonus: 0.1,
            max_links_to_report: 20,
        }
    }
}

/// Prefetch gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Battery level below which battery saving suppresses prefetching.
    pub low_battery_level: f64,
    /// Maximum prefetches in flight at once.
    pub max_in_flight: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            low_battery_level: 0.3,
            max_in_flight: 4,
        }
    }
}

/// Everything the coordinator and page sessions need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub analysis: AnalysisConfig,
    pub scoring: ScoringConfig,
    pub policy: PolicyConfig,
    pub freshness_window_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            scoring: ScoringConfig::default(),
            policy: PolicyConfig::default(),
            freshness_window_ms: DEFAULT_FRESHNESS_WINDOW_MS,
        }
    }
}
