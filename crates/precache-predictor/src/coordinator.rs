//! Coordinator state machine.
//!
//! [`CoordinatorState::handle`] is a pure dispatch table: it applies one
//! event to the owned state and returns the side effects to perform. It
//! never awaits, so every read-modify-write finishes before the next event
//! is looked at. The async [`crate::runner::Coordinator`] executes effects.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::config::PredictorConfig;
use crate::history::NavigationHistory;
use crate::messages::{ExportedData, Message, TabId};
use crate::outcome::{Outcome, PrefetchLedger};
use crate::policy::PolicyGate;
use crate::storage::StatsRecord;
use crate::types::{DeviceStatus, PrefetchCandidate, Settings, Stats};

/// Input to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(Message),
    PrefetchCompleted {
        url: String,
        issued_at_ms: u64,
        load_time_ms: u64,
    },
    PrefetchFailed {
        url: String,
        error: String,
    },
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        Event::Message(message)
    }
}

/// Work the runner performs on the coordinator's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch { url: String },
    PersistStats(StatsRecord),
    PersistSettings(Settings),
    /// Wipe the store before the persist effects that follow.
    ClearStore,
    Reply(Value),
}

/// Everything the coordinator owns.
pub struct CoordinatorState {
    config: PredictorConfig,
    gate: PolicyGate,
    settings: Settings,
    stats: Stats,
    history: NavigationHistory,
    ledger: PrefetchLedger,
    device: DeviceStatus,
    tab_urls: HashMap<TabId, String>,
}

impl CoordinatorState {
    pub fn new(
        config: PredictorConfig,
        settings: Settings,
        stats: Stats,
        history: NavigationHistory,
    ) -> Self {
        Self {
            gate: PolicyGate::new(config.policy.clone()),
            config,
            settings,
            stats,
            history,
            ledger: PrefetchLedger::new(),
            device: DeviceStatus::default(),
            tab_urls: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    pub fn ledger(&self) -> &PrefetchLedger {
        &self.ledger
    }

    pub fn device(&self) -> &DeviceStatus {
        &self.device
    }

    pub fn tab_url(&self, tab_id: TabId) -> Option<&str> {
        self.tab_urls.get(&tab_id).map(String::as_str)
    }

    /// Current stats and history in persisted form.
    pub fn stats_record(&self) -> Option<StatsRecord> {
        match StatsRecord::encode(&self.stats, &self.history) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Failed to encode stats: {e}");
                None
            }
        }
    }

    /// Apply one event.
    pub fn handle(&mut self, event: Event, now_ms: u64) -> Vec<Effect> {
        match event {
            Event::Message(message) => self.handle_message(message, now_ms),
            Event::PrefetchCompleted {
                url,
                issued_at_ms,
                load_time_ms,
            } => {
                self.ledger
                    .record_completed(&url, issued_at_ms, load_time_ms, &mut self.stats);
                tracing::info!("Prefetched {url} in {load_time_ms}ms");
                self.persist_stats().into_iter().collect()
            }
            Event::PrefetchFailed { url, error } => {
                self.ledger.record_failed(&url);
                tracing::warn!("Prefetch of {url} failed: {error}");
                Vec::new()
            }
        }
    }

    fn handle_message(&mut self, message: Message, now_ms: u64) -> Vec<Effect> {
        tracing::debug!("Handling {}", message.action());

        match message {
            Message::ContentPredictions {
                current_url,
                predictions,
                user_interactions,
            } => {
                let cap = self.settings.prefetch_level.max_candidates();
                let candidates: Vec<PrefetchCandidate> = predictions
                    .into_iter()
                    .take(cap)
                    .map(PrefetchCandidate::from)
                    .collect();
                tracing::debug!(
                    "{} content prediction(s) for {current_url} (scroll {:.2}, dwell {:.0}s)",
                    candidates.len(),
                    user_interactions.scroll_depth,
                    user_interactions.dwell_time
                );
                self.prefetch(&candidates)
            }

            Message::ImportantPrediction {
                current_url,
                predicted_url,
                confidence,
            } => {
                tracing::debug!("Important prediction from {current_url}: {predicted_url}");
                self.prefetch(&[PrefetchCandidate::new(predicted_url, confidence)])
            }

            Message::PageAnalytics {
                current_url,
                session_data,
            } => {
                tracing::debug!(
                    "Page analytics for {current_url}: {:.1}s, scroll {:.2}, {} click(s), {} hover(s)",
                    session_data.duration,
                    session_data.scroll_depth,
                    session_data.clicks.len(),
                    session_data.hovers.len()
                );
                Vec::new()
            }

            // Edges are only learned from tab navigations.
            Message::NavigationPattern {
                from_url, to_url, ..
            } => {
                tracing::debug!("Page reported navigation {from_url} -> {to_url}");
                Vec::new()
            }

            Message::VisitContext {
                current_url,
                context,
            } => {
                tracing::debug!("Visit context for {current_url}: {context}");
                Vec::new()
            }

            Message::ToggleActive { is_active } => {
                self.settings.is_active = is_active;
                tracing::info!("Prefetching {}", if is_active { "enabled" } else { "disabled" });
                vec![Effect::PersistSettings(self.settings.clone()), success()]
            }

            Message::GetStats => {
                let snapshot = self.stats.snapshot();
                vec![Effect::Reply(json!(snapshot))]
            }

            Message::ConfigUpdated { config } => {
                self.settings = config;
                tracing::info!("Settings updated (level {:?})", self.settings.prefetch_level);
                vec![Effect::PersistSettings(self.settings.clone()), success()]
            }

            Message::ResetStats => {
                self.stats = Stats::default();
                self.history.clear();
                tracing::info!("Statistics reset");
                vec![Effect::PersistStats(StatsRecord::empty()), success()]
            }

            Message::ResetAll => {
                self.settings = Settings::default();
                self.stats = Stats::default();
                self.history.clear();
                self.ledger.clear();
                tracing::info!("All data reset");
                vec![
                    Effect::ClearStore,
                    Effect::PersistSettings(self.settings.clone()),
                    Effect::PersistStats(StatsRecord::empty()),
                    success(),
                ]
            }

            Message::ExportData => match self.stats_record() {
                Some(stats) => {
                    let data = ExportedData {
                        config: self.settings.clone(),
                        stats,
                    };
                    vec![Effect::Reply(json!(data))]
                }
                None => vec![failure("stats could not be encoded")],
            },

            Message::ImportData { data } => match data.stats.decode() {
                Ok((stats, history)) => {
                    self.settings = data.config;
                    self.stats = stats;
                    self.history = history;
                    tracing::info!("Imported data ({} source page(s))", self.history.source_count());
                    vec![
                        Effect::ClearStore,
                        Effect::PersistSettings(self.settings.clone()),
                        Effect::PersistStats(data.stats),
                        success(),
                    ]
                }
                Err(e) => {
                    tracing::warn!("Rejected import: {e}");
                    vec![failure(&e.to_string())]
                }
            },

            Message::BatteryStatus(battery) => {
                self.device.battery = Some(battery);
                if self.gate.battery_blocks(&self.settings, &self.device) {
                    tracing::info!("Battery low, prefetching is restricted");
                }
                Vec::new()
            }

            Message::NetworkStatus(network) => {
                self.device.network = network;
                if self.gate.data_saver_blocks(&self.settings, &self.device) {
                    tracing::info!("Data saver on cellular, prefetching is restricted");
                }
                Vec::new()
            }

            Message::TabUpdated { tab_id, url } => self.on_tab_updated(tab_id, url, now_ms),

            Message::TabRemoved { tab_id } => {
                self.tab_urls.remove(&tab_id);
                Vec::new()
            }
        }
    }

    /// A tab finished loading `url`.
    fn on_tab_updated(&mut self, tab_id: TabId, url: String, now_ms: u64) -> Vec<Effect> {
        let window = self.config.freshness_window_ms;
        let mut stats_changed = false;

        if let Some(previous) = self.tab_urls.get(&tab_id) {
            if *previous != url {
                stats_changed |= self.history.record_transition(previous, &url);

                match self.ledger.on_navigation(&url, now_ms, window, &mut self.stats) {
                    Outcome::Hit { time_saved_ms } => {
                        tracing::info!("Prefetch hit for {url}, saved {time_saved_ms}ms");
                        stats_changed = true;
                    }
                    Outcome::Expired => tracing::debug!("Prefetch for {url} expired"),
                    Outcome::None => {}
                }
            }
        }

        let swept = self.ledger.sweep_expired(now_ms, window);
        if swept > 0 {
            tracing::debug!("Dropped {swept} stale pending prefetch(es)");
        }

        self.tab_urls.insert(tab_id, url.clone());

        let mut effects: Vec<Effect> = Vec::new();
        if stats_changed {
            effects.extend(self.persist_stats());
        }
        if self.settings.is_active {
            let predicted = self.history.predict(&url, self.settings.prefetch_level);
            if !predicted.is_empty() {
                effects.extend(self.prefetch(&predicted));
            }
        }
        effects
    }

    /// Gate `candidates` and mark the admitted ones in flight.
    fn prefetch(&mut self, candidates: &[PrefetchCandidate]) -> Vec<Effect> {
        let decision = self
            .gate
            .decide(&self.settings, &self.device, &self.ledger, candidates);

        decision
            .admitted
            .into_iter()
            .map(|candidate| {
                self.ledger.mark_in_flight(&candidate.url);
                Effect::Fetch { url: candidate.url }
            })
            .collect()
    }

    fn persist_stats(&self) -> Option<Effect> {
        self.stats_record().map(Effect::PersistStats)
    }
}

fn success() -> Effect {
    Effect::Reply(json!({ "success": true }))
}

fn failure(error: &str) -> Effect {
    Effect::Reply(json!({ "success": false, "error": error }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::InteractionSummary;
    use crate::types::{BatteryStatus, PrefetchLevel, ScoredLink};

    fn state() -> CoordinatorState {
        CoordinatorState::new(
            PredictorConfig::default(),
            Settings::default(),
            Stats::default(),
            NavigationHistory::new(),
        )
    }

    fn tab(state: &mut CoordinatorState, url: &str, now: u64) -> Vec<Effect> {
        state.handle(
            Message::TabUpdated {
                tab_id: 1,
                url: url.to_string(),
            }
            .into(),
            now,
        )
    }

    fn fetched(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Fetch { url } => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    fn reply(effects: &[Effect]) -> &Value {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Reply(v) => Some(v),
                _ => None,
            })
            .expect("reply effect")
    }

    #[test]
    fn test_tab_navigation_learns_and_prefetches() {
        let mut s = state();
        assert!(tab(&mut s, "https://a.com/", 0).is_empty());
        let effects = tab(&mut s, "https://a.com/b", 100);
        assert!(matches!(effects[0], Effect::PersistStats(_)));
        assert_eq!(s.history().edge_count("https://a.com/", "https://a.com/b"), 1);

        // Returning to the source page predicts /b.
        let effects = tab(&mut s, "https://a.com/", 200);
        assert_eq!(fetched(&effects), vec!["https://a.com/b"]);
        assert!(s.ledger().is_in_flight("https://a.com/b"));

        // No duplicate fetch while in flight.
        let effects = tab(&mut s, "https://a.com/", 300);
        assert!(fetched(&effects).is_empty());
    }

    #[test]
    fn test_hit_after_completed_prefetch() {
        let mut s = state();
        tab(&mut s, "https://a.com/", 0);
        tab(&mut s, "https://a.com/b", 1_000);
        tab(&mut s, "https://a.com/", 2_000);

        let effects = s.handle(
            Event::PrefetchCompleted {
                url: "https://a.com/b".into(),
                issued_at_ms: 2_000,
                load_time_ms: 350,
            },
            2_400,
        );
        assert!(matches!(effects[0], Effect::PersistStats(ref r) if r.prefetched_pages == 1));

        tab(&mut s, "https://a.com/b", 12_000);
        assert_eq!(s.stats().total_successful, 1);
        assert_eq!(s.stats().total_time_saved_ms, 350);
        assert!(s.ledger().pending("https://a.com/b").is_none());
    }

    #[test]
    fn test_late_navigation_is_not_a_hit() {
        let mut s = state();
        s.handle(
            Event::PrefetchCompleted {
                url: "https://a.com/b".into(),
                issued_at_ms: 0,
                load_time_ms: 350,
            },
            100,
        );
        tab(&mut s, "https://a.com/", 1_000);
        tab(&mut s, "https://a.com/b", 40_000);
        assert_eq!(s.stats().total_successful, 0);
        assert!(s.ledger().pending("https://a.com/b").is_none());
    }

    #[test]
    fn test_stale_entries_swept_on_navigation() {
        let mut s = state();
        s.handle(
            Event::PrefetchCompleted {
                url: "https://a.com/never".into(),
                issued_at_ms: 0,
                load_time_ms: 10,
            },
            0,
        );
        tab(&mut s, "https://a.com/", 31_000);
        assert_eq!(s.ledger().pending_count(), 0);
    }

    #[test]
    fn test_tab_removal_forgets_previous_url() {
        let mut s = state();
        tab(&mut s, "https://a.com/", 0);
        s.handle(Message::TabRemoved { tab_id: 1 }.into(), 10);
        assert!(s.tab_url(1).is_none());
        tab(&mut s, "https://a.com/b", 20);
        assert_eq!(s.history().edge_count("https://a.com/", "https://a.com/b"), 0);
    }

    #[test]
    fn test_content_predictions_capped_by_level() {
        let mut s = state();
        s.handle(
            Message::ConfigUpdated {
                config: Settings {
                    prefetch_level: PrefetchLevel::Low,
                    ..Settings::default()
                },
            }
            .into(),
            0,
        );
        let effects = s.handle(
            Message::ContentPredictions {
                current_url: "https://a.com/".into(),
                predictions: vec![
                    ScoredLink {
                        url: "https://a.com/1".into(),
                        score: 1.4,
                    },
                    ScoredLink {
                        url: "https://a.com/2".into(),
                        score: 0.6,
                    },
                ],
                user_interactions: InteractionSummary::default(),
            }
            .into(),
            10,
        );
        assert_eq!(fetched(&effects), vec!["https://a.com/1"]);
    }

    #[test]
    fn test_important_prediction_respects_battery_gate() {
        let mut s = state();
        s.handle(
            Message::ConfigUpdated {
                config: Settings {
                    battery_saving: true,
                    ..Settings::default()
                },
            }
            .into(),
            0,
        );
        s.handle(
            Message::BatteryStatus(BatteryStatus {
                charging: false,
                level: 0.2,
            })
            .into(),
            0,
        );
        let important = Message::ImportantPrediction {
            current_url: "https://a.com/".into(),
            predicted_url: "https://a.com/next".into(),
            confidence: 0.9,
        };
        assert!(fetched(&s.handle(important.clone().into(), 10)).is_empty());

        s.handle(
            Message::BatteryStatus(BatteryStatus {
                charging: true,
                level: 0.2,
            })
            .into(),
            20,
        );
        assert_eq!(fetched(&s.handle(important.into(), 30)), vec!["https://a.com/next"]);
    }

    #[test]
    fn test_toggle_and_get_stats() {
        let mut s = state();
        let effects = s.handle(Message::ToggleActive { is_active: false }.into(), 0);
        assert_eq!(reply(&effects)["success"], true);
        assert!(matches!(effects[0], Effect::PersistSettings(ref st) if !st.is_active));

        tab(&mut s, "https://a.com/", 0);
        tab(&mut s, "https://a.com/b", 1);
        assert!(fetched(&tab(&mut s, "https://a.com/", 2)).is_empty());

        let effects = s.handle(Message::GetStats.into(), 3);
        let v = reply(&effects);
        assert_eq!(v["totalTimeSaved"], 0);
        assert_eq!(v["prefetchedPages"], 0);
        assert_eq!(v["successfulPrefetches"], 0);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut s = state();
        tab(&mut s, "https://a.com/", 0);
        tab(&mut s, "https://a.com/b", 1);
        tab(&mut s, "https://a.com/c", 2);

        let exported = reply(&s.handle(Message::ExportData.into(), 3)).clone();
        let data: ExportedData = serde_json::from_value(exported).unwrap();

        let mut fresh = state();
        let effects = fresh.handle(Message::ImportData { data }.into(), 4);
        assert_eq!(effects[0], Effect::ClearStore);
        assert_eq!(fresh.history(), s.history());
        assert_eq!(fresh.stats(), s.stats());
    }

    #[test]
    fn test_corrupt_import_leaves_state_untouched() {
        let mut s = state();
        tab(&mut s, "https://a.com/", 0);
        tab(&mut s, "https://a.com/b", 1);

        let data = ExportedData {
            config: Settings::default(),
            stats: StatsRecord {
                navigation_patterns: "oops".into(),
                ..StatsRecord::default()
            },
        };
        let effects = s.handle(Message::ImportData { data }.into(), 2);
        assert_eq!(reply(&effects)["success"], false);
        assert_eq!(s.history().edge_count("https://a.com/", "https://a.com/b"), 1);
    }

    #[test]
    fn test_reset_stats_clears_history() {
        let mut s = state();
        tab(&mut s, "https://a.com/", 0);
        tab(&mut s, "https://a.com/b", 1);
        let effects = s.handle(Message::ResetStats.into(), 2);
        assert!(s.history().is_empty());
        assert_eq!(effects[0], Effect::PersistStats(StatsRecord::empty()));
    }

    #[test]
    fn test_navigation_pattern_does_not_double_count() {
        let mut s = state();
        tab(&mut s, "https://a.com/x", 0);
        let effects = s.handle(
            Message::NavigationPattern {
                pattern: Value::Null,
                from_url: "https://a.com/x".into(),
                to_url: "https://a.com/y".into(),
            }
            .into(),
            1,
        );
        assert!(effects.is_empty());
        assert_eq!(s.history().edge_count("https://a.com/x", "https://a.com/y"), 0);

        tab(&mut s, "https://a.com/y", 2);
        assert_eq!(s.history().edge_count("https://a.com/x", "https://a.com/y"), 1);
        assert_eq!(s.history().visit_count("https://a.com/y"), 1);
    }

    #[test]
    fn test_failed_prefetch_can_retry() {
        let mut s = state();
        let important = Message::ImportantPrediction {
            current_url: "https://a.com/".into(),
            predicted_url: "https://a.com/next".into(),
            confidence: 0.9,
        };
        assert_eq!(fetched(&s.handle(important.clone().into(), 0)).len(), 1);
        s.handle(
            Event::PrefetchFailed {
                url: "https://a.com/next".into(),
                error: "boom".into(),
            },
            5,
        );
        assert_eq!(fetched(&s.handle(important.into(), 10)).len(), 1);
    }
}
