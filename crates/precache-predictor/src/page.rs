//! Page session: the page-side half of the engine.
//!
//! A [`PageSession`] owns one page's [`LinkCollector`], turns raw DOM events
//! into link signals and decides when to report predictions. It never
//! schedules anything itself; the embedder feeds it events and calls
//! [`PageSession::tick`] with the current time, and forwards whatever
//! messages come back to the coordinator.

use std::collections::VecDeque;

use crate::collector::{is_prefetchable_href, LinkCollector, PageDom};
use crate::config::{AnalysisConfig, ScoringConfig};
use crate::messages::{
    InteractionRecord, InteractionSummary, Message, PageAnalysis, PageContext, PageRequest,
    SessionData,
};
use crate::scoring::score_links;
use crate::types::ScoredLink;

/// Analysis state for one loaded page.
pub struct PageSession {
    analysis: AnalysisConfig,
    scoring: ScoringConfig,
    url: String,
    collector: LinkCollector,
    loaded_at: u64,
    max_scroll_depth: f64,
    clicks: VecDeque<InteractionRecord>,
    hovers: VecDeque<InteractionRecord>,
    /// When the throttled scroll evaluation is due.
    scroll_due: Option<u64>,
    initial_report_sent: bool,
    /// Next dwell boundary (ms since load) that triggers a re-prediction.
    next_repredict_at: u64,
    unloaded: bool,
}

impl PageSession {
    pub fn new(analysis: AnalysisConfig, scoring: ScoringConfig) -> Self {
        let next_repredict_at = analysis.repredict_interval_ms;
        Self {
            collector: LinkCollector::new(analysis.clone()),
            analysis,
            scoring,
            url: String::new(),
            loaded_at: 0,
            max_scroll_depth: 0.0,
            clicks: VecDeque::new(),
            hovers: VecDeque::new(),
            scroll_due: None,
            initial_report_sent: false,
            next_repredict_at,
            unloaded: false,
        }
    }

    /// Initialise for a freshly loaded document: full link collection and
    /// a reset of all per-page counters.
    pub fn start(&mut self, dom: &dyn PageDom, now: u64) {
        self.collector.clear();
        self.url = dom.page_url();
        self.loaded_at = now;
        self.max_scroll_depth = 0.0;
        self.clicks.clear();
        self.hovers.clear();
        self.scroll_due = None;
        self.initial_report_sent = false;
        self.next_repredict_at = self.analysis.repredict_interval_ms;
        self.unloaded = false;

        let collected = self.collector.collect(dom, now, false);
        self.update_scroll_depth(dom);
        tracing::info!("Page analysis started for {} ({collected} links)", self.url);
    }

    /// Links were added to the document; track the new ones.
    pub fn on_dom_mutation(&mut self, dom: &dyn PageDom, now: u64) -> usize {
        let added = self.collector.collect(dom, now, true);
        if added > 0 {
            self.collector.refresh(dom);
        }
        added
    }

    /// Scroll event. Evaluation is throttled: the first event schedules
    /// it, later ones are absorbed until [`tick`](Self::tick) runs it.
    pub fn on_scroll(&mut self, now: u64) {
        if self.scroll_due.is_none() {
            self.scroll_due = Some(now + self.analysis.scroll_throttle_ms);
        }
    }

    /// Click on a link. Clicks on tracked links are recorded and escalated
    /// as an `importantPrediction`.
    pub fn on_click(&mut self, url: &str, now: u64) -> Option<Message> {
        let candidate = self.collector.record_click(url)?;
        push_bounded(
            &mut self.clicks,
            InteractionRecord {
                url: url.to_string(),
                timestamp: now,
                duration: None,
            },
            self.analysis.max_recorded_interactions,
        );

        Some(Message::ImportantPrediction {
            current_url: self.url.clone(),
            predicted_url: candidate.url,
            confidence: candidate.weight,
        })
    }

    pub fn on_mouse_over(&mut self, url: &str, now: u64) {
        if is_prefetchable_href(url, &self.url) {
            self.collector.hover_start(url, now);
        }
    }

    pub fn on_mouse_out(&mut self, url: &str) {
        self.collector.hover_end(url);
    }

    /// Advance timers to `now` and return any messages that became due.
    pub fn tick(&mut self, dom: &dyn PageDom, now: u64) -> Vec<Message> {
        if self.unloaded {
            return Vec::new();
        }

        if self.scroll_due.is_some_and(|due| due <= now) {
            self.scroll_due = None;
            self.update_scroll_depth(dom);
            self.collector.refresh(dom);
        }

        for url in self.collector.fire_due_hovers(now) {
            push_bounded(
                &mut self.hovers,
                InteractionRecord {
                    url,
                    timestamp: now,
                    duration: Some(self.analysis.hover_threshold_ms),
                },
                self.analysis.max_recorded_interactions,
            );
        }

        let mut out = Vec::new();
        let dwell = now.saturating_sub(self.loaded_at);

        let mut report = false;
        if !self.initial_report_sent && dwell >= self.analysis.initial_report_delay_ms {
            self.initial_report_sent = true;
            report = true;
        }
        let interval = self.analysis.repredict_interval_ms;
        if interval > 0 && dwell >= self.next_repredict_at {
            // Missed boundaries collapse into one report.
            self.next_repredict_at = (dwell / interval + 1) * interval;
            report = true;
        }

        if report {
            out.push(self.content_predictions(now));
        }
        out
    }

    /// Current ranked predictions.
    pub fn predictions(&self) -> Vec<ScoredLink> {
        score_links(self.collector.observations(), &self.scoring)
    }

    /// Build a `contentPredictions` message from the current state.
    pub fn content_predictions(&self, now: u64) -> Message {
        Message::ContentPredictions {
            current_url: self.url.clone(),
            predictions: self.predictions(),
            user_interactions: InteractionSummary {
                scroll_depth: self.max_scroll_depth,
                dwell_time: self.dwell_seconds(now),
            },
        }
    }

    /// Answer a `requestPageAnalysis` from the coordinator.
    pub fn respond(&self, request: &PageRequest, now: u64) -> PageAnalysis {
        match request {
            PageRequest::RequestPageAnalysis => self.analyze(now),
        }
    }

    pub fn analyze(&self, now: u64) -> PageAnalysis {
        let visible_link_count = self
            .collector
            .observations()
            .filter(|(_, obs)| obs.attached && obs.visible)
            .count();

        PageAnalysis {
            predictions: self.predictions(),
            context: PageContext {
                url: self.url.clone(),
                scroll_depth: self.max_scroll_depth,
                dwell_time: self.dwell_seconds(now),
                link_count: self.collector.len(),
                visible_link_count,
            },
        }
    }

    /// Page is going away. Cancels every hover timer, drops link state and
    /// returns the final `pageAnalytics` message.
    pub fn unload(&mut self, now: u64) -> Message {
        let message = Message::PageAnalytics {
            current_url: self.url.clone(),
            session_data: SessionData {
                duration: self.dwell_seconds(now),
                scroll_depth: self.max_scroll_depth,
                clicks: self.clicks.iter().cloned().collect(),
                hovers: self.hovers.iter().cloned().collect(),
            },
        };

        self.collector.cancel_all_hovers();
        self.collector.clear();
        self.scroll_due = None;
        self.unloaded = true;
        tracing::debug!("Page analysis stopped for {}", self.url);
        message
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scroll_depth(&self) -> f64 {
        self.max_scroll_depth
    }

    pub fn collector(&self) -> &LinkCollector {
        &self.collector
    }

    pub fn recent_clicks(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.clicks.iter()
    }

    pub fn recent_hovers(&self) -> impl Iterator<Item = &InteractionRecord> {
        self.hovers.iter()
    }

    fn dwell_seconds(&self, now: u64) -> f64 {
        now.saturating_sub(self.loaded_at) as f64 / 1000.0
    }

    fn update_scroll_depth(&mut self, dom: &dyn PageDom) {
        let document_height = dom.document_height();
        if document_height <= 0.0 {
            return;
        }
        let depth = ((dom.scroll_y() + dom.viewport().height) / document_height).min(1.0);
        if depth > self.max_scroll_depth {
            self.max_scroll_depth = depth;
        }
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}
