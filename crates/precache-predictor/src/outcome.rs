//! Prefetch ledger and outcome tracking.
//!
//! Every prefetch moves `in flight -> pending -> (hit | expired)`. The
//! ledger is session scoped and never persisted; only the stats it feeds
//! survive a restart.

use std::collections::{HashMap, HashSet};

use crate::types::{PendingPrefetch, Stats};

/// Terminal state of a pending prefetch, or `None` when the navigation
/// target was never prefetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Navigated within the freshness window; carries the time saved.
    Hit { time_saved_ms: u64 },
    /// Navigated after the window closed.
    Expired,
    None,
}

/// Session-scoped record of issued, completed and pending prefetches.
#[derive(Debug, Clone, Default)]
pub struct PrefetchLedger {
    prefetched: HashSet<String>,
    in_flight: HashSet<String>,
    pending: HashMap<String, PendingPrefetch>,
}

impl PrefetchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `url` was successfully prefetched this session.
    pub fn was_prefetched(&self, url: &str) -> bool {
        self.prefetched.contains(url)
    }

    pub fn is_in_flight(&self, url: &str) -> bool {
        self.in_flight.contains(url)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending(&self, url: &str) -> Option<&PendingPrefetch> {
        self.pending.get(url)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// A fetch for `url` has been issued.
    pub fn mark_in_flight(&mut self, url: &str) {
        self.in_flight.insert(url.to_string());
    }

    /// The fetch for `url` completed. Records the pending entry and counts
    /// the prefetch.
    pub fn record_completed(
        &mut self,
        url: &str,
        issued_at_ms: u64,
        load_time_ms: u64,
        stats: &mut Stats,
    ) {
        self.in_flight.remove(url);
        self.prefetched.insert(url.to_string());
        self.pending.insert(
            url.to_string(),
            PendingPrefetch {
                issued_at_ms,
                load_time_ms,
            },
        );
        stats.total_prefetched += 1;
    }

    /// The fetch for `url` failed. The URL may be tried again later.
    pub fn record_failed(&mut self, url: &str) {
        self.in_flight.remove(url);
    }

    /// Resolve a confirmed navigation to `url`. The pending entry is
    /// consumed whatever the outcome.
    pub fn on_navigation(
        &mut self,
        url: &str,
        now_ms: u64,
        window_ms: u64,
        stats: &mut Stats,
    ) -> Outcome {
        let Some(entry) = self.pending.remove(url) else {
            return Outcome::None;
        };

        let elapsed = now_ms.saturating_sub(entry.issued_at_ms);
        if elapsed < window_ms {
            stats.total_successful += 1;
            stats.total_time_saved_ms += entry.load_time_ms;
            Outcome::Hit {
                time_saved_ms: entry.load_time_ms,
            }
        } else {
            Outcome::Expired
        }
    }

    /// Drop pending entries whose window has closed. Returns how many were
    /// removed.
    pub fn sweep_expired(&mut self, now_ms: u64, window_ms: u64) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, p| now_ms.saturating_sub(p.issued_at_ms) < window_ms);
        before - self.pending.len()
    }

    /// Forget everything (full reset).
    pub fn clear(&mut self) {
        self.prefetched.clear();
        self.in_flight.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 30_000;

    fn completed(url: &str, at: u64, load: u64) -> (PrefetchLedger, Stats) {
        let mut ledger = PrefetchLedger::new();
        let mut stats = Stats::default();
        ledger.mark_in_flight(url);
        ledger.record_completed(url, at, load, &mut stats);
        (ledger, stats)
    }

    #[test]
    fn test_completion_moves_to_pending() {
        let (ledger, stats) = completed("https://a.com/b", 1_000, 250);
        assert!(!ledger.is_in_flight("https://a.com/b"));
        assert!(ledger.was_prefetched("https://a.com/b"));
        assert_eq!(ledger.pending("https://a.com/b").unwrap().load_time_ms, 250);
        assert_eq!(stats.total_prefetched, 1);
    }

    #[test]
    fn test_hit_within_window() {
        let (mut ledger, mut stats) = completed("https://a.com/b", 1_000, 250);
        let outcome = ledger.on_navigation("https://a.com/b", 11_000, WINDOW, &mut stats);
        assert_eq!(outcome, Outcome::Hit { time_saved_ms: 250 });
        assert_eq!(stats.total_successful, 1);
        assert_eq!(stats.total_time_saved_ms, 250);
        assert!(ledger.pending("https://a.com/b").is_none());
    }

    #[test]
    fn test_late_navigation_expires_and_consumes() {
        let (mut ledger, mut stats) = completed("https://a.com/b", 1_000, 250);
        let outcome = ledger.on_navigation("https://a.com/b", 41_000, WINDOW, &mut stats);
        assert_eq!(outcome, Outcome::Expired);
        assert_eq!(stats.total_successful, 0);
        assert_eq!(stats.total_time_saved_ms, 0);
        assert!(ledger.pending("https://a.com/b").is_none());
        // Single use: a second visit is not a hit either.
        assert_eq!(
            ledger.on_navigation("https://a.com/b", 41_500, WINDOW, &mut stats),
            Outcome::None
        );
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let (mut ledger, mut stats) = completed("https://a.com/b", 0, 10);
        assert_eq!(
            ledger.on_navigation("https://a.com/b", WINDOW, WINDOW, &mut stats),
            Outcome::Expired
        );
    }

    #[test]
    fn test_sweep_removes_stale_entries() {
        let mut ledger = PrefetchLedger::new();
        let mut stats = Stats::default();
        ledger.record_completed("https://a.com/old", 0, 10, &mut stats);
        ledger.record_completed("https://a.com/new", 25_000, 10, &mut stats);

        assert_eq!(ledger.sweep_expired(35_000, WINDOW), 1);
        assert!(ledger.pending("https://a.com/old").is_none());
        assert!(ledger.pending("https://a.com/new").is_some());
        // Still remembered as prefetched; no refetch this session.
        assert!(ledger.was_prefetched("https://a.com/old"));
    }

    #[test]
    fn test_failure_clears_in_flight_only() {
        let mut ledger = PrefetchLedger::new();
        ledger.mark_in_flight("https://a.com/x");
        assert_eq!(ledger.in_flight_count(), 1);
        ledger.record_failed("https://a.com/x");
        assert_eq!(ledger.in_flight_count(), 0);
        assert!(!ledger.was_prefetched("https://a.com/x"));
    }
}
