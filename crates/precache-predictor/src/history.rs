//! Navigation history: page-to-page transition counts and next-page
//! prediction.
//!
//! Keys are normalized URLs (origin + path). Counters keep first-seen order
//! so ties in [`NavigationHistory::predict`] resolve the same way before and
//! after a persistence round-trip.

use std::collections::HashMap;

use crate::types::{normalize_url, PrefetchCandidate, PrefetchLevel};

/// Insertion-ordered string-keyed table.
#[derive(Debug, Clone, Default)]
struct OrderedTable<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V: Default> OrderedTable<V> {
    fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn entry(&mut self, key: &str) -> &mut V {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.entries.push((key.to_string(), V::default()));
                let i = self.entries.len() - 1;
                self.index.insert(key.to_string(), i);
                i
            }
        };
        &mut self.entries[i].1
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn from_entries(entries: Vec<(String, V)>) -> Self {
        let mut table = Self {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
        };
        for (key, value) in entries {
            // Later duplicates overwrite earlier ones, keeping the first position.
            match table.index.get(&key) {
                Some(&i) => table.entries[i].1 = value,
                None => {
                    table.index.insert(key.clone(), table.entries.len());
                    table.entries.push((key, value));
                }
            }
        }
        table
    }
}

impl<V: PartialEq> PartialEq for OrderedTable<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

type Counter = OrderedTable<u64>;

/// Serialized visit table: `[[url, count], ...]`.
pub type VisitEntries = Vec<(String, u64)>;

/// Serialized transition table: `[[from, [[to, count], ...]], ...]`.
pub type PatternEntries = Vec<(String, Vec<(String, u64)>)>;

/// Transition frequencies and visit counts, keyed by normalized URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationHistory {
    visits: Counter,
    patterns: OrderedTable<Counter>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed navigation. Returns false when both URLs normalize
    /// to the same key and nothing was recorded.
    pub fn record_transition(&mut self, from_url: &str, to_url: &str) -> bool {
        let from = normalize_url(from_url);
        let to = normalize_url(to_url);

        if from == to {
            return false;
        }

        *self.visits.entry(&to) += 1;
        let count = {
            let edge = self.patterns.entry(&from).entry(&to);
            *edge += 1;
            *edge
        };

        tracing::debug!("Recorded transition {from} -> {to} (count {count})");
        true
    }

    /// Most likely next pages from `current_url`, capped by `level`.
    pub fn predict(&self, current_url: &str, level: PrefetchLevel) -> Vec<PrefetchCandidate> {
        self.predict_n(current_url, level.max_candidates())
    }

    /// Top `max_candidates` outgoing edges weighted by their share of all
    /// outgoing traffic.
    pub fn predict_n(&self, current_url: &str, max_candidates: usize) -> Vec<PrefetchCandidate> {
        let key = normalize_url(current_url);
        let Some(destinations) = self.patterns.get(&key) else {
            return Vec::new();
        };

        let total: u64 = destinations.iter().map(|(_, c)| *c).sum();
        if total == 0 {
            return Vec::new();
        }

        let mut sorted: Vec<(&str, u64)> = destinations.iter().map(|(k, c)| (k, *c)).collect();
        // Stable: equal counts stay in first-seen order.
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(max_candidates);

        sorted
            .into_iter()
            .map(|(url, count)| PrefetchCandidate::new(url, count as f64 / total as f64))
            .collect()
    }

    /// Count for the edge `from -> to`, after normalization.
    pub fn edge_count(&self, from_url: &str, to_url: &str) -> u64 {
        self.patterns
            .get(&normalize_url(from_url))
            .and_then(|d| d.get(&normalize_url(to_url)))
            .copied()
            .unwrap_or(0)
    }

    /// Number of recorded arrivals at `url`, after normalization.
    pub fn visit_count(&self, url: &str) -> u64 {
        self.visits.get(&normalize_url(url)).copied().unwrap_or(0)
    }

    /// Outgoing edges from `url` in first-seen order.
    pub fn outgoing(&self, url: &str) -> Vec<(String, u64)> {
        self.patterns
            .get(&normalize_url(url))
            .map(|d| d.iter().map(|(k, c)| (k.to_string(), *c)).collect())
            .unwrap_or_default()
    }

    /// Number of distinct source pages with recorded transitions.
    pub fn source_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.len() == 0 && self.patterns.len() == 0
    }

    pub fn clear(&mut self) {
        self.visits.clear();
        self.patterns.clear();
    }

    /// Export the visit table as an entry list.
    pub fn visit_entries(&self) -> VisitEntries {
        self.visits
            .iter()
            .map(|(k, c)| (k.to_string(), *c))
            .collect()
    }

    /// Export the transition table as nested entry lists.
    pub fn pattern_entries(&self) -> PatternEntries {
        self.patterns
            .iter()
            .map(|(from, dests)| {
                (
                    from.to_string(),
                    dests.iter().map(|(to, c)| (to.to_string(), *c)).collect(),
                )
            })
            .collect()
    }

    /// Rebuild from exported entry lists.
    pub fn from_entries(visits: VisitEntries, patterns: PatternEntries) -> Self {
        Self {
            visits: Counter::from_entries(visits),
            patterns: OrderedTable::from_entries(
                patterns
                    .into_iter()
                    .map(|(from, dests)| (from, Counter::from_entries(dests)))
                    .collect(),
            ),
        }
    }
}
