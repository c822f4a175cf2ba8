//! PreCache Predictor: next-page prediction and prefetch decisions.
//!
//! Navigation history and in-page link signals feed a deterministic scoring
//! engine; a policy gate decides which candidates are fetched; an outcome
//! tracker turns later navigations into hit-rate and time-saved stats.

pub mod collector;
pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod history;
pub mod messages;
pub mod outcome;
pub mod page;
pub mod policy;
pub mod runner;
pub mod scoring;
pub mod storage;
pub mod types;

pub use collector::{Anchor, ElementId, LinkCollector, LinkObservation, PageDom, Rect, Viewport};
pub use config::{AnalysisConfig, FactorWeights, PolicyConfig, PredictorConfig, ScoringConfig};
pub use coordinator::{CoordinatorState, Effect, Event};
pub use fetch::{prefetch_all, FetchReport, Fetcher, HttpPrefetcher, HttpPrefetcherConfig};
pub use history::NavigationHistory;
pub use messages::{ExportedData, Message, PageAnalysis, PageRequest};
pub use outcome::{Outcome, PrefetchLedger};
pub use page::PageSession;
pub use policy::{GateBlock, PolicyGate, PrefetchDecision, SkipReason};
pub use runner::{Coordinator, CoordinatorHandle};
pub use scoring::score_links;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StatsRecord};
pub use types::*;
