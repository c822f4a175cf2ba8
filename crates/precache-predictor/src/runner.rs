//! Async effect runner for [`CoordinatorState`].
//!
//! One task owns the state and drains an mpsc inbox, one event at a time.
//! Fetches run in their own tasks and report back through the same inbox.
//! Store writes go to a dedicated persistence task in issue order; callers
//! never wait for them.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::PredictorConfig;
use crate::coordinator::{CoordinatorState, Effect, Event};
use crate::fetch::Fetcher;
use crate::messages::Message;
use crate::storage::{self, KeyValueStore, StatsRecord, CONFIG_KEY, STATS_KEY};
use crate::types::{now_millis, PredictorError, PredictorResult, Settings};

const INBOX_CAPACITY: usize = 256;

struct Envelope {
    event: Event,
    reply: Option<oneshot::Sender<Value>>,
}

enum PersistOp {
    Clear,
    Settings(Settings),
    Stats(StatsRecord),
}

/// A loaded coordinator, ready to be spawned.
pub struct Coordinator {
    state: CoordinatorState,
    store: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl Coordinator {
    /// Load persisted settings and stats once and build the coordinator.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetcher>,
        config: PredictorConfig,
    ) -> PredictorResult<Self> {
        let settings = storage::load_settings(store.as_ref()).await?;
        let (stats, history) = storage::load_stats(store.as_ref()).await?;

        tracing::info!(
            "Coordinator loaded: active={}, level={:?}, {} source page(s), {} prefetched",
            settings.is_active,
            settings.prefetch_level,
            history.source_count(),
            stats.total_prefetched
        );

        Ok(Self {
            state: CoordinatorState::new(config, settings, stats, history),
            store,
            fetcher,
        })
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// Start the event loop. It stops once every handle is dropped and
    /// outstanding fetches have reported back.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let handle = CoordinatorHandle { tx: tx.clone() };
        let weak = tx.downgrade();
        drop(tx);

        let task = tokio::spawn(self.run(rx, weak));
        (handle, task)
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Envelope>, weak: mpsc::WeakSender<Envelope>) {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(persist_loop(self.store.clone(), persist_rx));

        while let Some(envelope) = inbox.recv().await {
            let effects = self.state.handle(envelope.event, now_millis());
            let mut reply = Value::Null;

            for effect in effects {
                match effect {
                    Effect::Fetch { url } => self.spawn_fetch(url, &weak),
                    Effect::PersistStats(record) => {
                        let _ = persist_tx.send(PersistOp::Stats(record));
                    }
                    Effect::PersistSettings(settings) => {
                        let _ = persist_tx.send(PersistOp::Settings(settings));
                    }
                    Effect::ClearStore => {
                        let _ = persist_tx.send(PersistOp::Clear);
                    }
                    Effect::Reply(value) => reply = value,
                }
            }

            if let Some(tx) = envelope.reply {
                let _ = tx.send(reply);
            }
        }

        drop(persist_tx);
        if let Err(e) = writer.await {
            tracing::warn!("Persistence task ended abnormally: {e}");
        }
        tracing::info!("Coordinator stopped");
    }

    fn spawn_fetch(&self, url: String, weak: &mpsc::WeakSender<Envelope>) {
        let Some(tx) = weak.upgrade() else {
            return;
        };
        let fetcher = self.fetcher.clone();

        tokio::spawn(async move {
            let issued_at_ms = now_millis();
            let event = match fetcher.prefetch(&url).await {
                Ok(report) => Event::PrefetchCompleted {
                    url,
                    issued_at_ms,
                    load_time_ms: report.elapsed_ms,
                },
                Err(e) => Event::PrefetchFailed {
                    url,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(Envelope { event, reply: None }).await;
        });
    }
}

async fn persist_loop(store: Arc<dyn KeyValueStore>, mut ops: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = ops.recv().await {
        let result = match op {
            PersistOp::Clear => store.clear().await,
            PersistOp::Settings(settings) => match serde_json::to_value(&settings) {
                Ok(value) => store.set(CONFIG_KEY, value).await,
                Err(e) => Err(e.into()),
            },
            PersistOp::Stats(record) => match serde_json::to_value(&record) {
                Ok(value) => store.set(STATS_KEY, value).await,
                Err(e) => Err(e.into()),
            },
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist: {e}");
        }
    }
}

/// Cloneable entry point into a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
}

impl CoordinatorHandle {
    /// Fire-and-forget delivery.
    pub async fn send(&self, message: Message) -> PredictorResult<()> {
        self.tx
            .send(Envelope {
                event: message.into(),
                reply: None,
            })
            .await
            .map_err(|_| PredictorError::ChannelClosed)
    }

    /// Deliver and wait for the reply. Messages without a reply yield
    /// `Value::Null`.
    pub async fn request(&self, message: Message) -> PredictorResult<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                event: message.into(),
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| PredictorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PredictorError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
