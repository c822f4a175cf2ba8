//! Prefetch policy gate.
//!
//! Decides which candidates may actually be fetched. Global gates (inactive,
//! low battery, data saver) reject the whole batch; the per-candidate checks
//! then filter duplicates, host rules and the concurrency limit.

use std::collections::HashSet;

use crate::config::PolicyConfig;
use crate::outcome::PrefetchLedger;
use crate::types::{DeviceStatus, NetworkType, PrefetchCandidate, Settings};

/// Why a whole batch was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateBlock {
    Inactive,
    NoCandidates,
    LowBattery,
    DataSaver,
}

/// Why a single candidate was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DuplicateInBatch,
    AlreadyPrefetched,
    InFlight,
    HostDenied,
    HostNotAllowed,
    InvalidUrl,
    ConcurrencyLimit,
}

/// Result of running a batch through the gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefetchDecision {
    /// Candidates cleared for fetching, in input order.
    pub admitted: Vec<PrefetchCandidate>,
    pub blocked: Option<GateBlock>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl PrefetchDecision {
    fn blocked(reason: GateBlock) -> Self {
        Self {
            blocked: Some(reason),
            ..Self::default()
        }
    }

    pub fn admitted_urls(&self) -> impl Iterator<Item = &str> {
        self.admitted.iter().map(|c| c.url.as_str())
    }
}

/// Host-list check: deny entries are checked first (substring match); a
/// non-empty allow list must then match.
pub fn check_host(url: &str, settings: &Settings) -> Result<(), SkipReason> {
    let parsed = url::Url::parse(url).map_err(|_| SkipReason::InvalidUrl)?;
    let host = parsed.host_str().ok_or(SkipReason::InvalidUrl)?;

    if settings.deny_list.iter().any(|p| host.contains(p.as_str())) {
        return Err(SkipReason::HostDenied);
    }
    if !settings.allow_list.is_empty()
        && !settings.allow_list.iter().any(|p| host.contains(p.as_str()))
    {
        return Err(SkipReason::HostNotAllowed);
    }
    Ok(())
}

/// Stateless decision logic over settings, device status and the ledger.
#[derive(Debug, Clone, Default)]
pub struct PolicyGate {
    config: PolicyConfig,
}

impl PolicyGate {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// The battery gate: saving on, battery known, unplugged, below level.
    pub fn battery_blocks(&self, settings: &Settings, device: &DeviceStatus) -> bool {
        settings.battery_saving
            && device
                .battery
                .is_some_and(|b| !b.charging && b.level < self.config.low_battery_level)
    }

    /// The data gate: data saver on while on a cellular connection.
    pub fn data_saver_blocks(&self, settings: &Settings, device: &DeviceStatus) -> bool {
        settings.data_saver && device.network.network_type == NetworkType::Cellular
    }

    pub fn decide(
        &self,
        settings: &Settings,
        device: &DeviceStatus,
        ledger: &PrefetchLedger,
        candidates: &[PrefetchCandidate],
    ) -> PrefetchDecision {
        if !settings.is_active {
            return PrefetchDecision::blocked(GateBlock::Inactive);
        }
        if candidates.is_empty() {
            return PrefetchDecision::blocked(GateBlock::NoCandidates);
        }
        if self.battery_blocks(settings, device) {
            tracing::info!("Battery low, skipping {} prefetch candidate(s)", candidates.len());
            return PrefetchDecision::blocked(GateBlock::LowBattery);
        }
        if self.data_saver_blocks(settings, device) {
            tracing::info!(
                "Data saver on cellular, skipping {} prefetch candidate(s)",
                candidates.len()
            );
            return PrefetchDecision::blocked(GateBlock::DataSaver);
        }

        let mut decision = PrefetchDecision::default();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut slots = self
            .config
            .max_in_flight
            .saturating_sub(ledger.in_flight_count());

        for candidate in candidates {
            let url = candidate.url.as_str();
            let verdict = if !seen.insert(url) {
                Err(SkipReason::DuplicateInBatch)
            } else if ledger.was_prefetched(url) {
                Err(SkipReason::AlreadyPrefetched)
            } else if ledger.is_in_flight(url) {
                Err(SkipReason::InFlight)
            } else if let Err(reason) = check_host(url, settings) {
                Err(reason)
            } else if slots == 0 {
                Err(SkipReason::ConcurrencyLimit)
            } else {
                Ok(())
            };

            match verdict {
                Ok(()) => {
                    slots -= 1;
                    decision.admitted.push(candidate.clone());
                }
                Err(reason) => {
                    tracing::debug!("Skipping prefetch of {url}: {reason:?}");
                    decision.skipped.push((url.to_string(), reason));
                }
            }
        }
        decision
    }
}
