//! Cross-tier sync outcomes and their observers.

use crate::model::MemoryId;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on a single long-term sync attempt.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// How `store_memory` issues the long-term write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Await the long-term write (bounded by the sync timeout) before returning.
    #[default]
    Inline,
    /// Spawn the long-term write and return immediately.
    Background,
}

/// Result of one long-term sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced,
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced)
    }
}

/// Recorded outcome of syncing one record into the long-term tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub id: MemoryId,
    pub owner: String,
    pub outcome: SyncOutcome,
    pub attempted_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn new(id: MemoryId, owner: impl Into<String>, outcome: SyncOutcome) -> Self {
        Self {
            id,
            owner: owner.into(),
            outcome,
            attempted_at: Utc::now(),
        }
    }
}

/// Receives every sync outcome produced by the coordinator.
pub trait SyncObserver: Send + Sync {
    fn on_sync(&self, report: &SyncReport);
}

/// Observer that only writes outcomes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSyncObserver;

impl SyncObserver for LoggingSyncObserver {
    fn on_sync(&self, report: &SyncReport) {
        log_report(report);
    }
}

fn log_report(report: &SyncReport) {
    match &report.outcome {
        SyncOutcome::Synced => debug!(
            "synced record to long-term memory (id={}, owner={})",
            report.id, report.owner
        ),
        SyncOutcome::Failed { reason } => warn!(
            "long-term sync failed (id={}, owner={}, reason={})",
            report.id, report.owner, reason
        ),
    }
}

/// Observer that logs outcomes and remembers failed syncs.
///
/// A later reconciler can drain [`SyncLedger::take_failed`] and call
/// `MemoryCoordinator::resync` for each id.
#[derive(Debug, Default)]
pub struct SyncLedger {
    failed: Mutex<Vec<SyncReport>>,
}

impl SyncLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed syncs not yet taken, oldest first.
    pub fn failed(&self) -> Vec<SyncReport> {
        self.failed.lock().clone()
    }

    /// Drain the failed syncs.
    pub fn take_failed(&self) -> Vec<SyncReport> {
        std::mem::take(&mut *self.failed.lock())
    }
}

impl SyncObserver for SyncLedger {
    fn on_sync(&self, report: &SyncReport) {
        log_report(report);
        let mut failed = self.failed.lock();
        // A later success for the same id settles the earlier failure.
        failed.retain(|entry| entry.id != report.id);
        if !report.outcome.is_synced() {
            failed.push(report.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failed(id: &str) -> SyncReport {
        SyncReport::new(
            MemoryId::from(id),
            "u1",
            SyncOutcome::Failed {
                reason: "down".to_string(),
            },
        )
    }

    #[test]
    fn ledger_keeps_failures_until_taken() {
        let ledger = SyncLedger::new();
        ledger.on_sync(&failed("a"));
        ledger.on_sync(&SyncReport::new(MemoryId::from("b"), "u1", SyncOutcome::Synced));
        assert_eq!(ledger.failed().len(), 1);
        let taken = ledger.take_failed();
        assert_eq!(taken[0].id.as_str(), "a");
        assert!(ledger.failed().is_empty());
    }

    #[test]
    fn later_success_settles_a_failure() {
        let ledger = SyncLedger::new();
        ledger.on_sync(&failed("a"));
        ledger.on_sync(&SyncReport::new(MemoryId::from("a"), "u1", SyncOutcome::Synced));
        assert!(ledger.failed().is_empty());
    }

    #[test]
    fn sync_mode_uses_snake_case() {
        let mode: SyncMode = serde_json::from_str("\"background\"").expect("mode");
        assert_eq!(mode, SyncMode::Background);
    }
}
