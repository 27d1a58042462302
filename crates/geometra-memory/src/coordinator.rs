//! Single entry point over both memory tiers.

use crate::error::MemoryError;
use crate::long_term::LongTermStore;
use crate::model::{MemoryId, MemoryRecord, RecalledMemory, StoreMemoryRequest, Tier};
use crate::short_term::ShortTermStore;
use crate::sync::{
    DEFAULT_SYNC_TIMEOUT, LoggingSyncObserver, SyncMode, SyncObserver, SyncOutcome, SyncReport,
};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Default short-term expiry applied by `store_memory`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
/// Default number of records pulled into a prompt context.
pub const DEFAULT_CONTEXT_WINDOW: usize = 10;

/// Coordinator behaviour knobs.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Expiry given to every record written through the coordinator.
    pub default_ttl: Duration,
    /// Whether the long-term write is awaited or spawned.
    pub sync_mode: SyncMode,
    /// Bound on one long-term sync attempt.
    pub sync_timeout: Duration,
    /// Default `limit` for context-building calls.
    pub context_window: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            sync_mode: SyncMode::Inline,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

/// Per-tier outcome of [`MemoryCoordinator::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    pub short_term: bool,
    pub long_term: bool,
}

impl ClearReport {
    /// True when both tiers were cleared.
    pub fn is_complete(&self) -> bool {
        self.short_term && self.long_term
    }

    /// Tiers that failed to clear.
    pub fn failed_tiers(&self) -> Vec<Tier> {
        let mut failed = Vec::new();
        if !self.short_term {
            failed.push(Tier::ShortTerm);
        }
        if !self.long_term {
            failed.push(Tier::LongTerm);
        }
        failed
    }
}

impl From<ClearReport> for (bool, bool) {
    fn from(report: ClearReport) -> Self {
        (report.short_term, report.long_term)
    }
}

/// Composes the short-term and long-term stores.
///
/// A write counts as stored once the short-term tier accepts it; the
/// long-term copy is best effort and its outcome goes to the
/// [`SyncObserver`]. Cloning is cheap and clones share the same stores.
#[derive(Clone)]
pub struct MemoryCoordinator {
    short_term: ShortTermStore,
    long_term: LongTermStore,
    options: CoordinatorOptions,
    observer: Arc<dyn SyncObserver>,
}

impl MemoryCoordinator {
    pub fn new(short_term: ShortTermStore, long_term: LongTermStore) -> Self {
        Self::with_options(short_term, long_term, CoordinatorOptions::default())
    }

    pub fn with_options(
        short_term: ShortTermStore,
        long_term: LongTermStore,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            short_term,
            long_term,
            options,
            observer: Arc::new(LoggingSyncObserver),
        }
    }

    /// Replace the sync observer.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    pub fn short_term(&self) -> &ShortTermStore {
        &self.short_term
    }

    pub fn long_term(&self) -> &LongTermStore {
        &self.long_term
    }

    /// Store a memory and return its id.
    ///
    /// Fails only on invalid input or when the short-term write fails. The
    /// long-term sync never changes the result.
    pub async fn store_memory(&self, request: StoreMemoryRequest) -> Result<MemoryId, MemoryError> {
        request.validate()?;
        let record = MemoryRecord::new(
            request.owner,
            request.content,
            request.metadata,
            Some(self.options.default_ttl),
        );
        self.short_term.put(&record).await?;
        let id = record.id.clone();
        match self.options.sync_mode {
            SyncMode::Inline => {
                self.sync_record(&record).await;
            }
            SyncMode::Background => {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    coordinator.sync_record(&record).await;
                });
            }
        }
        Ok(id)
    }

    /// Copy a record into the long-term tier and report the outcome.
    async fn sync_record(&self, record: &MemoryRecord) -> SyncOutcome {
        let write = self.long_term.store_record(record);
        let outcome = match tokio::time::timeout(self.options.sync_timeout, write).await {
            Ok(Ok(())) => SyncOutcome::Synced,
            Ok(Err(err)) => SyncOutcome::Failed {
                reason: err.to_string(),
            },
            Err(_) => SyncOutcome::Failed {
                reason: format!("sync timed out after {:?}", self.options.sync_timeout),
            },
        };
        let report = SyncReport::new(record.id.clone(), record.owner.clone(), outcome.clone());
        self.observer.on_sync(&report);
        outcome
    }

    /// Retry the long-term copy of a record still held in the short-term tier.
    ///
    /// Returns `None` when the record is no longer in the short-term tier.
    pub async fn resync(&self, id: &MemoryId) -> Result<Option<SyncOutcome>, MemoryError> {
        let Some(record) = self.short_term.try_get(id).await? else {
            debug!("nothing to resync (id={id})");
            return Ok(None);
        };
        Ok(Some(self.sync_record(&record).await))
    }

    /// Look a record up, short-term tier first.
    pub async fn get_memory(&self, id: &MemoryId) -> Option<RecalledMemory> {
        if let Some(record) = self.short_term.get(id).await {
            return Some(RecalledMemory {
                record,
                source: Tier::ShortTerm,
            });
        }
        self.long_term.get(id).await.map(|record| RecalledMemory {
            record,
            source: Tier::LongTerm,
        })
    }

    /// Semantic search over the owner's long-term records.
    pub async fn search_memories(
        &self,
        owner: &str,
        query: &str,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        self.long_term.search(owner, query, limit).await
    }

    /// Render the owner's live short-term records as a context block.
    pub async fn retrieve_context(&self, owner: &str, limit: usize) -> String {
        let mut records = self.short_term.get_recent(owner, limit).await;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        format_context(&records)
    }

    /// Content of the owner's long-term records, newest first.
    pub async fn get_chat_context(&self, owner: &str, limit: usize) -> Vec<String> {
        self.long_term
            .get_by_owner(owner, limit)
            .await
            .into_iter()
            .map(|record| record.content)
            .collect()
    }

    /// Clear both tiers for an owner, reporting each tier separately.
    ///
    /// An empty owner touches no store and reports both flags as `false`;
    /// use [`MemoryCoordinator::try_clear`] to tell that apart from two
    /// tier failures.
    pub async fn clear(&self, owner: &str) -> ClearReport {
        match self.try_clear(owner).await {
            Ok(report) => report,
            Err(err) => {
                warn!("refusing to clear memory: {err}");
                ClearReport {
                    short_term: false,
                    long_term: false,
                }
            }
        }
    }

    /// Like [`MemoryCoordinator::clear`], but an empty owner is a
    /// [`MemoryError::Validation`] instead of an all-false report.
    pub async fn try_clear(&self, owner: &str) -> Result<ClearReport, MemoryError> {
        if owner.trim().is_empty() {
            return Err(MemoryError::validation("owner must not be empty"));
        }
        let (short_term, long_term) =
            tokio::join!(self.short_term.clear(owner), self.long_term.purge(owner));
        let long_term = match long_term {
            Ok(_) => true,
            Err(err) => {
                warn!("long-term purge failed (owner={owner}): {err}");
                false
            }
        };
        let report = ClearReport {
            short_term,
            long_term,
        };
        if report.is_complete() {
            debug!("cleared memory (owner={owner})");
        } else {
            warn!(
                "memory clear incomplete (owner={owner}, failed={:?})",
                report.failed_tiers()
            );
        }
        Ok(report)
    }
}

/// Format records as `Memory: <content>` lines in the given order.
pub fn format_context(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(|record| format!("Memory: {}", record.content))
        .collect::<Vec<_>>()
        .join("\n")
}
