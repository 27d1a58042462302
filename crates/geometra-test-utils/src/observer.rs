use geometra_memory::{SyncObserver, SyncReport};
use parking_lot::Mutex;
use std::time::Duration;

/// Sync observer that keeps every report it sees.
#[derive(Debug, Default)]
pub struct RecordingSyncObserver {
    reports: Mutex<Vec<SyncReport>>,
}

impl RecordingSyncObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<SyncReport> {
        self.reports.lock().clone()
    }

    /// Poll until at least `count` reports arrived or `timeout` elapsed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<SyncReport> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let reports = self.reports();
            if reports.len() >= count || tokio::time::Instant::now() >= deadline {
                return reports;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl SyncObserver for RecordingSyncObserver {
    fn on_sync(&self, report: &SyncReport) {
        self.reports.lock().push(report.clone());
    }
}
