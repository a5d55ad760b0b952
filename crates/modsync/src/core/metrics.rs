//! Run counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the download workers
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub downloaded: AtomicU64,
    pub already_present: AtomicU64,
    pub up_to_date: AtomicU64,
    pub preserved: AtomicU64,
    pub excluded: AtomicU64,
    pub failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
}

impl SyncMetrics {
    pub fn record_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_already_present(&self) {
        self.already_present.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_up_to_date(&self) {
        self.up_to_date.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preserved(&self) {
        self.preserved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_excluded(&self) {
        self.excluded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UpdateSummary {
        UpdateSummary {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            already_present: self.already_present.load(Ordering::Relaxed),
            up_to_date: self.up_to_date.load(Ordering::Relaxed),
            preserved: self.preserved.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SyncMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub downloaded: u64,
    pub already_present: u64,
    pub up_to_date: u64,
    pub preserved: u64,
    pub excluded: u64,
    pub failed: u64,
    pub bytes_downloaded: u64,
}

impl UpdateSummary {
    /// Files whose content was written or adopted this run
    pub fn changed(&self) -> u64 {
        self.downloaded + self.already_present
    }
}
