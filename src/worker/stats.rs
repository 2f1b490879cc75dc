use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    hits: AtomicU64,
    misses: AtomicU64,
    offline_fallbacks: AtomicU64,
    revalidations: AtomicU64,
    failed_revalidations: AtomicU64,
    failed_writes: AtomicU64,
    uncontrolled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub offline_fallbacks: u64,
    pub revalidations: u64,
    pub failed_revalidations: u64,
    pub failed_writes: u64,
    /// Fetches that reached the worker before it controlled the page.
    pub uncontrolled: u64,
}

impl WorkerStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn offline_fallback(&self) {
        self.offline_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn revalidated(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn revalidation_failed(&self) {
        self.failed_revalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failed(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uncontrolled(&self) {
        self.uncontrolled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            offline_fallbacks: self.offline_fallbacks.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            failed_revalidations: self.failed_revalidations.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            uncontrolled: self.uncontrolled.load(Ordering::Relaxed),
        }
    }
}
