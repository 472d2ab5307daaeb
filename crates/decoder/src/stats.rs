//! Decode statistics.
//!
//! Counters are bumped by the worker (and by callers for early `Busy`
//! rejections) and read lock-free through [`DecodeStats::snapshot`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Point-in-time copy of the decoder counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Decodes that reached the hardware.
    pub started: u64,
    pub succeeded: u64,
    /// Failures of any kind, timeouts included.
    pub failed: u64,
    pub timeouts: u64,
    /// Line blocks copied out of staging.
    pub blocks_copied: u64,
    /// Synchronous submissions refused with `Busy`.
    pub busy_rejections: u64,
    /// Block count of the most recent decode.
    pub last_block_count: u32,
}

#[derive(Debug, Default)]
pub struct DecodeStats {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    blocks_copied: AtomicU64,
    busy_rejections: AtomicU64,
    last_block_count: AtomicU32,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self, blocks: u32) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.last_block_count.store(blocks, Ordering::Relaxed);
    }

    pub(crate) fn record_block(&self) {
        self.blocks_copied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_busy(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            blocks_copied: self.blocks_copied.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            last_block_count: self.last_block_count.load(Ordering::Relaxed),
        }
    }
}
