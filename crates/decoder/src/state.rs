//! State the worker publishes to other threads.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::stats::DecodeStats;

/// Hardware decode status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DecodeStatus {
    Idle = 0,
    Busy = 1,
    /// Reserved; never entered.
    Paused = 2,
}

impl DecodeStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Busy,
            2 => Self::Paused,
            _ => Self::Idle,
        }
    }
}

/// Marks `decode_timeout` as raised; the low 32 bits hold the sequence.
const TIMEOUT_RAISED: u64 = 1 << 32;

/// Cross-thread view of the worker.
///
/// Only the worker writes `status` and `seq`. The error and timeout flags
/// are raised from interrupt and timer context and consumed by the worker
/// when it classifies the outcome of a decode. The timeout flag records
/// which decode it was raised for.
#[derive(Debug)]
pub(crate) struct Shared {
    status: AtomicU8,
    seq: AtomicU32,
    decode_err: AtomicBool,
    decode_timeout: AtomicU64,
    pub stats: DecodeStats,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(DecodeStatus::Idle as u8),
            seq: AtomicU32::new(0),
            decode_err: AtomicBool::new(false),
            decode_timeout: AtomicU64::new(0),
            stats: DecodeStats::new(),
        }
    }

    pub fn status(&self) -> DecodeStatus {
        DecodeStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: DecodeStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Sequence number of the current (or last) decode.
    pub fn seq(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    /// Start a new decode generation. Events stamped with an older value
    /// are stale.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn raise_error(&self) {
        self.decode_err.store(true, Ordering::Release);
    }

    /// Flag decode `seq` as timed out.
    pub fn raise_timeout(&self, seq: u32) {
        self.decode_timeout
            .store(TIMEOUT_RAISED | u64::from(seq), Ordering::Release);
    }

    pub fn clear_flags(&self) {
        self.decode_err.store(false, Ordering::Release);
        self.decode_timeout.store(0, Ordering::Release);
    }

    /// Read and clear both flags for decode `seq`: `(error, timeout)`.
    /// A timeout raised for another decode reads as `false`.
    pub fn take_flags(&self, seq: u32) -> (bool, bool) {
        let timeout = self.decode_timeout.swap(0, Ordering::AcqRel);
        (
            self.decode_err.swap(false, Ordering::AcqRel),
            timeout == TIMEOUT_RAISED | u64::from(seq),
        )
    }
}
