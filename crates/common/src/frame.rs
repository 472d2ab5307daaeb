//! Frame buffers: encoded input and decoded output, plus the SRAM staging
//! buffer the hardware writes line blocks into.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::color::PixelFormat;
use crate::error::{DecodeError, Result};
use crate::types::{FrameId, Resolution};

/// Owned image memory.
///
/// `data.len()` is the capacity; `length` is the number of valid bytes.
/// Ownership moves into the decoder on submission and comes back through
/// the completion callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Caller-chosen identifier, untouched by the decoder.
    pub id: FrameId,
    pub data: Vec<u8>,
    /// Valid bytes in `data`.
    pub length: usize,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameBuffer {
    /// Wrap an encoded JPEG bitstream. Dimensions are filled in once the
    /// header has been probed.
    pub fn encoded(id: FrameId, data: Vec<u8>) -> Self {
        let length = data.len();
        Self {
            id,
            data,
            length,
            width: 0,
            height: 0,
            format: PixelFormat::Jpeg,
        }
    }

    /// Allocate a zeroed output buffer of `capacity` bytes.
    pub fn with_capacity(id: FrameId, capacity: usize, format: PixelFormat) -> Self {
        Self {
            id,
            data: vec![0; capacity],
            length: 0,
            width: 0,
            height: 0,
            format,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The valid portion of the buffer.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.length.min(self.data.len())]
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.width = resolution.width;
        self.height = resolution.height;
    }
}

/// Which staging layout the hardware writes into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferMode {
    /// One half; the worker copies before re-arming the hardware.
    Single,
    /// Two halves; the hardware fills one while the worker drains the other.
    PingPong,
}

impl BufferMode {
    pub fn halves(self) -> usize {
        match self {
            Self::Single => 1,
            Self::PingPong => 2,
        }
    }
}

/// SRAM staging region shared by the hardware (writer) and the decode
/// worker (reader).
///
/// Each half carries its own lock. By the interrupt cadence the writer and
/// reader never hold the same half at once, so the locks stay uncontended.
#[derive(Clone, Debug)]
pub struct StagingBuffer {
    halves: Arc<[Mutex<Box<[u8]>>]>,
    half_size: usize,
}

impl StagingBuffer {
    /// Allocate `halves` zeroed halves of `half_size` bytes each.
    ///
    /// Returns [`DecodeError::NoMem`] if the allocation cannot be satisfied.
    pub fn allocate(half_size: usize, mode: BufferMode) -> Result<Self> {
        if half_size == 0 {
            return Err(DecodeError::Param("staging half size must be > 0".into()));
        }
        let mut halves = Vec::with_capacity(mode.halves());
        for _ in 0..mode.halves() {
            let mut half: Vec<u8> = Vec::new();
            half.try_reserve_exact(half_size)
                .map_err(|_| DecodeError::NoMem { size: half_size })?;
            half.resize(half_size, 0);
            halves.push(Mutex::new(half.into_boxed_slice()));
        }
        Ok(Self {
            halves: halves.into(),
            half_size,
        })
    }

    /// Bytes needed per half for `max_width` pixels of YUYV over `lines` rows.
    pub fn half_size_for(max_width: u32, lines: u32) -> usize {
        PixelFormat::Yuyv.frame_size(max_width, lines)
    }

    pub fn half_size(&self) -> usize {
        self.half_size
    }

    pub fn half_count(&self) -> usize {
        self.halves.len()
    }

    /// Lock one half. Panics if `index` is out of range.
    pub fn half(&self, index: usize) -> MutexGuard<'_, Box<[u8]>> {
        self.halves[index].lock()
    }
}
