//! Collaborator contracts for the line-by-line decoder.
//!
//! The decode worker programs against these traits only. A board support
//! layer implements them over the real JPEG block, interrupt controller and
//! one-shot timer; host builds use the simulated engine and thread timer in
//! `jdec-decoder`.

use std::sync::Arc;
use std::time::Duration;

use crate::color::PixelFormat;
use crate::error::{DecodeResult, Result};
use crate::frame::{BufferMode, FrameBuffer, StagingBuffer};

/// Hardware JPEG block decoder.
///
/// Implementations decode MCU rows into the staging buffer and report
/// progress through the [`DecodeIrq`] handed to [`init`](Self::init).
pub trait JpegDecodeEngine: Send {
    /// One-time driver setup: line granularity and interrupt sink.
    fn init(&mut self, lines_per_block: u32, irq: Arc<dyn DecodeIrq>) -> Result<()>;

    /// Release the driver. Called once from the worker on exit.
    fn deinit(&mut self) -> Result<()>;

    fn set_output_format(&mut self, format: PixelFormat) -> Result<()>;

    /// Begin decoding `data`. The first block is written into staging half 0.
    fn start(&mut self, data: &[u8], staging: &StagingBuffer, mode: BufferMode) -> Result<()>;

    /// Let the hardware decode the next block.
    ///
    /// In single-buffer mode the hardware must not write the staging buffer
    /// before this call.
    fn start_next_line(&mut self) -> Result<()>;

    /// Point the hardware output back at the start of the staging buffer.
    fn rewind_output(&mut self) -> Result<()>;

    /// Abort the current decode. Must be safe to call when idle.
    fn stop(&mut self);
}

/// Interrupt-context entry points. Implementations must not block.
pub trait DecodeIrq: Send + Sync {
    /// Block `block` (1-based) has been written to staging.
    fn line_complete(&self, block: u32);

    /// The hardware reported a decode failure.
    fn decode_error(&self, reason: &str);
}

/// Single-shot timeout timer.
pub trait DecodeTimer: Send {
    /// Install the expiry handler. Called once before the first `start`.
    fn bind(&mut self, on_expire: Box<dyn Fn(u32) + Send + Sync>);

    /// Arm (or re-arm) the timer. An expiry of this arming calls the
    /// handler with `token`, even if it is delivered after a later `start`.
    fn start(&mut self, timeout: Duration, token: u32);

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Application callbacks. Every submitted request produces exactly one
/// `on_input_consumed` and one `on_output_ready`.
pub trait DecodeCallbacks: Send + Sync {
    /// The source frame is no longer needed by the decoder.
    fn on_input_consumed(&self, frame: FrameBuffer);

    /// Decode finished. `frame` is `None` when no destination was ever
    /// allocated for the request.
    fn on_output_ready(&self, format: PixelFormat, result: DecodeResult, frame: Option<FrameBuffer>);

    /// Provide a destination of at least `size` bytes for an async decode.
    fn allocate_output(&self, size: usize) -> Option<FrameBuffer>;
}
