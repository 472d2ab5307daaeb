//! `jdec-decoder`: Line-by-line hardware JPEG decode scheduling.
//!
//! Drives a JPEG block decoder that emits a fixed number of MCU rows per
//! interrupt into a small SRAM staging buffer, copying each block out to
//! the destination frame as it completes.
//!
//! # Architecture
//!
//! One worker thread owns all decode state. Interrupt handlers, the
//! timeout timer and the submission API only post events to its bounded
//! queue, so at most one decode is ever in flight and every request is
//! answered exactly once through [`DecodeCallbacks`](jdec_common::DecodeCallbacks).
//!
//! ## Module Overview
//!
//! - [`controller`]: `DecodeController`, the owned handle (init, decode, deinit)
//! - [`manager`]: `JpegDecodeManager`, open/close lifecycle plus input validation
//! - [`timer`]: `ThreadTimer`, host one-shot timeout timer
//! - [`sim`]: `SimulatedEngine`, host stand-in for the hardware block
//! - [`stats`]: lock-free decode counters
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use jdec_common::{DecoderConfig, FrameBuffer, FrameId, PixelFormat};
//! use jdec_decoder::{DecodeController, SimBehavior, SimulatedEngine, ThreadTimer};
//!
//! let controller = DecodeController::init(
//!     DecoderConfig::default(),
//!     callbacks,
//!     Box::new(SimulatedEngine::new(SimBehavior::Normal)),
//!     Box::new(ThreadTimer::new()?),
//! )?;
//! controller.decode(
//!     FrameBuffer::encoded(FrameId(1), jpeg_bytes),
//!     FrameBuffer::with_capacity(FrameId(2), 864 * 480 * 2, PixelFormat::Yuyv),
//! )?;
//! controller.deinit()?;
//! ```

pub mod controller;
pub mod manager;
pub mod sim;
pub mod stats;
pub mod timer;

mod copy;
mod event;
mod queue;
mod state;
mod worker;

#[cfg(test)]
mod testutil;

pub use controller::DecodeController;
pub use manager::JpegDecodeManager;
pub use sim::{ProbeLog, SimBehavior, SimProbe, SimulatedEngine};
pub use state::DecodeStatus;
pub use stats::{DecodeStats, StatsSnapshot};
pub use timer::ThreadTimer;
