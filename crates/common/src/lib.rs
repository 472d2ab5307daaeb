//! `jdec-common`: Shared types, traits, and errors for the line-by-line
//! JPEG decoder.
//!
//! - **Types**: `Resolution`, `LinesPerBlock`, `FrameId`
//! - **Frames**: `FrameBuffer`, `StagingBuffer`, `BufferMode`
//! - **Hardware traits**: `JpegDecodeEngine`, `DecodeIrq`, `DecodeTimer`, `DecodeCallbacks`
//! - **Errors**: `DecodeError`, `HeaderError`, `ErrorCode` (thiserror-based)
//! - **Config**: `DecoderConfig`, `CopyMethod`
//! - **JPEG**: header probe (`parse_header`, `JpegInfo`)

pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod hw;
pub mod jpeg;
pub mod types;

// Re-export commonly used items at crate root
pub use color::PixelFormat;
pub use config::{CopyMethod, DecoderConfig};
pub use error::{DecodeError, DecodeResult, ErrorCode, HeaderError, Result};
pub use frame::{BufferMode, FrameBuffer, StagingBuffer};
pub use hw::{DecodeCallbacks, DecodeIrq, DecodeTimer, JpegDecodeEngine};
pub use jpeg::{parse_header, JpegInfo, Subsampling};
pub use types::{FrameId, LinesPerBlock, Resolution};
