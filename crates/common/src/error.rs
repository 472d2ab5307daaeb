//! Central error types for the decoder (thiserror-based).

use thiserror::Error;

/// Coarse error classification reported to callers and callbacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Hardware already decoding (synchronous path only).
    Busy,
    /// Completion timer fired before the final block.
    Timeout,
    /// Hardware error, malformed JPEG or allocation failure.
    Generic,
    /// Invalid argument or configuration.
    Param,
    /// Lifecycle misuse.
    State,
    /// Resource allocation failed during setup.
    NoMem,
}

/// JPEG header probe errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("missing SOI marker")]
    MissingSoi,

    #[error("truncated data at offset {offset}")]
    Truncated { offset: usize },

    #[error("invalid segment at offset {offset}")]
    InvalidSegment { offset: usize },

    #[error("unsupported JPEG process (marker 0xFF{marker:02X})")]
    UnsupportedProcess { marker: u8 },

    #[error("unsupported sample precision: {0} bits")]
    UnsupportedPrecision(u8),

    #[error("unsupported component count: {0}")]
    UnsupportedComponents(u8),

    #[error("unsupported sampling factor 0x{0:02X}")]
    UnsupportedSampling(u8),

    #[error("image has zero width or height")]
    EmptyImage,

    #[error("no frame header before scan data")]
    NoFrameHeader,
}

/// Decoder errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("hardware decoder busy")]
    Busy,

    #[error("decode timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("hardware decode failed: {0}")]
    Hardware(String),

    #[error("invalid JPEG header: {0}")]
    Header(#[from] HeaderError),

    #[error("output buffer allocation failed: {size} bytes")]
    AllocFailed { size: usize },

    #[error("{0}")]
    Generic(String),

    #[error("invalid parameter: {0}")]
    Param(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("out of memory: {size} bytes")]
    NoMem { size: usize },
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Busy => ErrorCode::Busy,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Hardware(_) | Self::Header(_) | Self::AllocFailed { .. } | Self::Generic(_) => {
                ErrorCode::Generic
            }
            Self::Param(_) => ErrorCode::Param,
            Self::State(_) => ErrorCode::State,
            Self::NoMem { .. } => ErrorCode::NoMem,
        }
    }
}

/// Outcome of one decode, as delivered to the output callback.
pub type DecodeResult = Result<(), DecodeError>;

/// Convenience Result type for decoder operations.
pub type Result<T, E = DecodeError> = std::result::Result<T, E>;
