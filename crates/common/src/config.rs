//! Decoder configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};
use crate::frame::{BufferMode, StagingBuffer};
use crate::types::LinesPerBlock;

/// How a completed block is moved from staging into the destination frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMethod {
    #[default]
    Memcpy,
    /// DMA channel copy. Hosts without a DMA engine fall back to memcpy.
    Dma,
}

/// Line-by-line decoder configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// MCU rows per line interrupt (8 or 16).
    pub lines_per_block: u32,
    /// Alternate between two staging halves.
    pub pingpong: bool,
    pub copy_method: CopyMethod,
    /// Hardware progress window before a decode is declared timed out.
    pub timeout_ms: u64,
    /// Depth of the worker event queue.
    pub event_queue_depth: usize,
    /// Depth of the pending async request queue.
    pub input_queue_depth: usize,
    /// Widest image the staging buffer is sized for.
    pub image_max_width: u32,
}

impl DecoderConfig {
    pub const DEFAULT_LINES_PER_BLOCK: u32 = 16;
    pub const DEFAULT_TIMEOUT_MS: u64 = 500;
    pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 20;
    pub const DEFAULT_INPUT_QUEUE_DEPTH: usize = 10;
    pub const DEFAULT_IMAGE_MAX_WIDTH: u32 = 864;

    /// Check every field; the first violation is reported as `Param`.
    pub fn validate(&self) -> Result<()> {
        self.lines()?;
        if self.timeout_ms == 0 {
            return Err(DecodeError::Param("timeout_ms must be > 0".into()));
        }
        if self.event_queue_depth == 0 {
            return Err(DecodeError::Param("event_queue_depth must be > 0".into()));
        }
        if self.input_queue_depth == 0 {
            return Err(DecodeError::Param("input_queue_depth must be > 0".into()));
        }
        if self.image_max_width == 0 {
            return Err(DecodeError::Param("image_max_width must be > 0".into()));
        }
        Ok(())
    }

    pub fn lines(&self) -> Result<LinesPerBlock> {
        LinesPerBlock::try_from(self.lines_per_block)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn buffer_mode(&self) -> BufferMode {
        if self.pingpong {
            BufferMode::PingPong
        } else {
            BufferMode::Single
        }
    }

    /// Bytes per staging half for one block at `image_max_width`.
    pub fn staging_half_size(&self) -> usize {
        StagingBuffer::half_size_for(self.image_max_width, self.lines_per_block)
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            lines_per_block: Self::DEFAULT_LINES_PER_BLOCK,
            pingpong: false,
            copy_method: CopyMethod::Memcpy,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            event_queue_depth: Self::DEFAULT_EVENT_QUEUE_DEPTH,
            input_queue_depth: Self::DEFAULT_INPUT_QUEUE_DEPTH,
            image_max_width: Self::DEFAULT_IMAGE_MAX_WIDTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DecoderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.buffer_mode(), BufferMode::Single);
        assert_eq!(config.staging_half_size(), 864 * 16 * 2);
    }

    #[test]
    fn rejects_bad_lines() {
        let config = DecoderConfig {
            lines_per_block: 12,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DecodeError::Param(_))));
    }

    #[test]
    fn rejects_zero_depths() {
        let config = DecoderConfig {
            event_queue_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = DecoderConfig {
            input_queue_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"lines_per_block": 8, "pingpong": true, "copy_method": "dma"}"#)
                .unwrap();
        assert_eq!(config.lines().unwrap(), LinesPerBlock::Eight);
        assert_eq!(config.buffer_mode(), BufferMode::PingPong);
        assert_eq!(config.copy_method, CopyMethod::Dma);
        assert_eq!(config.timeout_ms, DecoderConfig::DEFAULT_TIMEOUT_MS);
        assert_eq!(config.input_queue_depth, DecoderConfig::DEFAULT_INPUT_QUEUE_DEPTH);
    }
}
