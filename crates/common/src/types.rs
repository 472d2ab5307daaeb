//! Core types with newtype pattern for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::color::PixelFormat;
use crate::error::DecodeError;

/// Image resolution.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Byte size for packed YUYV pixel data.
    pub fn yuyv_byte_size(self) -> usize {
        PixelFormat::Yuyv.frame_size(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Number of MCU rows the hardware decodes between two line interrupts.
///
/// Only the granularities the decoder block supports are representable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinesPerBlock {
    Eight,
    Sixteen,
}

impl LinesPerBlock {
    pub fn get(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    /// Number of line blocks covering `height` rows. A trailing partial
    /// strip counts as one block.
    pub fn blocks_for(self, height: u32) -> u32 {
        height.div_ceil(self.get())
    }
}

impl TryFrom<u32> for LinesPerBlock {
    type Error = DecodeError;

    fn try_from(lines: u32) -> Result<Self, Self::Error> {
        match lines {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            other => Err(DecodeError::Param(format!(
                "lines_per_block must be 8 or 16, got {other}"
            ))),
        }
    }
}

impl fmt::Display for LinesPerBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Identifier a caller attaches to a frame so callbacks can be matched
/// back to submissions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
