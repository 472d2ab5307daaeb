//! Pixel formats produced and consumed by the JPEG decode path.

use serde::{Deserialize, Serialize};

/// Pixel format of a frame buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Encoded JPEG bitstream (input side).
    Jpeg,
    /// Packed 4:2:2 YUV, `Y0 U Y1 V` (hardware decoder output).
    Yuyv,
}

impl PixelFormat {
    /// Bytes per pixel. Encoded formats report 0.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Jpeg => 0,
            Self::Yuyv => 2,
        }
    }

    /// Byte size of a `width` x `height` image in this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel() as usize
    }
}
