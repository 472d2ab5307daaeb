//! Moving completed line blocks from staging into the destination frame.

use tracing::{debug, warn};

use jdec_common::{CopyMethod, DecodeError, LinesPerBlock, Resolution, Result};

/// Staging half holding block `block` (1-based) in ping-pong mode.
///
/// The hardware fills half 0 for odd blocks and half 1 for even ones.
pub(crate) fn pingpong_half(block: u32) -> usize {
    1 - (block & 1) as usize
}

/// Geometry of one line block within the output image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BlockSpan {
    /// Byte offset of the block's first row in the destination.
    pub offset: usize,
    /// Bytes to copy; shorter than a full block for a trailing partial strip.
    pub len: usize,
}

impl BlockSpan {
    pub fn new(block: u32, resolution: Resolution, lines: LinesPerBlock) -> Self {
        let row_bytes = resolution.width as usize * 2;
        let first_row = (block.saturating_sub(1) * lines.get()) as usize;
        let rows = (resolution.height as usize)
            .saturating_sub(first_row)
            .min(lines.get() as usize);
        Self {
            offset: first_row * row_bytes,
            len: rows * row_bytes,
        }
    }
}

/// Copies blocks with the configured method.
#[derive(Debug)]
pub(crate) struct BlockCopier {
    method: CopyMethod,
    dma_fallback_logged: bool,
}

impl BlockCopier {
    pub fn new(method: CopyMethod) -> Self {
        Self {
            method,
            dma_fallback_logged: false,
        }
    }

    pub fn copy(&mut self, staging: &[u8], dest: &mut [u8], span: BlockSpan) -> Result<()> {
        let end = span.offset + span.len;
        if span.len > staging.len() || end > dest.len() {
            return Err(DecodeError::Generic(format!(
                "block copy out of range: {}..{} into {} bytes (staging {})",
                span.offset,
                end,
                dest.len(),
                staging.len()
            )));
        }
        if self.method == CopyMethod::Dma && !self.dma_fallback_logged {
            warn!("DMA copy unavailable, falling back to memcpy");
            self.dma_fallback_logged = true;
        }
        dest[span.offset..end].copy_from_slice(&staging[..span.len]);
        debug!(offset = span.offset, len = span.len, "block copied");
        Ok(())
    }
}
