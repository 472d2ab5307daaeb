//! Decode manager: open/close lifecycle and input validation on top of
//! [`DecodeController`].
//!
//! The `JpegDecodeManager` handles:
//! - Filling in defaults (`lines_per_block`, `image_max_width`)
//! - Owning the SRAM staging buffer, caller-provided or allocated on open
//! - Probing the JPEG header and checking it against the configured limits
//!   before anything reaches the hardware

use std::sync::Arc;

use tracing::{info, warn};

use jdec_common::{
    parse_header, DecodeCallbacks, DecodeError, DecodeResult, DecodeTimer, DecoderConfig,
    FrameBuffer, JpegDecodeEngine, JpegInfo, Result, StagingBuffer,
};

use crate::controller::DecodeController;
use crate::state::DecodeStatus;
use crate::stats::StatsSnapshot;
use crate::worker::OUTPUT_FORMAT;

/// Line granularity used when the configuration leaves it at 0.
pub const DEFAULT_LINES_PER_BLOCK: u32 = 8;

/// Validating front end for the line-by-line decoder.
pub struct JpegDecodeManager {
    config: DecoderConfig,
    callbacks: Arc<dyn DecodeCallbacks>,
    /// Caller-provided staging buffer, if any.
    staging: Option<StagingBuffer>,
    controller: Option<DecodeController>,
}

impl std::fmt::Debug for JpegDecodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JpegDecodeManager")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .field("external_staging", &self.staging.is_some())
            .finish()
    }
}

impl JpegDecodeManager {
    /// Create a closed manager. `lines_per_block == 0` selects
    /// [`DEFAULT_LINES_PER_BLOCK`]; anything but 8 or 16 is rejected.
    pub fn new(mut config: DecoderConfig, callbacks: Arc<dyn DecodeCallbacks>) -> Result<Self> {
        if config.lines_per_block == 0 {
            info!(
                default = DEFAULT_LINES_PER_BLOCK,
                "lines_per_block is 0, using default"
            );
            config.lines_per_block = DEFAULT_LINES_PER_BLOCK;
        }
        config.lines()?;
        Ok(Self {
            config,
            callbacks,
            staging: None,
            controller: None,
        })
    }

    /// Use `staging` instead of allocating one on open.
    pub fn with_staging(mut self, staging: StagingBuffer) -> Self {
        self.staging = Some(staging);
        self
    }

    pub fn is_open(&self) -> bool {
        self.controller.is_some()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Bring up the decoder on `engine` and `timer`.
    pub fn open(
        &mut self,
        engine: Box<dyn JpegDecodeEngine>,
        timer: Box<dyn DecodeTimer>,
    ) -> Result<()> {
        if self.controller.is_some() {
            return Err(DecodeError::State("decoder already open".into()));
        }
        if self.config.image_max_width == 0 {
            info!(
                default = DecoderConfig::DEFAULT_IMAGE_MAX_WIDTH,
                "image_max_width is 0, using default"
            );
            self.config.image_max_width = DecoderConfig::DEFAULT_IMAGE_MAX_WIDTH;
        }

        let staging = match &self.staging {
            Some(staging) => staging.clone(),
            None => StagingBuffer::allocate(
                self.config.staging_half_size(),
                self.config.buffer_mode(),
            )
            .map_err(|err| {
                warn!(%err, "staging buffer allocation failed");
                err
            })?,
        };
        let controller = DecodeController::init_with_staging(
            self.config.clone(),
            self.callbacks.clone(),
            engine,
            timer,
            staging,
        )?;
        self.controller = Some(controller);
        info!("JPEG decoder opened");
        Ok(())
    }

    /// Shut the decoder down; queued requests are failed through the
    /// callbacks.
    pub fn close(&mut self) -> Result<()> {
        let controller = self
            .controller
            .take()
            .ok_or_else(|| DecodeError::State("decoder not open".into()))?;
        controller.deinit()?;
        info!("JPEG decoder closed");
        Ok(())
    }

    /// Probe the header of an encoded frame.
    pub fn image_info(&self, frame: &FrameBuffer) -> Result<JpegInfo> {
        Ok(parse_header(frame.payload())?)
    }

    /// Validate and decode synchronously.
    pub fn decode(&self, mut source: FrameBuffer, mut dest: FrameBuffer) -> Result<()> {
        let Some(controller) = self.controller.as_ref() else {
            let err = DecodeError::State("decoder not open".into());
            return self.reject(source, Some(dest), err);
        };
        if source.payload().is_empty() {
            let err = DecodeError::Param("source frame is empty".into());
            return self.reject(source, Some(dest), err);
        }
        if dest.capacity() == 0 {
            let err = DecodeError::Param("destination frame is empty".into());
            return self.reject(source, Some(dest), err);
        }
        let info = match parse_header(source.payload()) {
            Ok(info) => info,
            Err(err) => {
                let err = DecodeError::Param(format!("bad JPEG header: {err}"));
                return self.reject(source, Some(dest), err);
            }
        };
        if info.width > self.config.image_max_width {
            let err = DecodeError::Param(format!(
                "image width {} exceeds image_max_width {}",
                info.width, self.config.image_max_width
            ));
            return self.reject(source, Some(dest), err);
        }
        let resolution = info.resolution();
        let needed = resolution.yuyv_byte_size();
        if dest.capacity() < needed {
            let err = DecodeError::Param(format!(
                "destination holds {} bytes, {resolution} needs {needed}",
                dest.capacity()
            ));
            return self.reject(source, Some(dest), err);
        }

        source.set_resolution(resolution);
        dest.set_resolution(resolution);
        controller.decode(source, dest)
    }

    /// Validate and queue for asynchronous decode.
    pub fn decode_async(&self, source: FrameBuffer) -> Result<()> {
        let Some(controller) = self.controller.as_ref() else {
            return self.reject(source, None, DecodeError::State("decoder not open".into()));
        };
        if source.payload().is_empty() {
            return self.reject(source, None, DecodeError::Param("source frame is empty".into()));
        }
        controller.decode_async(source)
    }

    /// `None` while closed.
    pub fn status(&self) -> Option<DecodeStatus> {
        self.controller.as_ref().map(DecodeController::status)
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.controller.as_ref().map(DecodeController::stats)
    }

    /// Fail a request that never reached the controller.
    fn reject(
        &self,
        source: FrameBuffer,
        dest: Option<FrameBuffer>,
        err: DecodeError,
    ) -> Result<()> {
        warn!(frame = %source.id, %err, "decode request rejected");
        let result: DecodeResult = Err(err.clone());
        self.callbacks.on_input_consumed(source);
        self.callbacks.on_output_ready(OUTPUT_FORMAT, result, dest);
        Err(err)
    }
}

impl Drop for JpegDecodeManager {
    fn drop(&mut self) {
        if self.controller.is_some() {
            if let Err(err) = self.close() {
                warn!(%err, "close on drop failed");
            }
        }
    }
}
