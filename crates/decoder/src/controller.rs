//! Decode controller: the owned handle onto one decode worker.
//!
//! `init` spawns the worker and waits for its hardware setup; `deinit`
//! (or drop) posts EXIT, joins it, and fails whatever was still queued.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use tracing::{info, warn};

use jdec_common::{
    DecodeCallbacks, DecodeError, DecodeResult, DecodeTimer, DecoderConfig, FrameBuffer,
    JpegDecodeEngine, Result, StagingBuffer,
};

use crate::event::{DecodeEvent, SyncJob};
use crate::queue::{InputQueue, Request};
use crate::state::{DecodeStatus, Shared};
use crate::stats::StatsSnapshot;
use crate::worker::{shutdown_error, Worker, WorkerParts, OUTPUT_FORMAT};

/// Handle to a running decode worker.
pub struct DecodeController {
    config: DecoderConfig,
    events: Sender<DecodeEvent>,
    input: InputQueue,
    shared: Arc<Shared>,
    callbacks: Arc<dyn DecodeCallbacks>,
    worker: Option<JoinHandle<()>>,
}

impl DecodeController {
    /// Validate `config`, allocate the staging buffer and start the worker.
    pub fn init(
        config: DecoderConfig,
        callbacks: Arc<dyn DecodeCallbacks>,
        engine: Box<dyn JpegDecodeEngine>,
        timer: Box<dyn DecodeTimer>,
    ) -> Result<Self> {
        config.validate()?;
        let staging = StagingBuffer::allocate(config.staging_half_size(), config.buffer_mode())?;
        Self::init_with_staging(config, callbacks, engine, timer, staging)
    }

    /// Like [`init`](Self::init) but with a caller-provided staging buffer.
    pub fn init_with_staging(
        config: DecoderConfig,
        callbacks: Arc<dyn DecodeCallbacks>,
        engine: Box<dyn JpegDecodeEngine>,
        timer: Box<dyn DecodeTimer>,
        staging: StagingBuffer,
    ) -> Result<Self> {
        config.validate()?;
        let lines = config.lines()?;
        let mode = config.buffer_mode();
        if staging.half_count() < mode.halves() || staging.half_size() < config.staging_half_size()
        {
            return Err(DecodeError::Param(format!(
                "staging buffer {}x{} bytes too small for {:?} at {} px x {} lines",
                staging.half_count(),
                staging.half_size(),
                mode,
                config.image_max_width,
                lines
            )));
        }

        let (events_tx, events_rx) = channel::bounded(config.event_queue_depth);
        let input = InputQueue::new(config.input_queue_depth);
        let shared = Arc::new(Shared::new());
        let (ready_tx, ready_rx) = channel::bounded(1);

        let worker = Worker::new(WorkerParts {
            config: config.clone(),
            lines,
            engine,
            timer,
            callbacks: callbacks.clone(),
            staging,
            events_tx: events_tx.clone(),
            events_rx,
            input: input.clone(),
            shared: shared.clone(),
        });
        let handle = std::thread::Builder::new()
            .name("jdec-worker".to_string())
            .spawn(move || worker.run(ready_tx))
            .map_err(|e| DecodeError::Generic(format!("failed to spawn decode worker: {e}")))?;

        let setup = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(DecodeError::Generic("decode worker died during init".into())));
        if let Err(err) = setup {
            if handle.join().is_err() {
                warn!("decode worker panicked during init");
            }
            return Err(err);
        }

        info!(
            lines = lines.get(),
            pingpong = config.pingpong,
            timeout_ms = config.timeout_ms,
            max_width = config.image_max_width,
            "decode controller initialised"
        );
        Ok(Self {
            config,
            events: events_tx,
            input,
            shared,
            callbacks,
            worker: Some(handle),
        })
    }

    /// Decode `source` into `dest` and wait for the result.
    ///
    /// Both callbacks fire before this returns, whatever the outcome.
    pub fn decode(&self, source: FrameBuffer, dest: FrameBuffer) -> Result<()> {
        if self.shared.status() == DecodeStatus::Busy {
            warn!(frame = %source.id, "decode rejected, hardware busy");
            self.shared.stats.record_busy();
            self.release(source, Some(dest), Err(DecodeError::Busy));
            return Err(DecodeError::Busy);
        }

        let (reply_tx, reply_rx) = channel::bounded(1);
        let job = SyncJob {
            source,
            dest,
            reply: reply_tx,
        };
        if let Err(err) = self.events.send(DecodeEvent::Start(Some(job))) {
            let err_result = Err(worker_gone());
            if let DecodeEvent::Start(Some(job)) = err.into_inner() {
                self.release(job.source, Some(job.dest), err_result.clone());
            }
            return err_result;
        }

        let reply = reply_rx.recv().map_err(|_| worker_gone())?;
        self.release(reply.source, reply.dest, reply.result.clone());
        reply.result
    }

    /// Queue `source` for decoding; completion is reported via callbacks.
    ///
    /// Blocks while the input queue is full.
    pub fn decode_async(&self, source: FrameBuffer) -> Result<()> {
        if let Err(request) = self.input.push(Request { source }) {
            self.release(request.source, None, Err(worker_gone()));
            return Err(worker_gone());
        }
        if self.events.send(DecodeEvent::Start(None)).is_err() {
            // Nothing pops the queue once the worker is gone.
            for request in self.input.drain() {
                warn!(frame = %request.source.id, "releasing request, decode worker gone");
                self.release(request.source, None, Err(worker_gone()));
            }
            return Err(worker_gone());
        }
        Ok(())
    }

    pub fn status(&self) -> DecodeStatus {
        self.shared.status()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Async requests waiting for the hardware.
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Stop the worker and fail everything still queued.
    pub fn deinit(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        if self.events.send(DecodeEvent::Exit).is_err() {
            warn!("decode worker already gone");
        }
        let joined = handle
            .join()
            .map_err(|_| DecodeError::Generic("decode worker panicked".into()));

        // Leftovers only exist if the worker died without draining.
        for request in self.input.drain() {
            self.release(request.source, None, Err(shutdown_error()));
        }
        info!("decode controller shut down");
        joined
    }

    fn release(&self, source: FrameBuffer, dest: Option<FrameBuffer>, result: DecodeResult) {
        self.callbacks.on_input_consumed(source);
        self.callbacks.on_output_ready(OUTPUT_FORMAT, result, dest);
    }
}

fn worker_gone() -> DecodeError {
    DecodeError::Generic("decode worker not running".into())
}

impl Drop for DecodeController {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(%err, "decode controller shutdown failed");
        }
    }
}

impl std::fmt::Debug for DecodeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeController")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("pending", &self.pending())
            .field("running", &self.worker.is_some())
            .finish()
    }
}
