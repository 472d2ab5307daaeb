//! Decode worker: the single thread that owns all mutable decode state.
//!
//! Interrupt handlers, the timeout timer and the submission API only post
//! [`DecodeEvent`]s; this loop consumes them in order and drives the
//! hardware through one decode at a time:
//!
//! ```text
//! Idle --START--> Busy --CONTINUE*--> Busy --COMPLETE|TIMEOUT--> Idle
//! ```

use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error, info, trace, warn};

use jdec_common::{
    parse_header, BufferMode, DecodeCallbacks, DecodeError, DecodeResult, DecodeTimer,
    DecoderConfig, FrameBuffer, JpegDecodeEngine, LinesPerBlock, PixelFormat, Resolution, Result,
    StagingBuffer,
};

use crate::copy::{pingpong_half, BlockCopier, BlockSpan};
use crate::event::{timeout_handler, DecodeEvent, IrqSink, SyncJob, SyncReply};
use crate::queue::InputQueue;
use crate::state::{DecodeStatus, Shared};

/// Format the hardware is always programmed to emit.
pub(crate) const OUTPUT_FORMAT: PixelFormat = PixelFormat::Yuyv;

/// Where a finished decode reports to.
#[derive(Debug)]
enum Outcome {
    /// Blocked `decode` caller; it fires the callbacks after waking.
    Sync(Sender<SyncReply>),
    /// Callbacks fire from the worker.
    Async,
}

/// The one decode currently owned by the hardware.
#[derive(Debug)]
struct InFlight {
    seq: u32,
    source: FrameBuffer,
    dest: FrameBuffer,
    outcome: Outcome,
    resolution: Resolution,
    blocks: u32,
}

/// Frames of a request that could not be started, with the reason.
type Rejected = (FrameBuffer, Option<FrameBuffer>, Outcome, DecodeError);

/// Everything the worker thread owns.
pub(crate) struct Worker {
    config: DecoderConfig,
    lines: LinesPerBlock,
    mode: BufferMode,
    engine: Box<dyn JpegDecodeEngine>,
    timer: Box<dyn DecodeTimer>,
    callbacks: Arc<dyn DecodeCallbacks>,
    staging: StagingBuffer,
    events_tx: Sender<DecodeEvent>,
    events_rx: Receiver<DecodeEvent>,
    input: InputQueue,
    shared: Arc<Shared>,
    copier: BlockCopier,
    in_flight: Option<InFlight>,
    dec_line_cnt: u32,
}

/// Constructor arguments, bundled to keep `Worker::new` readable.
pub(crate) struct WorkerParts {
    pub config: DecoderConfig,
    pub lines: LinesPerBlock,
    pub engine: Box<dyn JpegDecodeEngine>,
    pub timer: Box<dyn DecodeTimer>,
    pub callbacks: Arc<dyn DecodeCallbacks>,
    pub staging: StagingBuffer,
    pub events_tx: Sender<DecodeEvent>,
    pub events_rx: Receiver<DecodeEvent>,
    pub input: InputQueue,
    pub shared: Arc<Shared>,
}

impl Worker {
    pub fn new(parts: WorkerParts) -> Self {
        Self {
            mode: parts.config.buffer_mode(),
            copier: BlockCopier::new(parts.config.copy_method),
            config: parts.config,
            lines: parts.lines,
            engine: parts.engine,
            timer: parts.timer,
            callbacks: parts.callbacks,
            staging: parts.staging,
            events_tx: parts.events_tx,
            events_rx: parts.events_rx,
            input: parts.input,
            shared: parts.shared,
            in_flight: None,
            dec_line_cnt: 0,
        }
    }

    /// Thread body. Reports hardware setup on `ready`, then serves events
    /// until EXIT.
    pub fn run(mut self, ready: Sender<Result<()>>) {
        if let Err(err) = self.setup() {
            error!(%err, "hardware setup failed");
            let _ = ready.send(Err(err));
            return;
        }
        info!(
            lines = self.lines.get(),
            mode = ?self.mode,
            copy = ?self.config.copy_method,
            "decode worker ready"
        );
        if ready.send(Ok(())).is_err() {
            warn!("init caller went away, shutting down");
            self.shutdown();
            return;
        }

        while let Ok(event) = self.events_rx.recv() {
            if !self.dispatch(event) {
                break;
            }
        }
        self.shutdown();
        info!("decode worker exited");
    }

    fn setup(&mut self) -> Result<()> {
        let irq = Arc::new(IrqSink::new(self.events_tx.clone(), self.shared.clone()));
        self.engine.init(self.lines.get(), irq)?;
        self.timer
            .bind(timeout_handler(self.events_tx.clone(), self.shared.clone()));
        Ok(())
    }

    /// Handle one event. Returns `false` on EXIT.
    fn dispatch(&mut self, event: DecodeEvent) -> bool {
        trace!(event = event.name(), "dispatch");
        match event {
            DecodeEvent::Start(job) => self.handle_start(job),
            DecodeEvent::Continue { seq, block } => {
                if self.is_current(seq) {
                    self.handle_continue(block);
                } else {
                    debug!(seq, block, "stale line interrupt dropped");
                }
            }
            DecodeEvent::Complete { seq, result } => {
                if self.is_current(seq) {
                    self.handle_complete(seq, result);
                } else {
                    debug!(seq, "stale completion dropped");
                }
            }
            DecodeEvent::Timeout { seq } => {
                if self.is_current(seq) {
                    self.handle_timeout(seq);
                } else {
                    debug!(seq, "timeout with no decode in flight ignored");
                }
            }
            DecodeEvent::Exit => return false,
        }
        true
    }

    fn is_current(&self, seq: u32) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.seq == seq)
    }

    // -----------------------------------------------------------------------
    // START
    // -----------------------------------------------------------------------

    fn handle_start(&mut self, job: Option<SyncJob>) {
        if self.in_flight.is_some() {
            match job {
                Some(job) => {
                    warn!("sync decode requested while busy, rejecting");
                    self.shared.stats.record_busy();
                    job.reject(Err(DecodeError::Busy));
                }
                None => debug!("start while busy, request stays queued"),
            }
            return;
        }

        let (source, dest, outcome) = match job {
            Some(SyncJob {
                source,
                dest,
                reply,
            }) => (source, Some(dest), Outcome::Sync(reply)),
            None => match self.input.try_pop() {
                Some(request) => (request.source, None, Outcome::Async),
                None => {
                    debug!("spurious start, input queue empty");
                    return;
                }
            },
        };

        if let Err((source, dest, outcome, err)) = self.begin(source, dest, outcome) {
            warn!(frame = %source.id, %err, "decode failed to start");
            self.shared.stats.record_failure();
            self.deliver(source, dest, outcome, Err(err));
            self.kick_next();
        }
    }

    /// Prepare the frames and start the hardware. On failure the frames
    /// come back with the error so the caller can fail the request.
    fn begin(
        &mut self,
        mut source: FrameBuffer,
        dest: Option<FrameBuffer>,
        outcome: Outcome,
    ) -> std::result::Result<(), Rejected> {
        let info = match parse_header(source.payload()) {
            Ok(info) => info,
            Err(err) => return Err((source, dest, outcome, err.into())),
        };
        let resolution = info.resolution();
        let size = resolution.yuyv_byte_size();
        source.set_resolution(resolution);

        let mut dest = match dest {
            Some(dest) => dest,
            None => match self.callbacks.allocate_output(size) {
                Some(dest) => dest,
                None => return Err((source, None, outcome, DecodeError::AllocFailed { size })),
            },
        };
        if dest.capacity() < size {
            let err = DecodeError::Param(format!(
                "destination holds {} bytes, {resolution} YUYV needs {size}",
                dest.capacity()
            ));
            return Err((source, Some(dest), outcome, err));
        }
        let block_bytes = BlockSpan::new(1, resolution, self.lines).len;
        if block_bytes > self.staging.half_size() {
            let err = DecodeError::Param(format!(
                "width {} exceeds staging capacity of {} bytes per block",
                resolution.width,
                self.staging.half_size()
            ));
            return Err((source, Some(dest), outcome, err));
        }
        dest.set_resolution(resolution);
        dest.format = OUTPUT_FORMAT;
        dest.length = 0;

        let seq = self.shared.next_seq();
        let blocks = self.lines.blocks_for(resolution.height);
        self.dec_line_cnt = 0;
        self.shared.clear_flags();
        self.shared.set_status(DecodeStatus::Busy);
        self.timer.start(self.config.timeout(), seq);

        let started = self
            .engine
            .set_output_format(OUTPUT_FORMAT)
            .and_then(|()| self.engine.start(source.payload(), &self.staging, self.mode));
        if let Err(err) = started {
            self.timer.stop();
            self.shared.set_status(DecodeStatus::Idle);
            return Err((source, Some(dest), outcome, err));
        }

        self.shared.stats.record_start(blocks);
        debug!(frame = %source.id, seq, %resolution, blocks, "decode started");
        self.in_flight = Some(InFlight {
            seq,
            source,
            dest,
            outcome,
            resolution,
            blocks,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // CONTINUE
    // -----------------------------------------------------------------------

    fn handle_continue(&mut self, block: u32) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        if block != self.dec_line_cnt + 1 || block > flight.blocks {
            warn!(
                block,
                expected = self.dec_line_cnt + 1,
                blocks = flight.blocks,
                "out-of-order line interrupt ignored"
            );
            return;
        }
        self.dec_line_cnt = block;
        let last = block == flight.blocks;
        let span = BlockSpan::new(block, flight.resolution, self.lines);

        let copied = match self.mode {
            BufferMode::PingPong => {
                let next = if last {
                    Ok(())
                } else {
                    self.engine.start_next_line()
                };
                next.and_then(|()| {
                    let half = self.staging.half(pingpong_half(block));
                    self.copier.copy(&half, &mut flight.dest.data, span)
                })
            }
            BufferMode::Single => {
                let copy = {
                    let half = self.staging.half(0);
                    self.copier.copy(&half, &mut flight.dest.data, span)
                };
                copy.and_then(|()| {
                    if last {
                        Ok(())
                    } else {
                        self.engine
                            .rewind_output()
                            .and_then(|()| self.engine.start_next_line())
                    }
                })
            }
        };

        let seq = flight.seq;
        match copied {
            Ok(()) => {
                self.shared.stats.record_block();
                trace!(seq, block, "block done");
                if last {
                    self.post_self(DecodeEvent::Complete {
                        seq,
                        result: Ok(()),
                    });
                }
            }
            Err(err) => {
                error!(seq, block, %err, "line block handling failed, aborting decode");
                self.engine.stop();
                self.finish(Err(err));
            }
        }
    }

    // -----------------------------------------------------------------------
    // COMPLETE / TIMEOUT
    // -----------------------------------------------------------------------

    fn handle_complete(&mut self, seq: u32, result: DecodeResult) {
        let (hw_err, timed_out) = self.shared.take_flags(seq);
        let result = if timed_out {
            Err(self.timeout_error())
        } else if hw_err && result.is_ok() {
            Err(DecodeError::Hardware("error flagged during decode".into()))
        } else {
            result
        };
        if result.is_err() {
            self.engine.stop();
        }
        self.finish(result);
    }

    fn handle_timeout(&mut self, seq: u32) {
        warn!(
            blocks_done = self.dec_line_cnt,
            timeout_ms = self.config.timeout_ms,
            "decode timed out, stopping hardware"
        );
        self.engine.stop();
        self.shared.take_flags(seq);
        self.finish(Err(self.timeout_error()));
    }

    fn timeout_error(&self) -> DecodeError {
        DecodeError::Timeout {
            timeout_ms: self.config.timeout_ms,
        }
    }

    /// Close out the in-flight decode with `result`.
    fn finish(&mut self, result: DecodeResult) {
        self.timer.stop();
        self.shared.set_status(DecodeStatus::Idle);
        let Some(mut flight) = self.in_flight.take() else {
            return;
        };

        match &result {
            Ok(()) => {
                flight.dest.length = flight.resolution.yuyv_byte_size();
                self.shared.stats.record_success();
                debug!(frame = %flight.source.id, seq = flight.seq, "decode complete");
            }
            Err(DecodeError::Timeout { .. }) => self.shared.stats.record_timeout(),
            Err(err) => {
                warn!(frame = %flight.source.id, seq = flight.seq, %err, "decode failed");
                self.shared.stats.record_failure();
            }
        }

        self.deliver(flight.source, Some(flight.dest), flight.outcome, result);
        self.kick_next();
    }

    /// Hand frames back to whoever is waiting for them.
    fn deliver(
        &self,
        source: FrameBuffer,
        dest: Option<FrameBuffer>,
        outcome: Outcome,
        result: DecodeResult,
    ) {
        match outcome {
            Outcome::Async => {
                self.callbacks.on_output_ready(OUTPUT_FORMAT, result, dest);
                self.callbacks.on_input_consumed(source);
            }
            Outcome::Sync(reply) => {
                if let Err(err) = reply.send(SyncReply {
                    source,
                    dest,
                    result,
                }) {
                    warn!("sync caller gone, releasing frames from worker");
                    let SyncReply {
                        source,
                        dest,
                        result,
                    } = err.into_inner();
                    self.callbacks.on_input_consumed(source);
                    self.callbacks.on_output_ready(OUTPUT_FORMAT, result, dest);
                }
            }
        }
    }

    /// Start the next queued request, if any.
    fn kick_next(&mut self) {
        if !self.input.is_empty() {
            self.post_self(DecodeEvent::Start(None));
        }
    }

    fn post_self(&mut self, event: DecodeEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = event.name(), "event queue full, handling inline");
                self.dispatch(event);
            }
            Err(TrySendError::Disconnected(event)) => {
                error!(event = event.name(), "event queue disconnected");
            }
        }
    }

    // -----------------------------------------------------------------------
    // EXIT
    // -----------------------------------------------------------------------

    fn shutdown(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            warn!(frame = %flight.source.id, seq = flight.seq, "stopping in-flight decode for exit");
            self.engine.stop();
            self.shared.set_status(DecodeStatus::Idle);
            self.shared.stats.record_failure();
            self.deliver(
                flight.source,
                Some(flight.dest),
                flight.outcome,
                Err(shutdown_error()),
            );
        }
        self.timer.stop();
        if let Err(err) = self.engine.deinit() {
            warn!(%err, "hardware deinit failed");
        }

        for event in self.events_rx.try_iter() {
            if let DecodeEvent::Start(Some(job)) = event {
                warn!(frame = %job.source.id, "failing sync request on exit");
                job.reject(Err(shutdown_error()));
            }
        }
        for request in self.input.drain() {
            warn!(frame = %request.source.id, "failing queued request on exit");
            self.callbacks.on_input_consumed(request.source);
            self.callbacks
                .on_output_ready(OUTPUT_FORMAT, Err(shutdown_error()), None);
        }
    }
}

pub(crate) fn shutdown_error() -> DecodeError {
    DecodeError::State("decoder shut down".into())
}
