//! Simulated JPEG block decoder for host builds and tests.
//!
//! The engine runs its own "hardware" thread. For every block it fills the
//! right staging half with the block index (so tests can tell which block
//! landed where) and raises `line_complete`, pacing itself on
//! `start_next_line` exactly like the real block does.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use jdec_common::{
    parse_header, BufferMode, DecodeError, DecodeIrq, JpegDecodeEngine, LinesPerBlock,
    PixelFormat, Resolution, Result, StagingBuffer,
};

/// How the simulated hardware behaves for every decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimBehavior {
    /// Decode every block.
    Normal,
    /// Accept the start but never raise an interrupt.
    Stall,
    /// Stall the first `n` decodes, then behave normally.
    StallFirst(u32),
    /// Raise a decode error instead of producing this (1-based) block.
    ErrorAtBlock(u32),
    /// Refuse to start.
    FailStart,
}

/// What the simulated hardware observed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeLog {
    pub inits: u32,
    pub deinits: u32,
    pub starts: u32,
    pub stops: u32,
    pub next_line_calls: u32,
    pub rewinds: u32,
    /// Block indices in the order their interrupts were raised.
    pub interrupts: Vec<u32>,
    /// `(block, staging half)` for every block written.
    pub writes: Vec<(u32, usize)>,
    pub errors: u32,
    pub last_format: Option<PixelFormat>,
}

/// Shared handle onto the engine's [`ProbeLog`].
#[derive(Clone, Debug, Default)]
pub struct SimProbe(Arc<Mutex<ProbeLog>>);

impl SimProbe {
    pub fn snapshot(&self) -> ProbeLog {
        self.0.lock().clone()
    }

    fn update(&self, f: impl FnOnce(&mut ProbeLog)) {
        f(&mut self.0.lock());
    }
}

struct SimJob {
    resolution: Resolution,
    blocks: u32,
    staging: StagingBuffer,
    mode: BufferMode,
    /// Block the hardware will produce next.
    next_block: u32,
}

enum SimCommand {
    Begin(SimJob),
    NextLine,
    /// Abort; acknowledged once no further interrupts can fire.
    Stop(Sender<()>),
    Shutdown,
}

/// Host stand-in for the JPEG block decoder.
pub struct SimulatedEngine {
    behavior: SimBehavior,
    block_delay: Duration,
    probe: SimProbe,
    lines: Option<LinesPerBlock>,
    commands: Option<Sender<SimCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedEngine {
    pub fn new(behavior: SimBehavior) -> Self {
        Self {
            behavior,
            block_delay: Duration::ZERO,
            probe: SimProbe::default(),
            lines: None,
            commands: None,
            thread: None,
        }
    }

    /// Time the hardware spends on each block.
    pub fn with_block_delay(mut self, delay: Duration) -> Self {
        self.block_delay = delay;
        self
    }

    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    fn send(&self, command: SimCommand) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or_else(|| DecodeError::State("simulated engine not initialised".into()))?
            .send(command)
            .map_err(|_| DecodeError::Hardware("simulated hardware thread gone".into()))
    }

    fn shutdown_thread(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(SimCommand::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("simulated hardware thread panicked");
            }
        }
    }
}

impl JpegDecodeEngine for SimulatedEngine {
    fn init(&mut self, lines_per_block: u32, irq: Arc<dyn DecodeIrq>) -> Result<()> {
        let lines = LinesPerBlock::try_from(lines_per_block)?;
        self.shutdown_thread();
        let (tx, rx) = channel::unbounded();
        let hw = SimHardware {
            behavior: self.behavior,
            block_delay: self.block_delay,
            lines,
            irq,
            probe: self.probe.clone(),
            job: None,
            due: None,
            begun: 0,
            stalled: false,
        };
        let thread = std::thread::Builder::new()
            .name("jdec-sim-hw".to_string())
            .spawn(move || hw.run(rx))
            .map_err(|e| DecodeError::Hardware(format!("failed to spawn sim thread: {e}")))?;
        self.lines = Some(lines);
        self.commands = Some(tx);
        self.thread = Some(thread);
        self.probe.update(|p| p.inits += 1);
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.shutdown_thread();
        self.probe.update(|p| p.deinits += 1);
        Ok(())
    }

    fn set_output_format(&mut self, format: PixelFormat) -> Result<()> {
        if format != PixelFormat::Yuyv {
            return Err(DecodeError::Param(format!("unsupported output format {format:?}")));
        }
        self.probe.update(|p| p.last_format = Some(format));
        Ok(())
    }

    fn start(&mut self, data: &[u8], staging: &StagingBuffer, mode: BufferMode) -> Result<()> {
        let lines = self
            .lines
            .ok_or_else(|| DecodeError::State("simulated engine not initialised".into()))?;
        if self.behavior == SimBehavior::FailStart {
            return Err(DecodeError::Hardware("simulated start failure".into()));
        }
        if staging.half_count() < mode.halves() {
            return Err(DecodeError::Param("staging buffer too small for mode".into()));
        }
        let resolution = parse_header(data)?.resolution();
        self.probe.update(|p| p.starts += 1);
        self.send(SimCommand::Begin(SimJob {
            resolution,
            blocks: lines.blocks_for(resolution.height),
            staging: staging.clone(),
            mode,
            next_block: 1,
        }))
    }

    fn start_next_line(&mut self) -> Result<()> {
        self.probe.update(|p| p.next_line_calls += 1);
        self.send(SimCommand::NextLine)
    }

    fn rewind_output(&mut self) -> Result<()> {
        self.probe.update(|p| p.rewinds += 1);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.update(|p| p.stops += 1);
        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.send(SimCommand::Stop(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.shutdown_thread();
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEngine")
            .field("behavior", &self.behavior)
            .field("block_delay", &self.block_delay)
            .field("lines", &self.lines)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Hardware thread
// ---------------------------------------------------------------------------

struct SimHardware {
    behavior: SimBehavior,
    block_delay: Duration,
    lines: LinesPerBlock,
    irq: Arc<dyn DecodeIrq>,
    probe: SimProbe,
    job: Option<SimJob>,
    /// When the pending block is due.
    due: Option<Instant>,
    /// Decodes begun since init.
    begun: u32,
    /// Current decode never progresses.
    stalled: bool,
}

impl SimHardware {
    fn run(mut self, commands: Receiver<SimCommand>) {
        loop {
            let command = match self.due {
                Some(due) => match commands.recv_deadline(due) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                None => self.produce_block(),
                Some(SimCommand::Begin(job)) => {
                    debug!(resolution = %job.resolution, blocks = job.blocks, "sim decode begin");
                    self.begun += 1;
                    self.stalled = match self.behavior {
                        SimBehavior::Stall => true,
                        SimBehavior::StallFirst(n) => self.begun <= n,
                        _ => false,
                    };
                    self.job = Some(job);
                    self.schedule();
                }
                Some(SimCommand::NextLine) => self.schedule(),
                Some(SimCommand::Stop(ack)) => {
                    self.job = None;
                    self.due = None;
                    let _ = ack.send(());
                }
                Some(SimCommand::Shutdown) => break,
            }
        }
        trace!("sim hardware thread exiting");
    }

    fn schedule(&mut self) {
        if self.stalled {
            return;
        }
        if self.job.as_ref().is_some_and(|job| job.next_block <= job.blocks) {
            self.due = Some(Instant::now() + self.block_delay);
        }
    }

    fn produce_block(&mut self) {
        self.due = None;
        let Some(job) = self.job.as_mut() else {
            return;
        };
        let block = job.next_block;

        if self.behavior == SimBehavior::ErrorAtBlock(block) {
            self.job = None;
            self.probe.update(|p| p.errors += 1);
            self.irq.decode_error("simulated decode error");
            return;
        }

        let half = match job.mode {
            BufferMode::Single => 0,
            BufferMode::PingPong => ((block - 1) % 2) as usize,
        };
        let row_bytes = job.resolution.width as usize * 2;
        let first_row = ((block - 1) * self.lines.get()) as usize;
        let rows = (job.resolution.height as usize - first_row).min(self.lines.get() as usize);
        {
            let mut staging = job.staging.half(half);
            let len = (rows * row_bytes).min(staging.len());
            staging[..len].fill(block as u8);
        }
        job.next_block += 1;
        if job.next_block > job.blocks {
            self.job = None;
        }

        self.probe.update(|p| {
            p.writes.push((block, half));
            p.interrupts.push(block);
        });
        self.irq.line_complete(block);
    }
}
