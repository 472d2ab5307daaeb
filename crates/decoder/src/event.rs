//! Worker events and the interrupt-context producers that post them.

use std::sync::Arc;

use crossbeam::channel::{Sender, TrySendError};
use tracing::{debug, error};

use jdec_common::{DecodeError, DecodeIrq, DecodeResult, FrameBuffer};

use crate::state::Shared;

/// A synchronous decode riding in its START event.
#[derive(Debug)]
pub(crate) struct SyncJob {
    pub source: FrameBuffer,
    pub dest: FrameBuffer,
    pub reply: Sender<SyncReply>,
}

/// Frames and outcome handed back to a blocked `decode` caller.
#[derive(Debug)]
pub(crate) struct SyncReply {
    pub source: FrameBuffer,
    pub dest: Option<FrameBuffer>,
    pub result: DecodeResult,
}

impl SyncJob {
    /// Hand the frames back untouched with `result`.
    pub fn reject(self, result: DecodeResult) {
        let reply = SyncReply {
            source: self.source,
            dest: Some(self.dest),
            result,
        };
        if self.reply.send(reply).is_err() {
            debug!("sync caller went away before reply");
        }
    }
}

/// Events processed in order by the decode worker.
///
/// Hardware events carry the sequence number of the decode they belong
/// to; anything from an older decode is dropped.
#[derive(Debug)]
pub(crate) enum DecodeEvent {
    /// Begin the sync job, or pop the next queued async request.
    Start(Option<SyncJob>),
    /// Block `block` (1-based) is ready in staging.
    Continue { seq: u32, block: u32 },
    Complete { seq: u32, result: DecodeResult },
    Timeout { seq: u32 },
    Exit,
}

impl DecodeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Continue { .. } => "continue",
            Self::Complete { .. } => "complete",
            Self::Timeout { .. } => "timeout",
            Self::Exit => "exit",
        }
    }
}

/// Non-blocking post for interrupt and timer context.
fn post_from_isr(events: &Sender<DecodeEvent>, event: DecodeEvent) {
    let name = event.name();
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            error!(event = name, "event queue full, hardware event lost");
        }
        Err(TrySendError::Disconnected(_)) => {
            debug!(event = name, "worker gone, hardware event dropped");
        }
    }
}

/// [`DecodeIrq`] implementation handed to the engine at init.
pub(crate) struct IrqSink {
    events: Sender<DecodeEvent>,
    shared: Arc<Shared>,
}

impl IrqSink {
    pub fn new(events: Sender<DecodeEvent>, shared: Arc<Shared>) -> Self {
        Self { events, shared }
    }
}

impl DecodeIrq for IrqSink {
    fn line_complete(&self, block: u32) {
        let seq = self.shared.seq();
        post_from_isr(&self.events, DecodeEvent::Continue { seq, block });
    }

    fn decode_error(&self, reason: &str) {
        error!(reason, "hardware decode error");
        self.shared.raise_error();
        let seq = self.shared.seq();
        post_from_isr(
            &self.events,
            DecodeEvent::Complete {
                seq,
                result: Err(DecodeError::Hardware(reason.to_string())),
            },
        );
    }
}

/// Expiry handler bound to the timeout timer. The timer hands back the
/// sequence number it was armed with.
pub(crate) fn timeout_handler(
    events: Sender<DecodeEvent>,
    shared: Arc<Shared>,
) -> Box<dyn Fn(u32) + Send + Sync> {
    Box::new(move |seq| {
        error!(seq, "decode timer expired");
        shared.raise_timeout(seq);
        post_from_isr(&events, DecodeEvent::Timeout { seq });
    })
}
