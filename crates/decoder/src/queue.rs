//! Pending async decode requests.

use crossbeam::channel::{self, Receiver, Sender};

use jdec_common::FrameBuffer;

/// One queued async submission.
#[derive(Debug)]
pub(crate) struct Request {
    pub source: FrameBuffer,
}

/// Bounded FIFO shared by submitters and the worker.
///
/// `push` blocks while the queue is full; the worker only ever pops
/// without blocking.
#[derive(Clone, Debug)]
pub(crate) struct InputQueue {
    tx: Sender<Request>,
    rx: Receiver<Request>,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx }
    }

    /// Hands the request back if the queue has been closed.
    pub fn push(&self, request: Request) -> Result<(), Request> {
        self.tx.send(request).map_err(|err| err.into_inner())
    }

    pub fn try_pop(&self) -> Option<Request> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Remove everything currently queued.
    pub fn drain(&self) -> Vec<Request> {
        self.rx.try_iter().collect()
    }
}
