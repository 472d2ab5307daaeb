//! Host implementation of the single-shot decode timeout timer.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use jdec_common::{DecodeError, DecodeTimer, Result};

type ExpiryHandler = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Default)]
struct TimerState {
    deadline: Option<Instant>,
    token: u32,
    handler: Option<ExpiryHandler>,
    fired: u64,
    shutdown: bool,
}

struct TimerInner {
    state: Mutex<TimerState>,
    cond: Condvar,
}

/// One-shot timer backed by a dedicated thread.
///
/// The deadline is re-checked under the lock before firing, so `stop` or
/// a re-arm that lands first always wins over the pending expiry.
pub struct ThreadTimer {
    inner: Arc<TimerInner>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn new() -> Result<Self> {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState::default()),
            cond: Condvar::new(),
        });
        let thread_inner = inner.clone();
        let thread = std::thread::Builder::new()
            .name("jdec-timer".to_string())
            .spawn(move || Self::run(&thread_inner))
            .map_err(|e| DecodeError::Generic(format!("failed to spawn timer thread: {e}")))?;
        Ok(Self {
            inner,
            thread: Some(thread),
        })
    }

    /// Number of expiries delivered so far.
    pub fn fired_count(&self) -> u64 {
        self.inner.state.lock().fired
    }

    fn run(inner: &TimerInner) {
        let mut state = inner.state.lock();
        while !state.shutdown {
            match state.deadline {
                None => inner.cond.wait(&mut state),
                Some(deadline) if Instant::now() >= deadline => {
                    state.deadline = None;
                    state.fired += 1;
                    let token = state.token;
                    if let Some(handler) = state.handler.clone() {
                        MutexGuard::unlocked(&mut state, || handler(token));
                    } else {
                        warn!("timer expired with no handler bound");
                    }
                }
                Some(deadline) => {
                    inner.cond.wait_until(&mut state, deadline);
                }
            }
        }
        debug!("timer thread exiting");
    }
}

impl DecodeTimer for ThreadTimer {
    fn bind(&mut self, on_expire: Box<dyn Fn(u32) + Send + Sync>) {
        self.inner.state.lock().handler = Some(Arc::from(on_expire));
    }

    fn start(&mut self, timeout: Duration, token: u32) {
        let mut state = self.inner.state.lock();
        state.deadline = Some(Instant::now() + timeout);
        state.token = token;
        drop(state);
        self.inner.cond.notify_one();
    }

    fn stop(&mut self) {
        self.inner.state.lock().deadline = None;
        self.inner.cond.notify_one();
    }

    fn is_running(&self) -> bool {
        self.inner.state.lock().deadline.is_some()
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.inner.state.lock().shutdown = true;
        self.inner.cond.notify_one();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("timer thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for ThreadTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ThreadTimer")
            .field("running", &state.deadline.is_some())
            .field("fired", &state.fired)
            .finish()
    }
}
