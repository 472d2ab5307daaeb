//! End-to-end tests for the line-by-line decode pipeline.
//!
//! Every test runs the real worker, event queue and thread timer against
//! the simulated hardware block, which stamps each line block with its
//! 1-based index. Output frames can therefore be checked block by block
//! for correct placement.
//!
//! ```bash
//! cargo test -p jdec-decoder --test opt_decode_integration
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use jdec_common::{
    DecodeCallbacks, DecodeError, DecodeResult, DecodeTimer, DecoderConfig, ErrorCode, FrameBuffer,
    FrameId, PixelFormat,
};
use jdec_decoder::{
    DecodeController, DecodeStatus, JpegDecodeManager, SimBehavior, SimProbe, SimulatedEngine,
    ThreadTimer,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Minimal baseline JPEG: SOI, SOF0 (3 components, 4:2:2), EOI.
fn make_jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    // APP0 "JFIF" stub, skipped by the header probe.
    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x07, b'J', b'F', b'I', b'F', 0x00]);
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 17, 8]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[3, 1, 0x21, 0, 2, 0x11, 1, 3, 0x11, 1]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

#[derive(Clone, Debug)]
struct Output {
    result: DecodeResult,
    format: PixelFormat,
    frame: Option<FrameBuffer>,
}

#[derive(Default)]
struct Recorder {
    inputs: Mutex<Vec<FrameId>>,
    outputs: Mutex<Vec<Output>>,
    next_id: AtomicU64,
}

impl Recorder {
    fn inputs(&self) -> Vec<FrameId> {
        self.inputs.lock().clone()
    }

    fn outputs(&self) -> Vec<Output> {
        self.outputs.lock().clone()
    }

    /// Wait until `n` input and `n` output callbacks have fired.
    fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.inputs.lock().len() < n || self.outputs.lock().len() < n {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

impl DecodeCallbacks for Recorder {
    fn on_input_consumed(&self, frame: FrameBuffer) {
        self.inputs.lock().push(frame.id);
    }

    fn on_output_ready(&self, format: PixelFormat, result: DecodeResult, frame: Option<FrameBuffer>) {
        self.outputs.lock().push(Output {
            result,
            format,
            frame,
        });
    }

    fn allocate_output(&self, size: usize) -> Option<FrameBuffer> {
        let id = 500 + self.next_id.fetch_add(1, Ordering::SeqCst);
        Some(FrameBuffer::with_capacity(FrameId(id), size, PixelFormat::Yuyv))
    }
}

#[derive(Clone, Debug, Default)]
struct TimerLog {
    /// Token of every arming, in order.
    armed: Vec<u32>,
    running: bool,
}

/// `ThreadTimer` wrapper that records armings and can replay the previous
/// arming's expiry shortly after the next `start`.
struct RecordingTimer {
    inner: ThreadTimer,
    log: Arc<Mutex<TimerLog>>,
    handler: Option<Arc<dyn Fn(u32) + Send + Sync>>,
    late_expiry: bool,
}

impl DecodeTimer for RecordingTimer {
    fn bind(&mut self, on_expire: Box<dyn Fn(u32) + Send + Sync>) {
        let handler: Arc<dyn Fn(u32) + Send + Sync> = Arc::from(on_expire);
        self.handler = Some(handler.clone());
        self.inner.bind(Box::new(move |token| handler(token)));
    }

    fn start(&mut self, timeout: Duration, token: u32) {
        let mut log = self.log.lock();
        if self.late_expiry {
            if let (Some(&previous), Some(handler)) = (log.armed.last(), self.handler.clone()) {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    handler(previous);
                });
            }
        }
        log.armed.push(token);
        log.running = true;
        drop(log);
        self.inner.start(timeout, token);
    }

    fn stop(&mut self) {
        self.log.lock().running = false;
        self.inner.stop();
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

struct Rig {
    controller: DecodeController,
    recorder: Arc<Recorder>,
    probe: SimProbe,
    timer: Arc<Mutex<TimerLog>>,
}

impl Rig {
    fn timer_log(&self) -> TimerLog {
        self.timer.lock().clone()
    }
}

fn rig(config: DecoderConfig, engine: SimulatedEngine) -> Rig {
    rig_with_timer(config, engine, false)
}

fn rig_with_timer(config: DecoderConfig, engine: SimulatedEngine, late_expiry: bool) -> Rig {
    let recorder = Arc::new(Recorder::default());
    let probe = engine.probe();
    let timer = Arc::new(Mutex::new(TimerLog::default()));
    let controller = DecodeController::init(
        config,
        recorder.clone(),
        Box::new(engine),
        Box::new(RecordingTimer {
            inner: ThreadTimer::new().expect("timer thread"),
            log: timer.clone(),
            handler: None,
            late_expiry,
        }),
    )
    .expect("controller init");
    Rig {
        controller,
        recorder,
        probe,
        timer,
    }
}

fn config(lines: u32, pingpong: bool, timeout_ms: u64) -> DecoderConfig {
    DecoderConfig {
        lines_per_block: lines,
        pingpong,
        timeout_ms,
        ..Default::default()
    }
}

fn source(id: u64, width: u16, height: u16) -> FrameBuffer {
    FrameBuffer::encoded(FrameId(id), make_jpeg(width, height))
}

fn dest(id: u64, width: u32, height: u32) -> FrameBuffer {
    FrameBuffer::with_capacity(FrameId(id), (width * height * 2) as usize, PixelFormat::Yuyv)
}

/// Assert every row of `frame` carries the index of the block it came from.
fn assert_block_pattern(frame: &FrameBuffer, lines: u32) {
    let block_bytes = (frame.width * lines * 2) as usize;
    for (i, chunk) in frame.payload().chunks(block_bytes).enumerate() {
        let expected = (i + 1) as u8;
        assert!(
            chunk.iter().all(|&b| b == expected),
            "block {} holds wrong data",
            i + 1
        );
    }
}

// ---------------------------------------------------------------------------
// Single-buffer decode
// ---------------------------------------------------------------------------

#[test]
fn vga_wide_single_buffer_decode() {
    let rig = rig(config(16, false, 500), SimulatedEngine::new(SimBehavior::Normal));

    rig.controller
        .decode(source(1, 864, 480), dest(2, 864, 480))
        .unwrap();

    let log = rig.probe.snapshot();
    assert_eq!(log.starts, 1);
    assert_eq!(log.interrupts, (1..=30).collect::<Vec<_>>());
    assert_eq!(log.rewinds, 29);
    assert_eq!(log.next_line_calls, 29);
    assert!(log.writes.iter().all(|&(_, half)| half == 0));
    assert_eq!(log.last_format, Some(PixelFormat::Yuyv));

    let outputs = rig.recorder.outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].result, Ok(()));
    assert_eq!(outputs[0].format, PixelFormat::Yuyv);
    let frame = outputs[0].frame.as_ref().unwrap();
    assert_eq!(frame.length, 864 * 480 * 2);
    assert_eq!((frame.width, frame.height), (864, 480));
    assert_block_pattern(frame, 16);
    assert_eq!(rig.recorder.inputs(), vec![FrameId(1)]);

    let stats = rig.controller.stats();
    assert_eq!(stats.blocks_copied, 30);
    assert_eq!(stats.last_block_count, 30);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(rig.controller.status(), DecodeStatus::Idle);

    let timer = rig.timer_log();
    assert_eq!(timer.armed.len(), 1);
    assert!(!timer.running);
}

#[test]
fn eight_line_blocks() {
    let rig = rig(config(8, false, 500), SimulatedEngine::new(SimBehavior::Normal));
    rig.controller
        .decode(source(1, 64, 64), dest(2, 64, 64))
        .unwrap();
    assert_eq!(rig.probe.snapshot().interrupts.len(), 8);
    let outputs = rig.recorder.outputs();
    assert_block_pattern(outputs[0].frame.as_ref().unwrap(), 8);
}

// ---------------------------------------------------------------------------
// Ping-pong
// ---------------------------------------------------------------------------

#[test]
fn pingpong_reads_the_half_just_completed() {
    let engine = SimulatedEngine::new(SimBehavior::Normal).with_block_delay(Duration::from_millis(1));
    let rig = rig(config(16, true, 1000), engine);

    rig.controller
        .decode(source(1, 864, 480), dest(2, 864, 480))
        .unwrap();

    let log = rig.probe.snapshot();
    let expected: Vec<(u32, usize)> = (1..=30).map(|k| (k, ((k - 1) % 2) as usize)).collect();
    assert_eq!(log.writes, expected);
    assert_eq!(log.rewinds, 0);
    assert_eq!(log.next_line_calls, 29);

    let outputs = rig.recorder.outputs();
    assert_eq!(outputs[0].result, Ok(()));
    assert_block_pattern(outputs[0].frame.as_ref().unwrap(), 16);
}

// ---------------------------------------------------------------------------
// Busy, timeout and error paths
// ---------------------------------------------------------------------------

#[test]
fn second_sync_decode_while_busy_is_rejected() {
    let engine = SimulatedEngine::new(SimBehavior::Normal).with_block_delay(Duration::from_millis(20));
    let rig = rig(config(16, false, 2000), engine);
    let controller = Arc::new(rig.controller);

    let first = {
        let controller = controller.clone();
        std::thread::spawn(move || controller.decode(source(1, 64, 160), dest(2, 64, 160)))
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    while controller.status() != DecodeStatus::Busy {
        assert!(Instant::now() < deadline, "first decode never started");
        std::thread::sleep(Duration::from_millis(1));
    }
    let err = controller
        .decode(source(3, 64, 160), dest(4, 64, 160))
        .unwrap_err();
    assert_eq!(err, DecodeError::Busy);

    assert_eq!(first.join().unwrap(), Ok(()));

    let outputs = rig.recorder.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].result, Err(DecodeError::Busy));
    assert_eq!(outputs[0].frame.as_ref().unwrap().id, FrameId(4));
    assert_eq!(outputs[1].result, Ok(()));
    assert_block_pattern(outputs[1].frame.as_ref().unwrap(), 16);
    assert_eq!(rig.recorder.inputs(), vec![FrameId(3), FrameId(1)]);
    assert_eq!(controller.stats().busy_rejections, 1);
    assert_eq!(rig.probe.snapshot().starts, 1);
}

#[test]
fn stalled_hardware_times_out_and_recovers() {
    let rig = rig(config(16, false, 100), SimulatedEngine::new(SimBehavior::StallFirst(1)));

    let started = Instant::now();
    let err = rig
        .controller
        .decode(source(1, 64, 64), dest(2, 64, 64))
        .unwrap_err();
    assert_eq!(err, DecodeError::Timeout { timeout_ms: 100 });
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(rig.controller.status(), DecodeStatus::Idle);
    assert!(rig.probe.snapshot().stops >= 1);
    assert!(!rig.timer_log().running);

    rig.controller
        .decode(source(3, 64, 64), dest(4, 64, 64))
        .unwrap();

    let outputs = rig.recorder.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1].result, Ok(()));
    assert_eq!(rig.recorder.inputs(), vec![FrameId(1), FrameId(3)]);
    let stats = rig.controller.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.succeeded, 1);
    let timer = rig.timer_log();
    assert_eq!(timer.armed.len(), 2);
    assert!(!timer.running);
}

#[test]
fn hardware_error_fails_request_once() {
    let rig = rig(config(16, false, 500), SimulatedEngine::new(SimBehavior::ErrorAtBlock(3)));

    let err = rig
        .controller
        .decode(source(1, 64, 128), dest(2, 64, 128))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Generic);
    assert!(matches!(err, DecodeError::Hardware(_)));

    // Give stray events a chance to arrive before counting callbacks.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.recorder.inputs().len(), 1);
    assert_eq!(rig.recorder.outputs().len(), 1);
    assert_eq!(rig.probe.snapshot().interrupts, vec![1, 2]);
    assert_eq!(rig.controller.status(), DecodeStatus::Idle);
    assert_eq!(rig.controller.stats().failed, 1);
    let timer = rig.timer_log();
    assert_eq!(timer.armed.len(), 1);
    assert!(!timer.running);
}

#[test]
fn hardware_start_failure_disarms_timer() {
    let rig = rig(config(16, false, 500), SimulatedEngine::new(SimBehavior::FailStart));

    let err = rig
        .controller
        .decode(source(1, 64, 64), dest(2, 64, 64))
        .unwrap_err();
    assert!(matches!(err, DecodeError::Hardware(_)));

    let timer = rig.timer_log();
    assert_eq!(timer.armed.len(), 1);
    assert!(!timer.running);
    assert_eq!(rig.controller.status(), DecodeStatus::Idle);
    assert_eq!(rig.recorder.outputs().len(), 1);
}

#[test]
fn timer_runs_only_while_busy() {
    let engine = SimulatedEngine::new(SimBehavior::Normal).with_block_delay(Duration::from_millis(20));
    let rig = rig(config(16, false, 2000), engine);
    let controller = Arc::new(rig.controller);
    assert!(!rig.timer.lock().running);

    let decode = {
        let controller = controller.clone();
        std::thread::spawn(move || controller.decode(source(1, 64, 96), dest(2, 64, 96)))
    };
    let deadline = Instant::now() + Duration::from_secs(2);
    while controller.status() != DecodeStatus::Busy {
        assert!(Instant::now() < deadline, "decode never started");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(rig.timer.lock().running);

    assert_eq!(decode.join().unwrap(), Ok(()));
    assert_eq!(controller.status(), DecodeStatus::Idle);
    let timer = rig.timer.lock().clone();
    assert_eq!(timer.armed.len(), 1);
    assert!(!timer.running);
}

#[test]
fn late_expiry_of_previous_decode_is_ignored() {
    let engine = SimulatedEngine::new(SimBehavior::Normal).with_block_delay(Duration::from_millis(10));
    let rig = rig_with_timer(config(16, false, 500), engine, true);

    rig.controller
        .decode(source(1, 64, 64), dest(2, 64, 64))
        .unwrap();
    // The first decode's expiry lands 5 ms into this one.
    rig.controller
        .decode(source(3, 64, 64), dest(4, 64, 64))
        .unwrap();

    let timer = rig.timer_log();
    assert_eq!(timer.armed.len(), 2);
    assert_ne!(timer.armed[0], timer.armed[1]);
    assert!(!timer.running);
    let stats = rig.controller.stats();
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.timeouts, 0);
    assert_eq!(rig.probe.snapshot().stops, 0);
}

#[test]
fn garbage_input_never_reaches_hardware() {
    let rig = rig(config(16, false, 500), SimulatedEngine::new(SimBehavior::Normal));

    let garbage = FrameBuffer::encoded(FrameId(1), vec![0x42; 10]);
    let err = rig.controller.decode(garbage, dest(2, 64, 64)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Generic);
    assert!(matches!(err, DecodeError::Header(_)));

    assert_eq!(rig.probe.snapshot().starts, 0);
    assert_eq!(rig.controller.status(), DecodeStatus::Idle);
    let outputs = rig.recorder.outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].result.as_ref().unwrap_err().code(), ErrorCode::Generic);
    assert_eq!(rig.recorder.inputs(), vec![FrameId(1)]);
    assert!(rig.timer_log().armed.is_empty());
}

// ---------------------------------------------------------------------------
// Async submission
// ---------------------------------------------------------------------------

#[test]
fn async_burst_completes_in_order() {
    let rig = rig(config(16, true, 500), SimulatedEngine::new(SimBehavior::Normal));

    for id in 1..=6 {
        rig.controller.decode_async(source(id, 96, 64)).unwrap();
    }
    assert!(rig.recorder.wait_for(6, Duration::from_secs(5)));

    let ids: Vec<FrameId> = (1..=6).map(FrameId).collect();
    assert_eq!(rig.recorder.inputs(), ids);
    for output in rig.recorder.outputs() {
        assert_eq!(output.result, Ok(()));
        let frame = output.frame.as_ref().unwrap();
        assert_eq!((frame.width, frame.height), (96, 64));
        assert_block_pattern(frame, 16);
    }
    assert_eq!(rig.controller.stats().succeeded, 6);
    assert_eq!(rig.controller.pending(), 0);
}

#[test]
fn deinit_fails_every_pending_request() {
    let rig = rig(config(16, false, 10_000), SimulatedEngine::new(SimBehavior::Stall));

    for id in 1..=5 {
        rig.controller.decode_async(source(id, 64, 64)).unwrap();
    }
    let deadline = Instant::now() + Duration::from_secs(2);
    while rig.controller.status() != DecodeStatus::Busy {
        assert!(Instant::now() < deadline, "first request never started");
        std::thread::sleep(Duration::from_millis(1));
    }

    let Rig {
        controller,
        recorder,
        probe,
        ..
    } = rig;
    controller.deinit().unwrap();

    let mut inputs = recorder.inputs();
    inputs.sort();
    assert_eq!(inputs, (1..=5).map(FrameId).collect::<Vec<_>>());
    let outputs = recorder.outputs();
    assert_eq!(outputs.len(), 5);
    for output in &outputs {
        assert_eq!(output.result.as_ref().unwrap_err().code(), ErrorCode::State);
    }
    // Only the in-flight request had a destination allocated.
    assert_eq!(outputs.iter().filter(|o| o.frame.is_some()).count(), 1);

    let log = probe.snapshot();
    assert_eq!(log.starts, 1);
    assert_eq!(log.deinits, 1);
    assert!(log.stops >= 1);
}

#[test]
fn mixed_sync_and_async() {
    let rig = rig(config(16, false, 500), SimulatedEngine::new(SimBehavior::Normal));

    rig.controller.decode_async(source(1, 32, 32)).unwrap();
    rig.controller.decode_async(source(2, 32, 32)).unwrap();
    assert!(rig.recorder.wait_for(2, Duration::from_secs(2)));
    rig.controller
        .decode(source(3, 32, 32), dest(4, 32, 32))
        .unwrap();

    assert_eq!(rig.recorder.inputs(), vec![FrameId(1), FrameId(2), FrameId(3)]);
    assert!(rig.recorder.outputs().iter().all(|o| o.result.is_ok()));
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[test]
fn manager_round_trip() {
    let recorder = Arc::new(Recorder::default());
    let mut manager = JpegDecodeManager::new(
        DecoderConfig {
            lines_per_block: 0,
            image_max_width: 0,
            ..Default::default()
        },
        recorder.clone(),
    )
    .unwrap();
    manager
        .open(
            Box::new(SimulatedEngine::new(SimBehavior::Normal)),
            Box::new(ThreadTimer::new().unwrap()),
        )
        .unwrap();

    manager.decode(source(1, 864, 480), dest(2, 864, 480)).unwrap();
    let outputs = recorder.outputs();
    assert_eq!(outputs[0].result, Ok(()));
    assert_block_pattern(outputs[0].frame.as_ref().unwrap(), 8);
    assert_eq!(manager.stats().unwrap().last_block_count, 60);

    manager.decode_async(source(3, 864, 480)).unwrap();
    assert!(recorder.wait_for(2, Duration::from_secs(5)));
    manager.close().unwrap();
    assert_eq!(recorder.inputs(), vec![FrameId(1), FrameId(3)]);
}
