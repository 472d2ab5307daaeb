//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use jdec_common::{DecodeCallbacks, DecodeResult, FrameBuffer, FrameId, PixelFormat};

/// Smallest stream the header probe accepts: SOI, baseline SOF0 (4:2:2), EOI.
pub fn jpeg_header(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 17, 8];
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[3, 1, 0x21, 0, 2, 0x11, 1, 3, 0x11, 1]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

#[derive(Clone, Debug)]
pub struct OutputRecord {
    pub format: PixelFormat,
    pub result: DecodeResult,
    pub frame_id: Option<FrameId>,
    pub width: u32,
    pub height: u32,
    pub frame: Option<FrameBuffer>,
}

/// Callbacks that keep everything they are handed.
#[derive(Default)]
pub struct RecordingCallbacks {
    inputs: Mutex<Vec<FrameBuffer>>,
    outputs: Mutex<Vec<OutputRecord>>,
    next_id: AtomicU64,
    pub fail_alloc: AtomicBool,
}

impl RecordingCallbacks {
    pub fn inputs(&self) -> Vec<FrameBuffer> {
        self.inputs.lock().clone()
    }

    pub fn outputs(&self) -> Vec<OutputRecord> {
        self.outputs.lock().clone()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.lock().len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn wait_for_outputs(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.output_count() < n || self.input_count() < n {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

impl DecodeCallbacks for RecordingCallbacks {
    fn on_input_consumed(&self, frame: FrameBuffer) {
        self.inputs.lock().push(frame);
    }

    fn on_output_ready(&self, format: PixelFormat, result: DecodeResult, frame: Option<FrameBuffer>) {
        let (frame_id, width, height) = frame
            .as_ref()
            .map_or((None, 0, 0), |f| (Some(f.id), f.width, f.height));
        self.outputs.lock().push(OutputRecord {
            format,
            result,
            frame_id,
            width,
            height,
            frame,
        });
    }

    fn allocate_output(&self, size: usize) -> Option<FrameBuffer> {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return None;
        }
        let id = 1000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        Some(FrameBuffer::with_capacity(FrameId(id), size, PixelFormat::Yuyv))
    }
}
