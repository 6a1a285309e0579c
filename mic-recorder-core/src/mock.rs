//! Hardware-free [`StreamBackend`] for tests and demos.
//!
//! The handle stays with the caller after the backend is moved into a
//! session; frames pushed through it travel the same callback path a real
//! device would use.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::PcmFormat;
use crate::models::error::StreamError;
use crate::traits::stream_backend::{
    FrameCallback, HardwareStream, StreamBackend, StreamErrorCallback, StreamParams,
};

#[derive(Default)]
struct MockState {
    fail_next_open: Option<StreamError>,
    fail_next_start: Option<StreamError>,
    negotiated_rate: Option<u32>,
    negotiated_format: Option<PcmFormat>,
    last_params: Option<StreamParams>,
    current: Option<Arc<StreamSlot>>,
}

struct StreamSlot {
    on_frames: Mutex<FrameCallback>,
    on_error: StreamErrorCallback,
    running: AtomicBool,
}

/// Cloneable: every clone controls the same fake device.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    opened: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open_stream` fail with `error`.
    pub fn fail_next_open(&self, error: StreamError) {
        self.state.lock().fail_next_open = Some(error);
    }

    /// Make the next `HardwareStream::start` fail with `error`.
    pub fn fail_next_start(&self, error: StreamError) {
        self.state.lock().fail_next_start = Some(error);
    }

    /// Pretend the device only runs at `rate`.
    pub fn negotiate_sample_rate(&self, rate: u32) {
        self.state.lock().negotiated_rate = Some(rate);
    }

    /// Pretend the device granted `format` regardless of the request.
    pub fn negotiate_format(&self, format: PcmFormat) {
        self.state.lock().negotiated_format = Some(format);
    }

    /// Deliver `bytes` through the frame callback of the running stream.
    /// Returns `false` if no stream is running.
    pub fn push_frames(&self, bytes: &[u8]) -> bool {
        let Some(slot) = self.running_slot() else {
            return false;
        };
        let mut on_frames = slot.on_frames.lock();
        // Re-check under the lock so nothing is delivered after `stop()`.
        if !slot.running.load(Ordering::Acquire) {
            return false;
        }
        (*on_frames)(bytes);
        true
    }

    /// Deliver `bytes` in callbacks of `chunk_bytes` each, like a driver
    /// delivering one buffer period at a time. Returns the callbacks made.
    pub fn push_chunked(&self, bytes: &[u8], chunk_bytes: usize) -> usize {
        bytes
            .chunks(chunk_bytes.max(1))
            .take_while(|chunk| self.push_frames(chunk))
            .count()
    }

    /// Report the device as gone. The stream stops delivering frames.
    pub fn disconnect(&self, reason: &str) -> bool {
        let Some(slot) = self.running_slot() else {
            return false;
        };
        slot.running.store(false, Ordering::Release);
        (slot.on_error)(StreamError::Disconnected(reason.to_string()));
        true
    }

    pub fn is_streaming(&self) -> bool {
        self.running_slot().is_some()
    }

    /// Number of streams opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    /// Parameters of the most recent `open_stream` call.
    pub fn last_params(&self) -> Option<StreamParams> {
        self.state.lock().last_params
    }

    fn running_slot(&self) -> Option<Arc<StreamSlot>> {
        self.state
            .lock()
            .current
            .as_ref()
            .filter(|slot| slot.running.load(Ordering::Acquire))
            .cloned()
    }
}

impl StreamBackend for MockBackend {
    type Stream = MockStream;

    fn open_stream(
        &self,
        params: StreamParams,
        on_frames: FrameCallback,
        on_error: StreamErrorCallback,
    ) -> Result<MockStream, StreamError> {
        let mut state = self.state.lock();
        state.last_params = Some(params);
        if let Some(error) = state.fail_next_open.take() {
            return Err(error);
        }

        let mut format = state.negotiated_format.unwrap_or_else(|| params.format());
        if let Some(rate) = state.negotiated_rate {
            format.sample_rate = rate;
        }

        let slot = Arc::new(StreamSlot {
            on_frames: Mutex::new(on_frames),
            on_error,
            running: AtomicBool::new(false),
        });
        state.current = Some(Arc::clone(&slot));
        self.opened.fetch_add(1, Ordering::AcqRel);

        Ok(MockStream {
            slot,
            format,
            backend: Arc::clone(&self.state),
        })
    }
}

/// Stream handle returned by [`MockBackend`].
pub struct MockStream {
    slot: Arc<StreamSlot>,
    format: PcmFormat,
    backend: Arc<Mutex<MockState>>,
}

impl HardwareStream for MockStream {
    fn start(&mut self) -> Result<(), StreamError> {
        if let Some(error) = self.backend.lock().fail_next_start.take() {
            return Err(error);
        }
        self.slot.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        self.slot.running.store(false, Ordering::Release);
        // Wait out a callback that is mid-delivery.
        drop(self.slot.on_frames.lock());
        Ok(())
    }

    fn negotiated_format(&self) -> PcmFormat {
        self.format
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
        let mut state = self.backend.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
        {
            state.current = None;
        }
    }
}
