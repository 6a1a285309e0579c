//! The `recorder-writer` thread: drains the ring buffer into the file sink.
//!
//! Exit paths:
//! - stop flag set: drain whatever the stream already delivered, close the
//!   sink, hand the result back to the control thread.
//! - fault (stream disconnect, write failure, size cap): close the sink,
//!   publish the summary, move `Recording -> Idle` and emit the error event,
//!   unless the control thread is already tearing the recording down, in
//!   which case it reports the fault instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::capture::Shared;
use crate::models::audio_models::SessionDiagnostics;
use crate::models::config::RecordingConfig;
use crate::models::error::{EngineError, SinkError, StreamError};
use crate::models::event::RecordingEvent;
use crate::models::recording_result::RecordingSummary;
use crate::models::state::EngineState;
use crate::processing::ring_buffer::FrameConsumer;
use crate::storage::file_sink::{FileSink, SinkSummary};

/// Counters bumped by the frame callback and the writer.
#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    pub callbacks: AtomicU64,
    pub bytes_captured: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl CaptureCounters {
    pub fn snapshot(&self, dropped_frames: u64) -> SessionDiagnostics {
        SessionDiagnostics {
            callback_count: self.callbacks.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            dropped_frames,
        }
    }
}

/// First error reported by the backend's error callback.
#[derive(Debug, Default)]
pub(crate) struct StreamFault {
    raised: AtomicBool,
    error: Mutex<Option<StreamError>>,
}

impl StreamFault {
    pub fn raise(&self, error: StreamError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
        self.raised.store(true, Ordering::Release);
    }

    fn take(&self) -> Option<StreamError> {
        if !self.raised.load(Ordering::Acquire) {
            return None;
        }
        self.error.lock().take()
    }
}

/// How the writer thread ended.
#[derive(Debug)]
pub(crate) enum WriterExit {
    /// Stopped on request; the sink was closed with this result.
    Drained(Result<RecordingSummary, SinkError>),
    /// Ended by a fault. `reported` is true when the writer already published
    /// the summary, moved the engine to idle and emitted the error event.
    Faulted {
        error: EngineError,
        summary: Option<RecordingSummary>,
        reported: bool,
    },
}

pub(crate) struct WriterContext {
    pub consumer: FrameConsumer,
    pub sink: FileSink,
    pub shared: Arc<Shared>,
    pub stop: Arc<AtomicBool>,
    pub fault: Arc<StreamFault>,
    pub counters: Arc<CaptureCounters>,
    pub requested: RecordingConfig,
    /// Rate to patch into the header when the stream negotiated a different one.
    pub actual_sample_rate: Option<u32>,
    pub poll_interval: Duration,
    pub max_data_bytes: u64,
    pub write_metadata: bool,
}

pub(crate) fn spawn(ctx: WriterContext) -> Result<thread::JoinHandle<WriterExit>, EngineError> {
    thread::Builder::new()
        .name("recorder-writer".into())
        .spawn(move || ctx.run())
        .map_err(|e| {
            log::error!("failed to spawn writer thread: {}", e);
            EngineError::ThreadSpawn("recorder-writer")
        })
}

pub(crate) fn summarize(sink: SinkSummary, dropped_frames: u64) -> RecordingSummary {
    RecordingSummary {
        duration_secs: sink.format.duration_secs(sink.data_bytes),
        file_path: sink.path,
        format: sink.format,
        data_bytes: sink.data_bytes,
        file_bytes: sink.file_bytes,
        dropped_frames,
        checksum: sink.checksum,
    }
}

impl WriterContext {
    fn run(mut self) -> WriterExit {
        let mut buf = vec![0u8; self.consumer.capacity()];

        let fault = loop {
            if self.stop.load(Ordering::Acquire) {
                break self.drain(&mut buf).err();
            }
            if let Some(error) = self.fault.take() {
                // Keep what the device delivered before it went away.
                break Some(self.drain(&mut buf).err().unwrap_or(error.into()));
            }

            let n = self.consumer.read_into(&mut buf);
            if n == 0 {
                thread::sleep(self.poll_interval);
                continue;
            }
            if let Err(e) = self.write_chunk(&buf[..n]) {
                break Some(e);
            }
        };

        let closed = self
            .sink
            .close(self.actual_sample_rate)
            .map(|s| summarize(s, self.consumer.dropped_frames()));

        match fault {
            None => WriterExit::Drained(closed),
            Some(error) => self.announce_fault(error, closed),
        }
    }

    fn drain(&mut self, buf: &mut [u8]) -> Result<(), EngineError> {
        loop {
            let n = self.consumer.read_into(buf);
            if n == 0 {
                return Ok(());
            }
            self.write_chunk(&buf[..n])?;
        }
    }

    fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let room = self.max_data_bytes.saturating_sub(self.sink.data_bytes());
        if bytes.len() as u64 > room {
            let frame = self.consumer.frame_bytes();
            let fits = room as usize - room as usize % frame;
            self.sink.write_frames(&bytes[..fits])?;
            self.counters
                .bytes_written
                .fetch_add(fits as u64, Ordering::Relaxed);
            return Err(SinkError::WriteFailed(format!(
                "recording reached the {} byte size limit",
                self.max_data_bytes
            ))
            .into());
        }

        self.sink.write_frames(bytes)?;
        self.counters
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn announce_fault(
        &self,
        error: EngineError,
        closed: Result<RecordingSummary, SinkError>,
    ) -> WriterExit {
        log::error!("recording fault: {}", error);
        let mut summary = closed
            .map_err(|e| log::error!("failed to finalize after fault: {}", e))
            .ok();

        // `start()` publishes Recording only after this thread is running, so
        // wait for it unless the control thread is already tearing down. Once
        // Recording is visible, nothing else leaves it while this thread lives.
        loop {
            if self.stop.load(Ordering::Acquire) {
                return WriterExit::Faulted {
                    error,
                    summary,
                    reported: false,
                };
            }
            if self.shared.state.load().is_recording() {
                if let Some(summary) = summary.take() {
                    self.shared
                        .record_finished(summary, &self.requested, self.write_metadata);
                }
                if self
                    .shared
                    .state
                    .transition(EngineState::Recording, EngineState::Idle)
                {
                    self.shared
                        .notifier
                        .notify(RecordingEvent::Error(error.to_string()));
                }
                return WriterExit::Faulted {
                    error,
                    summary: None,
                    reported: true,
                };
            }
            thread::sleep(self.poll_interval);
        }
    }
}
