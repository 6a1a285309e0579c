use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use super::notifier::EventNotifier;
use super::resolver::ConfigResolver;
use super::writer::{self, CaptureCounters, StreamFault, WriterContext, WriterExit};
use crate::models::audio_models::SessionDiagnostics;
use crate::models::config::{EngineOptions, RecordingConfig, ResolvedConfig};
use crate::models::error::{EngineError, SinkError, StreamError};
use crate::models::event::RecordingEvent;
use crate::models::recording_result::{RecordingMetadata, RecordingSummary};
use crate::models::state::{AtomicEngineState, EngineState};
use crate::processing::ring_buffer::{self, FrameProducer, RingStats};
use crate::storage::file_sink::FileSink;
use crate::storage::metadata;
use crate::traits::recorder_control::RecorderControl;
use crate::traits::recording_listener::RecordingListener;
use crate::traits::stream_backend::{
    FrameCallback, HardwareStream, StreamBackend, StreamErrorCallback, StreamParams,
};

/// State visible to the control, writer, and dispatcher threads.
pub(crate) struct Shared {
    pub state: AtomicEngineState,
    pub notifier: EventNotifier,
    last: Mutex<Option<RecordingSummary>>,
}

impl Shared {
    /// Publish a finished recording and write its sidecar if asked to.
    pub fn record_finished(
        &self,
        summary: RecordingSummary,
        requested: &RecordingConfig,
        write_metadata: bool,
    ) {
        log::info!(
            "recording finished: {} ({} bytes, {:.2}s, {} dropped frames)",
            summary.file_path.display(),
            summary.file_bytes,
            summary.duration_secs,
            summary.dropped_frames
        );
        if write_metadata {
            let meta = RecordingMetadata::new(
                &summary,
                requested.input_preset,
                requested.performance_mode,
                requested.sharing_mode,
            );
            if let Err(e) = metadata::write_metadata(&meta, &summary.file_path) {
                log::error!("{}", e);
            }
        }
        *self.last.lock() = Some(summary);
    }
}

/// Internal mutable session state, protected by the control mutex.
struct Control<S> {
    configured: Option<ResolvedConfig>,
    active: Option<ActiveRecording<S>>,
    last_diagnostics: SessionDiagnostics,
}

/// Everything owned by one running recording.
struct ActiveRecording<S> {
    stream: S,
    writer: thread::JoinHandle<WriterExit>,
    stop: Arc<AtomicBool>,
    stats: Arc<RingStats>,
    counters: Arc<CaptureCounters>,
    resolved: ResolvedConfig,
}

impl<S> ActiveRecording<S> {
    fn diagnostics(&self) -> SessionDiagnostics {
        self.counters.snapshot(self.stats.dropped_frames())
    }
}

/// Microphone capture session engine.
///
/// Owns at most one hardware stream and one output file at a time. Data flow:
/// ```text
/// [StreamBackend callback] → [FrameProducer] ⇢ ring ⇢ [FrameConsumer] → [recorder-writer] → [FileSink]
///                                                                              │ faults
/// [control thread: init/configure/start/stop/release] ──→ [EventNotifier] ←────┘
/// ```
///
/// Every method takes `&self`; control operations are serialized internally,
/// so the session can be shared behind an `Arc` between callers.
pub struct CaptureSession<B: StreamBackend> {
    backend: B,
    options: EngineOptions,
    resolver: ConfigResolver,
    shared: Arc<Shared>,
    control: Mutex<Control<B::Stream>>,
}

impl<B: StreamBackend> CaptureSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, EngineOptions::default())
    }

    pub fn with_options(backend: B, options: EngineOptions) -> Self {
        Self {
            backend,
            resolver: ConfigResolver::new(options.default_dir.clone()),
            options,
            shared: Arc::new(Shared {
                state: AtomicEngineState::new(EngineState::Uninitialized),
                notifier: EventNotifier::new(),
                last: Mutex::new(None),
            }),
            control: Mutex::new(Control {
                configured: None,
                active: None,
                last_diagnostics: SessionDiagnostics::default(),
            }),
        }
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn RecordingListener>>) {
        self.shared.notifier.set_listener(listener);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.load()
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// The configuration `start()` will use, if one was set.
    pub fn config(&self) -> Option<ResolvedConfig> {
        self.control.lock().configured.clone()
    }

    pub fn last_recording(&self) -> Option<RecordingSummary> {
        self.shared.last.lock().clone()
    }

    pub fn last_recording_path(&self) -> Option<PathBuf> {
        self.shared.last.lock().as_ref().map(|s| s.file_path.clone())
    }

    pub fn last_recording_size_bytes(&self) -> i64 {
        self.shared
            .last
            .lock()
            .as_ref()
            .map_or(0, |s| i64::try_from(s.file_bytes).unwrap_or(i64::MAX))
    }

    /// Live counters for the running recording, or those of the last one.
    pub fn diagnostics(&self) -> SessionDiagnostics {
        let control = self.control.lock();
        match &control.active {
            Some(active) => active.diagnostics(),
            None => control.last_diagnostics,
        }
    }

    // --- Commands ---

    /// Uninitialized → Idle. Starts the event dispatcher.
    pub fn try_init(&self) -> Result<(), EngineError> {
        let _control = self.control.lock();
        match self.state() {
            EngineState::Uninitialized => {
                self.shared.notifier.start()?;
                self.shared.state.store(EngineState::Idle);
                log::info!("capture engine initialized");
                Ok(())
            }
            EngineState::Idle | EngineState::Recording => Ok(()),
            state @ EngineState::Released => Err(EngineError::InvalidState {
                operation: "init",
                state,
            }),
        }
    }

    pub fn init(&self) -> bool {
        match self.try_init() {
            Ok(()) => true,
            Err(e) => {
                log::error!("init failed: {}", e);
                false
            }
        }
    }

    /// Validate and store `config` for the next `start()`. Idle only; on
    /// failure the previous configuration stays in place.
    pub fn try_configure(&self, config: RecordingConfig) -> Result<ResolvedConfig, EngineError> {
        let mut control = self.control.lock();
        self.reap_faulted(&mut control);

        let state = self.state();
        if !state.is_idle() {
            return Err(EngineError::InvalidState {
                operation: "configure",
                state,
            });
        }

        let resolved = self.resolver.resolve(&config)?;
        log::info!(
            "configured {}Hz {}ch {}-bit, preset {}, {} / {}",
            resolved.format.sample_rate,
            resolved.format.channels,
            resolved.format.bit_depth,
            config.input_preset.name(),
            config.performance_mode.name(),
            config.sharing_mode.name()
        );
        control.configured = Some(resolved.clone());
        Ok(resolved)
    }

    /// Idle → Recording. Returns the output file path.
    ///
    /// Rejected without an event while already recording. Any other failure
    /// rolls back what was acquired, emits an error event, and leaves the
    /// engine idle.
    pub fn try_start(&self) -> Result<PathBuf, EngineError> {
        let mut control = self.control.lock();
        self.reap_faulted(&mut control);

        let state = self.state();
        if !state.is_idle() {
            return Err(EngineError::InvalidState {
                operation: "start",
                state,
            });
        }

        // Re-resolve so each auto-named recording gets a fresh timestamp.
        let requested = control
            .configured
            .as_ref()
            .map(|c| c.requested.clone())
            .unwrap_or_default();
        let resolved = self
            .resolver
            .resolve(&requested)
            .map_err(|e| self.start_failed(e.into()))?;

        let active = self
            .open_recording(resolved)
            .map_err(|e| self.start_failed(e))?;
        let path = active.resolved.output_path.clone();

        // Queue Started before publishing Recording: a writer fault can only
        // be announced after it observes Recording, so Started always comes first.
        self.shared.notifier.notify(RecordingEvent::Started);
        self.shared.state.store(EngineState::Recording);
        control.last_diagnostics = SessionDiagnostics::default();
        control.active = Some(active);

        log::info!("recording started: {}", path.display());
        Ok(path)
    }

    pub fn start(&self) -> bool {
        match self.try_start() {
            Ok(_) => true,
            Err(EngineError::InvalidState {
                state: EngineState::Recording,
                ..
            }) => {
                log::warn!("start ignored: already recording");
                false
            }
            Err(e) => {
                log::error!("start failed: {}", e);
                false
            }
        }
    }

    /// Recording → Idle. Stops the stream, drains the ring, finalizes the file.
    pub fn try_stop(&self) -> Result<RecordingSummary, EngineError> {
        let mut control = self.control.lock();
        let state = self.state();
        if !state.is_recording() {
            self.reap_faulted(&mut control);
            return Err(EngineError::InvalidState {
                operation: "stop",
                state: self.state(),
            });
        }
        self.finish_active(&mut control)
    }

    pub fn stop(&self) -> bool {
        match self.try_stop() {
            Ok(_) => true,
            Err(EngineError::InvalidState { state, .. }) => {
                log::warn!("stop ignored: engine is {}", state);
                false
            }
            Err(e) => {
                log::error!("stop failed: {}", e);
                false
            }
        }
    }

    /// Any state → Released. Stops a running recording first. Idempotent.
    ///
    /// The dispatcher is drained after the control lock is dropped, so a
    /// listener may call back into the session while handling `Stopped`.
    pub fn release(&self) {
        {
            let mut control = self.control.lock();
            if self.state().is_released() {
                return;
            }

            if self.state().is_recording() {
                if let Err(e) = self.finish_active(&mut control) {
                    log::error!("stop during release failed: {}", e);
                }
            }
            self.reap_faulted(&mut control);

            control.configured = None;
            self.shared.state.store(EngineState::Released);
        }

        self.shared.notifier.shutdown();
        log::info!("capture engine released");
    }

    // --- Internal helpers ---

    /// Steps 1-5 of `start()`. Each failure releases what the earlier steps
    /// acquired.
    fn open_recording(
        &self,
        resolved: ResolvedConfig,
    ) -> Result<ActiveRecording<B::Stream>, EngineError> {
        let path = resolved.output_path.clone();

        let mut sink = FileSink::new(&path);
        sink.open(&resolved.format)?;

        let (producer, consumer) =
            ring_buffer::frame_ring_for(&resolved.format, self.options.ring_buffer_ms());
        let stats = producer.stats();

        let counters = Arc::new(CaptureCounters::default());
        let fault = Arc::new(StreamFault::default());
        let params = StreamParams::from_resolved(&resolved);

        let mut stream = match self.backend.open_stream(
            params,
            frame_callback(producer, Arc::clone(&counters)),
            error_callback(Arc::clone(&fault)),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                discard_file(sink);
                return Err(e.into());
            }
        };

        let actual_sample_rate = match check_negotiated(&params, &stream) {
            Ok(rate) => rate,
            Err(e) => {
                drop(stream);
                discard_file(sink);
                return Err(e.into());
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let writer = writer::spawn(WriterContext {
            consumer,
            sink,
            shared: Arc::clone(&self.shared),
            stop: Arc::clone(&stop),
            fault,
            counters: Arc::clone(&counters),
            requested: resolved.requested.clone(),
            actual_sample_rate,
            poll_interval: self.options.writer_poll_interval,
            max_data_bytes: self.options.max_data_bytes,
            write_metadata: self.options.write_metadata,
        });
        let writer = match writer {
            Ok(handle) => handle,
            Err(e) => {
                drop(stream);
                remove_file(&path);
                return Err(e);
            }
        };

        if let Err(e) = stream.start() {
            drop(stream);
            stop.store(true, Ordering::Release);
            if writer.join().is_err() {
                log::error!("writer thread panicked during start rollback");
            }
            remove_file(&path);
            return Err(e.into());
        }

        Ok(ActiveRecording {
            stream,
            writer,
            stop,
            stats,
            counters,
            resolved,
        })
    }

    fn start_failed(&self, error: EngineError) -> EngineError {
        log::error!("failed to start recording: {}", error);
        self.shared
            .notifier
            .notify(RecordingEvent::Error(error.to_string()));
        error
    }

    /// Tear down the running recording and report how it ended.
    fn finish_active(
        &self,
        control: &mut Control<B::Stream>,
    ) -> Result<RecordingSummary, EngineError> {
        let Some(active) = control.active.take() else {
            self.shared.state.store(EngineState::Idle);
            return Err(EngineError::InvalidState {
                operation: "stop",
                state: EngineState::Idle,
            });
        };
        let (exit, diagnostics, resolved) = shut_down(active);
        control.last_diagnostics = diagnostics;

        match exit {
            WriterExit::Drained(Ok(summary)) => {
                self.shared.record_finished(
                    summary.clone(),
                    &resolved.requested,
                    self.options.write_metadata,
                );
                self.shared.state.store(EngineState::Idle);
                self.shared.notifier.notify(RecordingEvent::Stopped);
                log::info!("recording stopped");
                Ok(summary)
            }
            WriterExit::Drained(Err(e)) => {
                self.shared.state.store(EngineState::Idle);
                self.shared
                    .notifier
                    .notify(RecordingEvent::Error(e.to_string()));
                Err(e.into())
            }
            WriterExit::Faulted {
                error,
                summary,
                reported: false,
            } => {
                if let Some(summary) = summary {
                    self.shared.record_finished(
                        summary,
                        &resolved.requested,
                        self.options.write_metadata,
                    );
                }
                self.shared.state.store(EngineState::Idle);
                self.shared
                    .notifier
                    .notify(RecordingEvent::Error(error.to_string()));
                Err(error)
            }
            // The recording already ended on its own and said so.
            WriterExit::Faulted {
                reported: true, ..
            } => Err(EngineError::InvalidState {
                operation: "stop",
                state: EngineState::Idle,
            }),
        }
    }

    /// Close the stream and join the writer of a recording that ended by
    /// itself. The writer already finalized the file and reported the fault.
    fn reap_faulted(&self, control: &mut Control<B::Stream>) {
        if self.state().is_recording() {
            return;
        }
        if let Some(active) = control.active.take() {
            let (exit, diagnostics, _) = shut_down(active);
            control.last_diagnostics = diagnostics;
            log::debug!("reaped faulted recording: {:?}", exit);
        }
    }
}

impl<B: StreamBackend> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: StreamBackend> RecorderControl for CaptureSession<B> {
    fn init(&self) -> bool {
        CaptureSession::init(self)
    }

    fn configure(&self, config: RecordingConfig) -> Result<(), EngineError> {
        self.try_configure(config).map(|_| ()).map_err(|e| {
            log::warn!("configure rejected: {}", e);
            e
        })
    }

    fn start(&self) -> bool {
        CaptureSession::start(self)
    }

    fn stop(&self) -> bool {
        CaptureSession::stop(self)
    }

    fn release(&self) {
        CaptureSession::release(self)
    }

    fn is_recording(&self) -> bool {
        CaptureSession::is_recording(self)
    }

    fn last_recording_path(&self) -> Option<PathBuf> {
        CaptureSession::last_recording_path(self)
    }

    fn last_recording_size_bytes(&self) -> i64 {
        CaptureSession::last_recording_size_bytes(self)
    }
}

/// The real-time path: count, then push whole frames into the ring.
fn frame_callback(mut producer: FrameProducer, counters: Arc<CaptureCounters>) -> FrameCallback {
    Box::new(move |bytes: &[u8]| {
        counters.callbacks.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes_captured
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        producer.write(bytes);
    })
}

fn error_callback(fault: Arc<StreamFault>) -> StreamErrorCallback {
    Arc::new(move |error: StreamError| fault.raise(error))
}

/// Channel count and sample width must match what was requested; a different
/// rate is accepted and patched into the header on close.
fn check_negotiated<S: HardwareStream>(
    params: &StreamParams,
    stream: &S,
) -> Result<Option<u32>, StreamError> {
    let actual = stream.negotiated_format();
    if actual.channels != params.channels || actual.bit_depth != params.bit_depth {
        return Err(StreamError::FormatMismatch {
            requested_channels: params.channels,
            requested_bits: params.bit_depth,
            actual_channels: actual.channels,
            actual_bits: actual.bit_depth,
        });
    }
    if actual.sample_rate != params.sample_rate {
        log::warn!(
            "stream negotiated {} Hz instead of {} Hz",
            actual.sample_rate,
            params.sample_rate
        );
        return Ok(Some(actual.sample_rate));
    }
    Ok(None)
}

/// Stop the stream first so nothing new arrives, then let the writer drain.
fn shut_down<S: HardwareStream>(
    active: ActiveRecording<S>,
) -> (WriterExit, SessionDiagnostics, ResolvedConfig) {
    let ActiveRecording {
        mut stream,
        writer,
        stop,
        stats,
        counters,
        resolved,
    } = active;

    if let Err(e) = stream.stop() {
        log::warn!("failed to stop input stream: {}", e);
    }
    drop(stream);
    stop.store(true, Ordering::Release);

    let exit = writer.join().unwrap_or_else(|_| {
        log::error!("writer thread panicked");
        WriterExit::Faulted {
            error: SinkError::WriteFailed("writer thread panicked".into()).into(),
            summary: None,
            reported: false,
        }
    });
    let diagnostics = counters.snapshot(stats.dropped_frames());
    (exit, diagnostics, resolved)
}

fn discard_file(mut sink: FileSink) {
    if let Err(e) = sink.close(None) {
        log::warn!("failed to close {}: {}", sink.path().display(), e);
    }
    remove_file(sink.path());
}

fn remove_file(path: &std::path::Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("failed to remove {}: {}", path.display(), e);
    }
}
