use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Barrier, Weak};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use mic_recorder_core::processing::wav_format::parse_wav_header;
use mic_recorder_core::storage::metadata::read_metadata;
use mic_recorder_core::{
    CaptureSession, ConfigError, EngineError, EngineOptions, EngineState, InputPreset,
    MockBackend, PcmFormat, RecorderControl, RecordingConfig, RecordingEvent, RecordingListener,
    SessionDiagnostics, StreamError,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// 10 ms of 48 kHz mono 16-bit audio.
const PERIOD_BYTES: usize = 960;

struct Harness {
    session: Arc<CaptureSession<MockBackend>>,
    backend: MockBackend,
    events: Receiver<RecordingEvent>,
}

fn harness(dir: &Path, options: EngineOptions) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let backend = MockBackend::new();
    let options = EngineOptions {
        default_dir: dir.to_path_buf(),
        writer_poll_interval: Duration::from_millis(1),
        ..options
    };
    let session = Arc::new(CaptureSession::with_options(backend.clone(), options));

    let (tx, events) = mpsc::channel::<RecordingEvent>();
    session.set_listener(Some(Arc::new(tx)));
    assert!(session.init());

    Harness {
        session,
        backend,
        events,
    }
}

fn default_harness(dir: &Path) -> Harness {
    harness(dir, EngineOptions::default())
}

impl Harness {
    /// Push `bytes` in driver-sized periods, letting the writer catch up every
    /// 100 ms of audio so nothing overflows the ring.
    fn feed(&self, bytes: &[u8]) {
        let mut target = self.session.diagnostics().bytes_written;
        for block in bytes.chunks(PERIOD_BYTES * 10) {
            let periods = block.len().div_ceil(PERIOD_BYTES);
            assert_eq!(self.backend.push_chunked(block, PERIOD_BYTES), periods);
            target += block.len() as u64;
            wait_until(|| self.session.diagnostics().bytes_written >= target);
        }
    }

    fn next_event(&self) -> RecordingEvent {
        self.events
            .recv_timeout(TIMEOUT)
            .expect("no recording event arrived")
    }

    /// Release the engine (flushing the dispatcher) and return every event.
    fn drain_events(&self) -> Vec<RecordingEvent> {
        self.session.release();
        self.events.try_iter().collect()
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Mono 16-bit ramp, `frames` long.
fn ramp(frames: usize) -> Vec<u8> {
    (0..frames)
        .flat_map(|i| ((i % 32_768) as i16).to_le_bytes())
        .collect()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn records_one_second_of_48k_mono() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    h.session.configure(RecordingConfig::default()).unwrap();
    assert!(h.session.start());
    assert!(h.session.is_recording());
    assert_eq!(h.next_event(), RecordingEvent::Started);

    let audio = ramp(48_000);
    h.feed(&audio);
    assert!(h.session.stop());
    assert_eq!(h.next_event(), RecordingEvent::Stopped);
    assert_eq!(h.session.state(), EngineState::Idle);

    let summary = h.session.last_recording().unwrap();
    assert_eq!(summary.data_bytes, 96_000);
    assert_eq!(summary.file_bytes, 96_044);
    assert_eq!(summary.dropped_frames, 0);
    assert_relative_eq!(summary.duration_secs, 1.0);
    assert_eq!(h.session.last_recording_size_bytes(), 96_044);

    let path = h.session.last_recording_path().unwrap();
    assert_eq!(path.parent().unwrap(), dir.path());
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("rec_"), "{name}");
    assert!(name.ends_with("_48k_mono_16bit.wav"), "{name}");

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), 48_000);
    assert_eq!(samples[1234], 1234);

    let diagnostics = h.session.diagnostics();
    assert_eq!(diagnostics.callback_count, 100);
    assert_eq!(diagnostics.bytes_captured, 96_000);
    assert_eq!(diagnostics.bytes_written, 96_000);
}

#[test]
fn second_start_is_ignored_without_event() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    assert!(h.session.start());
    assert!(!h.session.start());
    assert!(matches!(
        h.session.try_start(),
        Err(EngineError::InvalidState {
            operation: "start",
            state: EngineState::Recording
        })
    ));
    assert!(h.session.stop());

    assert_eq!(
        h.drain_events(),
        vec![RecordingEvent::Started, RecordingEvent::Stopped]
    );
    assert_eq!(h.backend.open_count(), 1);
}

#[test]
fn stop_while_idle_is_ignored_without_event() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    assert!(!h.session.stop());
    assert!(h.session.last_recording_path().is_none());
    assert_eq!(h.session.last_recording_size_bytes(), 0);
    assert!(h.drain_events().is_empty());
}

#[test]
fn init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    assert!(h.session.init());
    assert_eq!(h.session.state(), EngineState::Idle);
    assert!(h.session.start());
    assert!(h.session.init());
    assert!(h.session.is_recording());
    assert!(h.session.stop());
}

#[test]
fn disconnect_ends_recording_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    assert!(h.session.start());
    assert_eq!(h.next_event(), RecordingEvent::Started);
    assert_eq!(h.backend.push_chunked(&ramp(2_400), PERIOD_BYTES), 5);
    assert!(h.backend.disconnect("headset unplugged"));

    match h.next_event() {
        RecordingEvent::Error(message) => assert!(message.contains("headset unplugged")),
        other => panic!("expected error event, got {other:?}"),
    }
    wait_until(|| !h.session.is_recording());
    assert_eq!(h.session.state(), EngineState::Idle);

    // Everything delivered before the disconnect is in a finalized file.
    let summary = h.session.last_recording().unwrap();
    assert_eq!(summary.data_bytes, 4_800);
    let reader = hound::WavReader::open(&summary.file_path).unwrap();
    assert_eq!(reader.len(), 2_400);

    // The recording already ended; stop has nothing to do.
    assert!(!h.session.stop());

    // The engine is usable again.
    assert!(h.session.start());
    assert!(h.backend.is_streaming());
    assert!(h.session.stop());
    assert_eq!(h.backend.open_count(), 2);
}

#[test]
fn configure_while_recording_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    let voice = RecordingConfig {
        input_preset: InputPreset::VoiceRecognition,
        sample_rate_hz: 16_000,
        ..Default::default()
    };
    h.session.configure(voice.clone()).unwrap();
    assert!(h.session.start());

    let err = h
        .session
        .configure(RecordingConfig {
            sample_rate_hz: 44_100,
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState {
            operation: "configure",
            state: EngineState::Recording
        }
    );
    assert_eq!(h.session.config().unwrap().requested, voice);

    let params = h.backend.last_params().unwrap();
    assert_eq!(params.sample_rate, 16_000);
    assert_eq!(params.input_preset_code, 6);
    assert!(h.session.stop());
}

#[test]
fn invalid_configure_keeps_previous_config() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    h.session.configure(RecordingConfig::default()).unwrap();
    let err = h
        .session
        .configure(RecordingConfig {
            sample_rate_hz: 4_000,
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Config(ConfigError::OutOfRange {
            field: "sample rate",
            value: 4_000
        })
    );
    assert_eq!(
        h.session.config().unwrap().requested,
        RecordingConfig::default()
    );
}

#[test]
fn release_while_recording_finalizes_file() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    assert!(h.session.start());
    h.feed(&ramp(4_800));
    h.session.release();

    assert_eq!(h.session.state(), EngineState::Released);
    let path = h.session.last_recording_path().unwrap();
    let info = parse_wav_header(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(info.data_size, 9_600);

    // Later calls are no-ops.
    h.session.release();
    assert!(!h.session.init());
    assert!(!h.session.start());
    assert!(!h.session.stop());
    assert!(!h.backend.is_streaming());

    assert_eq!(
        h.events.try_iter().collect::<Vec<_>>(),
        vec![RecordingEvent::Started, RecordingEvent::Stopped]
    );
}

/// Reads diagnostics back through the session while handling `Stopped`.
struct DiagnosticsOnStop {
    session: Weak<CaptureSession<MockBackend>>,
    seen: mpsc::Sender<SessionDiagnostics>,
}

impl RecordingListener for DiagnosticsOnStop {
    fn on_recording_started(&self) {}

    fn on_recording_stopped(&self) {
        if let Some(session) = self.session.upgrade() {
            let _ = self.seen.send(session.diagnostics());
        }
    }

    fn on_recording_error(&self, _message: &str) {}
}

#[test]
fn release_returns_while_listener_calls_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    let session = Arc::new(CaptureSession::with_options(
        backend.clone(),
        EngineOptions {
            default_dir: dir.path().to_path_buf(),
            writer_poll_interval: Duration::from_millis(1),
            ..Default::default()
        },
    ));

    let (seen_tx, seen) = mpsc::channel::<SessionDiagnostics>();
    session.set_listener(Some(Arc::new(DiagnosticsOnStop {
        session: Arc::downgrade(&session),
        seen: seen_tx,
    })));
    assert!(session.init());
    assert!(session.start());
    assert_eq!(backend.push_chunked(&ramp(960), PERIOD_BYTES), 2);

    let (done_tx, done) = mpsc::channel::<()>();
    let releaser = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            session.release();
            let _ = done_tx.send(());
        })
    };

    done.recv_timeout(TIMEOUT)
        .expect("release() did not return");
    releaser.join().unwrap();

    assert_eq!(session.state(), EngineState::Released);
    let diagnostics = seen.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(diagnostics.bytes_written, 1_920);
}

#[test]
fn dropping_session_finalizes_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dropped.wav");
    let backend = MockBackend::new();

    {
        let session = CaptureSession::new(backend.clone());
        assert!(session.init());
        session
            .configure(RecordingConfig {
                output_path: path.display().to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(session.start());
        assert_eq!(backend.push_chunked(&ramp(960), PERIOD_BYTES), 2);
    }

    assert!(!backend.is_streaming());
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.len(), 960);
}

#[test]
fn concurrent_starts_yield_one_recording() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let session = Arc::clone(&h.session);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                session.start()
            })
        })
        .collect();

    let started = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|&ok| ok)
        .count();
    assert_eq!(started, 1);
    assert_eq!(h.backend.open_count(), 1);
    assert!(h.session.stop());

    assert_eq!(
        h.drain_events(),
        vec![RecordingEvent::Started, RecordingEvent::Stopped]
    );
}

#[test]
fn open_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    h.backend
        .fail_next_open(StreamError::OpenFailed("device busy".into()));
    assert!(!h.session.start());
    assert_eq!(h.session.state(), EngineState::Idle);
    match h.next_event() {
        RecordingEvent::Error(message) => assert!(message.contains("device busy")),
        other => panic!("expected error event, got {other:?}"),
    }
    assert!(files_in(dir.path()).is_empty());

    assert!(h.session.start());
    assert!(h.session.stop());
}

#[test]
fn start_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    h.backend
        .fail_next_start(StreamError::StartFailed("permission denied".into()));
    assert!(matches!(
        h.session.try_start(),
        Err(EngineError::Stream(StreamError::StartFailed(_)))
    ));
    assert!(!h.session.is_recording());
    assert!(!h.backend.is_streaming());
    assert!(files_in(dir.path()).is_empty());

    assert_eq!(
        h.drain_events(),
        vec![RecordingEvent::Error(
            "failed to start input stream: permission denied".into()
        )]
    );
}

#[test]
fn unwritable_destination_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());

    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").unwrap();
    h.session
        .configure(RecordingConfig {
            output_path: blocker.join("take.wav").display().to_string(),
            ..Default::default()
        })
        .unwrap();

    assert!(matches!(h.session.try_start(), Err(EngineError::Sink(_))));
    assert_eq!(h.backend.open_count(), 0);
    assert!(matches!(h.next_event(), RecordingEvent::Error(_)));
}

#[test]
fn negotiated_rate_is_patched_into_header() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());
    h.backend.negotiate_sample_rate(44_100);

    assert!(h.session.start());
    h.feed(&ramp(4_410));
    assert!(h.session.stop());

    let summary = h.session.last_recording().unwrap();
    assert_eq!(summary.format.sample_rate, 44_100);
    let reader = hound::WavReader::open(&summary.file_path).unwrap();
    assert_eq!(reader.spec().sample_rate, 44_100);
    assert_eq!(reader.len(), 4_410);
}

#[test]
fn channel_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());
    h.backend.negotiate_format(PcmFormat::new(48_000, 2, 16));

    assert!(matches!(
        h.session.try_start(),
        Err(EngineError::Stream(StreamError::FormatMismatch {
            requested_channels: 1,
            actual_channels: 2,
            ..
        }))
    ));
    assert!(files_in(dir.path()).is_empty());
    assert!(matches!(h.next_event(), RecordingEvent::Error(_)));
}

#[test]
fn size_limit_ends_recording() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        EngineOptions {
            max_data_bytes: 9_600,
            ..Default::default()
        },
    );

    assert!(h.session.start());
    assert_eq!(h.next_event(), RecordingEvent::Started);
    h.backend.push_chunked(&ramp(9_600), PERIOD_BYTES);

    match h.next_event() {
        RecordingEvent::Error(message) => assert!(message.contains("size limit")),
        other => panic!("expected error event, got {other:?}"),
    }
    wait_until(|| !h.session.is_recording());
    assert_eq!(h.session.last_recording().unwrap().data_bytes, 9_600);
}

#[test]
fn explicit_file_path_and_metadata_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        EngineOptions {
            write_metadata: true,
            ..Default::default()
        },
    );
    let path = dir.path().join("sessions").join("take.wav");

    h.session
        .configure(RecordingConfig {
            input_preset: InputPreset::Unprocessed,
            channel_count: 2,
            bit_depth: 24,
            output_path: path.display().to_string(),
            ..Default::default()
        })
        .unwrap();
    assert!(h.session.start());
    // 100 stereo 24-bit frames
    h.backend.push_frames(&[0u8; 600]);
    wait_until(|| h.session.diagnostics().bytes_written == 600);
    assert!(h.session.stop());

    assert_eq!(h.session.last_recording_path(), Some(path.clone()));
    assert_eq!(h.session.last_recording_size_bytes(), 644);

    let metadata = read_metadata(&path).unwrap();
    let summary = h.session.last_recording().unwrap();
    assert_eq!(metadata.checksum, summary.checksum);
    assert_eq!(metadata.input_preset, InputPreset::Unprocessed);
    assert_eq!(metadata.format, PcmFormat::new(48_000, 2, 24));
    assert_eq!(metadata.data_bytes, 600);
}

#[test]
fn works_through_control_trait() {
    let dir = tempfile::tempdir().unwrap();
    let h = default_harness(dir.path());
    let control: &dyn RecorderControl = &*h.session;

    assert!(control.init());
    control.configure(RecordingConfig::default()).unwrap();
    assert!(control.start());
    assert!(control.is_recording());
    assert!(control.stop());
    assert!(!control.is_recording());
    assert_eq!(control.last_recording_size_bytes(), 44);
    control.release();
    assert_eq!(h.session.state(), EngineState::Released);
}
