//! # mic-recorder-core
//!
//! Platform-agnostic microphone capture engine.
//!
//! Resolves recording presets, moves captured PCM from a real-time callback
//! through a lock-free ring buffer into a WAV file, and runs the
//! start/stop/error state machine. Platform backends (cpal) implement the
//! `StreamBackend` trait and plug into the generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! mic-recorder-core (this crate)
//! ├── traits/       ← StreamBackend, HardwareStream, RecordingListener, RecorderControl
//! ├── models/       ← RecordingConfig, EngineState, RecordingEvent, errors, PcmFormat, etc.
//! ├── processing/   ← frame ring buffer, WAV header generation
//! ├── session/      ← ConfigResolver, CaptureSession, EventNotifier, writer thread
//! ├── storage/      ← FileSink, metadata sidecar
//! └── mock          ← MockBackend (no hardware)
//! ```

pub mod mock;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use mock::{MockBackend, MockStream};
pub use models::audio_models::{PcmFormat, SessionDiagnostics};
pub use models::config::{
    EngineOptions, InputPreset, PerformanceMode, RecordingConfig, ResolvedConfig, SharingMode,
};
pub use models::error::{ConfigError, EngineError, SinkError, StreamError};
pub use models::event::RecordingEvent;
pub use models::recording_result::{RecordingMetadata, RecordingSummary};
pub use models::state::EngineState;
pub use processing::ring_buffer::{frame_ring, FrameConsumer, FrameProducer, RingStats};
pub use session::capture::CaptureSession;
pub use session::notifier::EventNotifier;
pub use session::resolver::ConfigResolver;
pub use storage::file_sink::{FileSink, SinkSummary};
pub use traits::recorder_control::RecorderControl;
pub use traits::recording_listener::RecordingListener;
pub use traits::stream_backend::{
    FrameCallback, HardwareStream, StreamBackend, StreamErrorCallback, StreamParams,
};
