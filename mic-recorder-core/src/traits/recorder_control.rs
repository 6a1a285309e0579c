use std::path::PathBuf;

use crate::models::config::RecordingConfig;
use crate::models::error::EngineError;

/// Command surface for the control layer (UI glue, CLI, JNI shim).
///
/// Transitions: uninitialized → idle ⇄ recording → released.
/// Every method may be called from any thread; calls are serialized.
pub trait RecorderControl: Send + Sync {
    /// Prepare the engine. Idempotent.
    fn init(&self) -> bool;

    /// Replace the recording configuration. Only allowed while idle.
    fn configure(&self, config: RecordingConfig) -> Result<(), EngineError>;

    /// Begin a recording. Returns `false` if one is already running.
    fn start(&self) -> bool;

    /// End the current recording. Returns `false` if none is running.
    fn stop(&self) -> bool;

    /// Stop if needed and free everything. Later calls are no-ops.
    fn release(&self);

    fn is_recording(&self) -> bool;

    /// Path of the most recently finished recording.
    fn last_recording_path(&self) -> Option<PathBuf>;

    /// Size in bytes (header included) of the most recently finished
    /// recording, or 0 if there is none.
    fn last_recording_size_bytes(&self) -> i64;
}
