use std::sync::mpsc::Sender;

use crate::models::event::RecordingEvent;

/// Receives recording lifecycle notifications.
///
/// All methods are called from the engine's event dispatcher thread, never
/// from the audio callback or the caller of `start()`/`stop()`. Implementations
/// should marshal to the UI thread if needed. Panics are caught and logged.
pub trait RecordingListener: Send + Sync {
    fn on_recording_started(&self);

    fn on_recording_stopped(&self);

    /// Called when a recording fails to start or ends because of a fault.
    fn on_recording_error(&self, message: &str);
}

/// Forwards every event into a channel.
impl RecordingListener for Sender<RecordingEvent> {
    fn on_recording_started(&self) {
        let _ = self.send(RecordingEvent::Started);
    }

    fn on_recording_stopped(&self) {
        let _ = self.send(RecordingEvent::Stopped);
    }

    fn on_recording_error(&self, message: &str) {
        let _ = self.send(RecordingEvent::Error(message.to_string()));
    }
}
