pub mod recorder_control;
pub mod recording_listener;
pub mod stream_backend;
