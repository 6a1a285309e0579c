/// Notifications delivered to the [`RecordingListener`](crate::RecordingListener).
///
/// For a single recording, `Started` always precedes the `Stopped` or `Error`
/// that ends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingEvent {
    Started,
    Stopped,
    Error(String),
}
