use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};

use crate::models::error::EngineError;
use crate::models::event::RecordingEvent;
use crate::traits::recording_listener::RecordingListener;

type SharedListener = Arc<RwLock<Option<Arc<dyn RecordingListener>>>>;

/// Delivers [`RecordingEvent`]s to the listener on a dedicated thread.
///
/// `notify` only enqueues, so a slow or panicking listener never stalls the
/// engine. Events are delivered in the order they were enqueued.
pub struct EventNotifier {
    listener: SharedListener,
    sender: Mutex<Option<Sender<RecordingEvent>>>,
    dispatcher: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self {
            listener: Arc::new(RwLock::new(None)),
            sender: Mutex::new(None),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn RecordingListener>>) {
        *self.listener.write() = listener;
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Spawn the dispatcher thread. No-op if it is already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut sender = self.sender.lock();
        if sender.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<RecordingEvent>();
        let listener = Arc::clone(&self.listener);

        let handle = thread::Builder::new()
            .name("recorder-events".into())
            .spawn(move || {
                for event in rx {
                    dispatch(&listener, &event);
                }
                log::debug!("event dispatcher exiting");
            })
            .map_err(|e| {
                log::error!("failed to spawn event dispatcher: {}", e);
                EngineError::ThreadSpawn("recorder-events")
            })?;

        *sender = Some(tx);
        *self.dispatcher.lock() = Some(handle);
        Ok(())
    }

    /// Queue an event for the listener. Never blocks on listener code.
    pub fn notify(&self, event: RecordingEvent) {
        match self.sender.lock().as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    log::warn!("event dispatcher is gone; event discarded");
                }
            }
            None => log::debug!("dispatcher not running; discarding {:?}", event),
        }
    }

    /// Deliver every queued event, then stop the dispatcher thread.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let Some(handle) = self.dispatcher.lock().take() else {
            return;
        };
        // A listener that releases the engine from inside a callback would
        // otherwise join its own thread.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("event dispatcher panicked");
        }
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(listener: &SharedListener, event: &RecordingEvent) {
    let Some(listener) = listener.read().clone() else {
        log::info!("recording event (no listener): {:?}", event);
        return;
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| match event {
        RecordingEvent::Started => listener.on_recording_started(),
        RecordingEvent::Stopped => listener.on_recording_stopped(),
        RecordingEvent::Error(message) => listener.on_recording_error(message),
    }));
    if result.is_err() {
        log::error!("recording listener panicked handling {:?}", event);
    }
}
