use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Capture engine state machine.
///
/// State transitions:
/// ```text
/// uninitialized → idle ⇄ recording
///                   ↓        ↓
///                released ←──┘
/// ```
///
/// Failures never park the engine in an intermediate state: a failed start or
/// a mid-recording fault resolves to `Idle` and is reported as an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Idle = 1,
    Recording = 2,
    Released = 3,
}

impl EngineState {
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_released(self) -> bool {
        matches!(self, Self::Released)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Idle,
            2 => Self::Recording,
            3 => Self::Released,
            _ => Self::Uninitialized,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

/// [`EngineState`] shared between the control, writer, and stream threads.
///
/// Loads use `Acquire` and stores use `Release`, so a transition published by
/// `start()`/`stop()` is visible to the other threads together with every
/// write that preceded it.
#[derive(Debug)]
pub struct AtomicEngineState(AtomicU8);

impl AtomicEngineState {
    pub fn new(state: EngineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `current` to `new` only if no other thread got there first.
    pub fn transition(&self, current: EngineState, new: EngineState) -> bool {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
