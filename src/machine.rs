//! Recorder lifecycle state machine.
//!
//! Pure transitions between Idle, Recording, Processing and Error. The
//! orchestrator in `app` owns an instance and is the only writer; everything
//! it does to the outside world is gated on what `transition` returns.

/// The four states of the recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Waiting for the hotkey.
    Idle,
    /// Microphone capture is running on the backend.
    Recording,
    /// Capture stopped, transcription in flight.
    Processing,
    /// A workflow step failed; cleared by auto-recovery or a manual toggle.
    Error,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderState::Idle => write!(f, "idle"),
            RecorderState::Recording => write!(f, "recording"),
            RecorderState::Processing => write!(f, "processing"),
            RecorderState::Error => write!(f, "error"),
        }
    }
}

/// Stimuli fed to the machine. Consumed immediately, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    /// One physical hotkey press. Meaning depends on the current state:
    /// start when idle, stop when recording, reset when errored.
    ToggleRecord,
    StartRecord,
    StopRecord,
    ProcessingStart,
    ProcessingComplete,
    Error,
}

/// The state machine: one private state cell, mutated only by `transition`.
pub struct RecorderMachine {
    state: RecorderState,
}

impl RecorderMachine {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Apply an event and return the new state. Total and infallible:
    /// unlisted (state, event) pairs are self-loops.
    pub fn transition(&mut self, event: RecorderEvent) -> RecorderState {
        self.state = next_state(self.state, event);
        self.state
    }
}

impl Default for RecorderMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn next_state(current: RecorderState, event: RecorderEvent) -> RecorderState {
    use RecorderEvent as E;
    use RecorderState as S;

    match current {
        S::Idle => match event {
            E::StartRecord | E::ToggleRecord => S::Recording,
            _ => current,
        },
        S::Recording => match event {
            E::StopRecord | E::ToggleRecord => S::Processing,
            E::Error => S::Error,
            _ => current,
        },
        S::Processing => match event {
            E::ProcessingComplete => S::Idle,
            E::Error => S::Error,
            _ => current,
        },
        S::Error => match event {
            E::StartRecord => S::Recording,
            E::ToggleRecord => S::Idle,
            _ => current,
        },
    }
}
