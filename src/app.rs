//! Recorder orchestrator.
//!
//! Binds the state machine to real-world effects: backend capture calls,
//! the transcription workflow, overlay state publishing, and the timed
//! auto-recovery out of the error state.
//!
//! All state mutations happen on the `run` loop. Hotkey presses, workflow
//! outcomes, recovery-timer firings and settings changes arrive as channel
//! messages and are applied one at a time, so no two transitions can ever
//! be computed from a stale state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};

use crate::backend::{BackendError, DictationBackend, Transcription};
use crate::config::Config;
use crate::hooks;
use crate::machine::{RecorderEvent, RecorderMachine, RecorderState};

/// How long the error state is shown before the recorder resets itself.
const RECOVERY_DELAY: Duration = Duration::from_secs(2);

/// Settings updates pushed into the orchestrator while it is running.
#[derive(Debug)]
pub enum SettingsChange {
    Language(String),
}

type WorkflowOutcome = Result<Transcription, BackendError>;

pub struct App {
    machine: RecorderMachine,
    backend: Arc<dyn DictationBackend>,
    language: String,
    transcription_hook: Option<String>,
    state_tx: watch::Sender<RecorderState>,
    shortcut_rx: mpsc::Receiver<()>,
    settings_rx: mpsc::Receiver<SettingsChange>,
    outcome_tx: mpsc::Sender<WorkflowOutcome>,
    outcome_rx: mpsc::Receiver<WorkflowOutcome>,
    recovery_tx: mpsc::Sender<u64>,
    recovery_rx: mpsc::Receiver<u64>,
    /// Counts entries into the error state so a stale recovery timer can be
    /// told apart from the one belonging to the current episode.
    error_episode: u64,
}

impl App {
    pub fn new(
        backend: Arc<dyn DictationBackend>,
        config: &Config,
        shortcut_rx: mpsc::Receiver<()>,
        settings_rx: mpsc::Receiver<SettingsChange>,
    ) -> (Self, watch::Receiver<RecorderState>) {
        let (state_tx, state_rx) = watch::channel(RecorderState::Idle);
        let (outcome_tx, outcome_rx) = mpsc::channel(1);
        let (recovery_tx, recovery_rx) = mpsc::channel(4);

        let app = Self {
            machine: RecorderMachine::new(),
            backend,
            language: config.language.clone(),
            transcription_hook: config.transcription_hook.clone(),
            state_tx,
            shortcut_rx,
            settings_rx,
            outcome_tx,
            outcome_rx,
            recovery_tx,
            recovery_rx,
            error_episode: 0,
        };
        (app, state_rx)
    }

    pub fn state(&self) -> RecorderState {
        self.machine.state()
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                Some(_) = self.shortcut_rx.recv() => {
                    self.handle_toggle().await;
                }
                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_outcome(outcome);
                }
                Some(episode) = self.recovery_rx.recv() => {
                    self.handle_recovery(episode);
                }
                Some(change) = self.settings_rx.recv() => {
                    self.apply_settings(change);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// One hotkey press. Side effects are gated on the (previous, next)
    /// pair so a press can never double-start capture or re-run a
    /// workflow that is already in flight.
    async fn handle_toggle(&mut self) {
        let previous = self.machine.state();
        let next = self.machine.transition(RecorderEvent::ToggleRecord);
        self.publish(next);

        match (previous, next) {
            (RecorderState::Idle, RecorderState::Recording) => {
                tracing::info!("Starting recording");
                if let Err(e) = self.backend.start_capture().await {
                    tracing::error!("{e}");
                    self.enter_error();
                }
            }
            (RecorderState::Recording, RecorderState::Processing) => {
                tracing::info!("Stopping recording");
                self.spawn_workflow();
            }
            (RecorderState::Error, RecorderState::Idle) => {
                tracing::info!("Error state cleared by toggle");
            }
            _ => {
                tracing::debug!("Toggle ignored in state {next}");
            }
        }
    }

    /// Stop capture and transcribe, off the orchestrator loop. The loop
    /// stays responsive while the workflow runs; further toggles self-loop
    /// in the processing state and are swallowed.
    fn spawn_workflow(&self) {
        let backend = Arc::clone(&self.backend);
        let language = self.language.clone();
        let outcome_tx = self.outcome_tx.clone();

        tokio::spawn(async move {
            let outcome = async {
                let audio = backend.stop_capture().await?;
                backend.transcribe(&audio, &language).await
            }
            .await;
            let _ = outcome_tx.send(outcome).await;
        });
    }

    fn handle_outcome(&mut self, outcome: WorkflowOutcome) {
        match outcome {
            Ok(result) => {
                let next = self.machine.transition(RecorderEvent::ProcessingComplete);
                self.publish(next);
                if let Some(language) = &result.language {
                    tracing::debug!("Detected language: {language}");
                }
                tracing::info!("Transcription: {}", result.text);
                if let Some(command) = &self.transcription_hook {
                    hooks::run_transcription_hook(command, &result.text);
                }
            }
            Err(e) => {
                tracing::error!("{e}");
                self.enter_error();
            }
        }
    }

    /// Transition to error and arm the one-shot recovery timer for this
    /// episode. The timer message carries the episode number; if the state
    /// has moved on by the time it fires, `handle_recovery` drops it.
    fn enter_error(&mut self) {
        let next = self.machine.transition(RecorderEvent::Error);
        self.publish(next);

        self.error_episode += 1;
        let episode = self.error_episode;
        let recovery_tx = self.recovery_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RECOVERY_DELAY).await;
            let _ = recovery_tx.send(episode).await;
        });
    }

    fn handle_recovery(&mut self, episode: u64) {
        if self.machine.state() != RecorderState::Error || episode != self.error_episode {
            tracing::debug!("Stale recovery timer ignored (episode {episode})");
            return;
        }
        let next = self.machine.transition(RecorderEvent::ToggleRecord);
        self.publish(next);
        tracing::info!("Auto-recovered from error state");
    }

    fn apply_settings(&mut self, change: SettingsChange) {
        match change {
            SettingsChange::Language(language) => {
                tracing::info!("Language preference updated: {language}");
                self.language = language;
            }
        }
    }

    fn publish(&self, state: RecorderState) {
        tracing::debug!("State: {state}");
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CapturedAudio;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Start,
        Stop,
        Transcribe(String),
    }

    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<Call>>,
        fail_start: bool,
        fail_stop: bool,
        fail_transcribe: bool,
    }

    impl MockBackend {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DictationBackend for MockBackend {
        async fn start_capture(&self) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(Call::Start);
            if self.fail_start {
                return Err(BackendError::CaptureStart("no microphone".into()));
            }
            Ok(())
        }

        async fn stop_capture(&self) -> Result<CapturedAudio, BackendError> {
            self.calls.lock().unwrap().push(Call::Stop);
            if self.fail_stop {
                return Err(BackendError::CaptureStop("not recording".into()));
            }
            Ok(CapturedAudio::new("/tmp/rec-0001.wav".into()))
        }

        async fn transcribe(
            &self,
            _audio: &CapturedAudio,
            language: &str,
        ) -> Result<Transcription, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Transcribe(language.to_string()));
            if self.fail_transcribe {
                return Err(BackendError::Transcription("model error".into()));
            }
            Ok(Transcription {
                text: "hello world".into(),
                language: Some("en".into()),
                duration: Some(1.2),
            })
        }

        async fn health(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    struct TestHarness {
        app: App,
        state_rx: watch::Receiver<RecorderState>,
        _shortcut_tx: mpsc::Sender<()>,
        _settings_tx: mpsc::Sender<SettingsChange>,
    }

    fn test_app(backend: Arc<MockBackend>, language: &str) -> TestHarness {
        let config = Config {
            language: language.to_string(),
            ..Config::default()
        };
        let (shortcut_tx, shortcut_rx) = mpsc::channel(4);
        let (settings_tx, settings_rx) = mpsc::channel(4);
        let (app, state_rx) = App::new(backend, &config, shortcut_rx, settings_rx);
        TestHarness {
            app,
            state_rx,
            _shortcut_tx: shortcut_tx,
            _settings_tx: settings_tx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_toggle_record_transcribe() {
        let backend = Arc::new(MockBackend::default());
        let mut h = test_app(Arc::clone(&backend), "en");

        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Recording);
        assert_eq!(*h.state_rx.borrow(), RecorderState::Recording);

        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Processing);

        let outcome = h.app.outcome_rx.recv().await.unwrap();
        h.app.handle_outcome(outcome);
        assert_eq!(h.app.state(), RecorderState::Idle);
        assert_eq!(*h.state_rx.borrow(), RecorderState::Idle);

        assert_eq!(
            backend.calls(),
            vec![Call::Start, Call::Stop, Call::Transcribe("en".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_during_processing_is_swallowed() {
        let backend = Arc::new(MockBackend::default());
        let mut h = test_app(Arc::clone(&backend), "auto");

        h.app.handle_toggle().await;
        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Processing);

        // Extra presses while the workflow is in flight change nothing.
        h.app.handle_toggle().await;
        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Processing);

        let outcome = h.app.outcome_rx.recv().await.unwrap();
        h.app.handle_outcome(outcome);
        assert_eq!(h.app.state(), RecorderState::Idle);

        // Exactly one stop and one transcribe despite four presses.
        assert_eq!(
            backend.calls(),
            vec![Call::Start, Call::Stop, Call::Transcribe("auto".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_enters_error_then_auto_recovers() {
        let backend = Arc::new(MockBackend {
            fail_start: true,
            ..Default::default()
        });
        let mut h = test_app(Arc::clone(&backend), "auto");

        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Error);
        assert_eq!(*h.state_rx.borrow(), RecorderState::Error);

        // No stop is attempted for a capture that never started.
        assert_eq!(backend.calls(), vec![Call::Start]);

        // Paused time fast-forwards through the 2s recovery delay.
        let episode = h.app.recovery_rx.recv().await.unwrap();
        h.app.handle_recovery(episode);
        assert_eq!(h.app.state(), RecorderState::Idle);
        assert_eq!(*h.state_rx.borrow(), RecorderState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn transcription_failure_enters_error() {
        let backend = Arc::new(MockBackend {
            fail_transcribe: true,
            ..Default::default()
        });
        let mut h = test_app(Arc::clone(&backend), "auto");

        h.app.handle_toggle().await;
        h.app.handle_toggle().await;
        let outcome = h.app.outcome_rx.recv().await.unwrap();
        h.app.handle_outcome(outcome);
        assert_eq!(h.app.state(), RecorderState::Error);

        let episode = h.app.recovery_rx.recv().await.unwrap();
        h.app.handle_recovery(episode);
        assert_eq!(h.app.state(), RecorderState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_toggle_cancels_pending_recovery() {
        let backend = Arc::new(MockBackend {
            fail_stop: true,
            ..Default::default()
        });
        let mut h = test_app(Arc::clone(&backend), "auto");

        h.app.handle_toggle().await;
        h.app.handle_toggle().await;
        let outcome = h.app.outcome_rx.recv().await.unwrap();
        h.app.handle_outcome(outcome);
        assert_eq!(h.app.state(), RecorderState::Error);

        // Manual toggle before the timer elapses resets to idle.
        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Idle);
        assert_eq!(*h.state_rx.borrow_and_update(), RecorderState::Idle);

        // The stale timer still fires but must be a no-op.
        let episode = h.app.recovery_rx.recv().await.unwrap();
        h.app.handle_recovery(episode);
        assert_eq!(h.app.state(), RecorderState::Idle);
        assert!(
            !h.state_rx.has_changed().unwrap(),
            "stale timer must not publish"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_from_older_episode_is_ignored() {
        let backend = Arc::new(MockBackend {
            fail_start: true,
            ..Default::default()
        });
        let mut h = test_app(Arc::clone(&backend), "auto");

        // First error episode, cleared manually.
        h.app.handle_toggle().await;
        let first = h.app.recovery_rx.recv().await.unwrap();
        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Idle);

        // Second error episode; the first episode's timer must not clear
        // it ahead of its own.
        h.app.handle_toggle().await;
        assert_eq!(h.app.state(), RecorderState::Error);
        h.app.handle_recovery(first);
        assert_eq!(h.app.state(), RecorderState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_updates_transcription_language() {
        let backend = Arc::new(MockBackend::default());
        let mut h = test_app(Arc::clone(&backend), "auto");

        h.app
            .apply_settings(SettingsChange::Language("ru".into()));

        h.app.handle_toggle().await;
        h.app.handle_toggle().await;
        let outcome = h.app.outcome_rx.recv().await.unwrap();
        h.app.handle_outcome(outcome);

        assert_eq!(
            backend.calls(),
            vec![Call::Start, Call::Stop, Call::Transcribe("ru".into())]
        );
    }
}
