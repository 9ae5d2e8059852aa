//! Presentation seam for the status overlay.
//!
//! Visibility is derived from the recorder state rather than tracked as a
//! separate flag: the overlay is visible exactly when the recorder is not
//! idle. Actual rendering lives outside this daemon; here every published
//! state change is turned into a render notification.

use tokio::sync::watch;

use crate::machine::RecorderState;

/// The overlay is shown whenever something is happening.
pub fn visible(state: RecorderState) -> bool {
    state != RecorderState::Idle
}

/// Consume published recorder states until the orchestrator goes away.
pub async fn run(mut state_rx: watch::Receiver<RecorderState>) {
    loop {
        let state = *state_rx.borrow_and_update();
        render(state);
        if state_rx.changed().await.is_err() {
            break;
        }
    }
}

fn render(state: RecorderState) {
    if visible(state) {
        match state {
            RecorderState::Error => tracing::warn!("Overlay: error indicator shown"),
            _ => tracing::info!("Overlay: {state}"),
        }
    } else {
        tracing::info!("Overlay hidden");
    }
}
