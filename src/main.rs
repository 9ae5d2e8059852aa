mod app;
mod backend;
mod config;
mod hooks;
mod machine;
mod overlay;
mod shortcuts;

use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

use app::{App, SettingsChange};
use backend::{DictationBackend, HttpBackend};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting whisperkey voice dictation daemon");

    let config = Config::load()?;
    config.validate()?;

    let backend: Arc<dyn DictationBackend> =
        Arc::new(HttpBackend::new(&config.backend_url, config.timeout)?);

    // Startup connectivity indicator; never touches recorder state.
    match backend.health().await {
        Ok(()) => tracing::info!("Transcription backend connected: {}", config.backend_url),
        Err(e) => tracing::warn!("Transcription backend unreachable: {e}"),
    }

    let (shortcut_tx, shortcut_rx) = mpsc::channel(10);
    match shortcuts::parse_shortcut(&config.hotkey)
        .and_then(|keys| shortcuts::monitor_keyboards(keys, shortcut_tx))
    {
        Ok(()) => tracing::info!("Ready! Press {} to start/stop recording", config.hotkey),
        // Registration failure is surfaced but not fatal; the daemon runs
        // without a hotkey until the config is fixed.
        Err(e) => tracing::error!("Hotkey registration failed: {e}"),
    }

    let (settings_tx, settings_rx) = mpsc::channel(4);
    tokio::spawn(watch_config_reload(settings_tx));

    let (app, state_rx) = App::new(backend, &config, shortcut_rx, settings_rx);
    tokio::spawn(overlay::run(state_rx));

    app.run().await?;

    tracing::info!("whisperkey shutdown complete");
    Ok(())
}

/// Reload the config file on SIGHUP and forward the language preference to
/// the running orchestrator.
async fn watch_config_reload(settings_tx: mpsc::Sender<SettingsChange>) {
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Failed to install SIGHUP handler: {e}");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        match Config::load() {
            Ok(config) => {
                tracing::info!("Config reloaded");
                if settings_tx
                    .send(SettingsChange::Language(config.language))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => tracing::warn!("Config reload failed: {e}"),
        }
    }
}
