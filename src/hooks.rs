use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run the configured transcription hook with the text on stdin.
///
/// Fire-and-forget: hook failures are logged and never reach the recorder
/// workflow.
pub fn run_transcription_hook(command: &str, text: &str) {
    let command = command.to_owned();
    let text = text.to_owned();

    tokio::spawn(async move {
        tracing::debug!("Running transcription hook: {command}");

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to spawn transcription hook: {e}");
                return;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                tracing::warn!("Failed to write to transcription hook: {e}");
            }
        }

        match child.wait_with_output().await {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!(
                    "Transcription hook exited with {}: {}",
                    output.status,
                    stderr.trim()
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to wait on transcription hook: {e}"),
        }
    });
}
