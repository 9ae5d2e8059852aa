//! Global hotkey binding via evdev.
//!
//! Parses a free-text combo like "Ctrl+Shift+D" and watches every keyboard
//! device for the moment all combo keys are held. Each activation sends `()`
//! on the channel; the orchestrator treats it as one toggle.

use std::collections::HashSet;

use evdev::{Device, EventSummary, KeyCode};
use thiserror::Error;
use tokio::sync::mpsc;

/// Hotkey registration failures. Surfaced to the user at startup; the
/// daemon keeps running without a hotkey.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("empty hotkey combo")]
    EmptyCombo,
    #[error("unknown key in hotkey combo: {0:?}")]
    UnknownKey(String),
    #[error("no readable keyboard devices found (is the user in the `input` group?)")]
    NoKeyboards,
}

const LETTER_KEYS: [KeyCode; 26] = [
    KeyCode::KEY_A,
    KeyCode::KEY_B,
    KeyCode::KEY_C,
    KeyCode::KEY_D,
    KeyCode::KEY_E,
    KeyCode::KEY_F,
    KeyCode::KEY_G,
    KeyCode::KEY_H,
    KeyCode::KEY_I,
    KeyCode::KEY_J,
    KeyCode::KEY_K,
    KeyCode::KEY_L,
    KeyCode::KEY_M,
    KeyCode::KEY_N,
    KeyCode::KEY_O,
    KeyCode::KEY_P,
    KeyCode::KEY_Q,
    KeyCode::KEY_R,
    KeyCode::KEY_S,
    KeyCode::KEY_T,
    KeyCode::KEY_U,
    KeyCode::KEY_V,
    KeyCode::KEY_W,
    KeyCode::KEY_X,
    KeyCode::KEY_Y,
    KeyCode::KEY_Z,
];

const DIGIT_KEYS: [KeyCode; 10] = [
    KeyCode::KEY_0,
    KeyCode::KEY_1,
    KeyCode::KEY_2,
    KeyCode::KEY_3,
    KeyCode::KEY_4,
    KeyCode::KEY_5,
    KeyCode::KEY_6,
    KeyCode::KEY_7,
    KeyCode::KEY_8,
    KeyCode::KEY_9,
];

const FUNCTION_KEYS: [KeyCode; 12] = [
    KeyCode::KEY_F1,
    KeyCode::KEY_F2,
    KeyCode::KEY_F3,
    KeyCode::KEY_F4,
    KeyCode::KEY_F5,
    KeyCode::KEY_F6,
    KeyCode::KEY_F7,
    KeyCode::KEY_F8,
    KeyCode::KEY_F9,
    KeyCode::KEY_F10,
    KeyCode::KEY_F11,
    KeyCode::KEY_F12,
];

/// Parse a combo string into the set of keys that must be held together.
pub fn parse_shortcut(combo: &str) -> Result<Vec<KeyCode>, RegistrationError> {
    let mut keys = Vec::new();
    for token in combo.split('+').map(str::trim).filter(|t| !t.is_empty()) {
        let key =
            key_for_token(token).ok_or_else(|| RegistrationError::UnknownKey(token.to_string()))?;
        keys.push(key);
    }
    if keys.is_empty() {
        return Err(RegistrationError::EmptyCombo);
    }
    Ok(keys)
}

fn key_for_token(token: &str) -> Option<KeyCode> {
    let lower = token.to_ascii_lowercase();
    match lower.as_str() {
        "ctrl" | "control" => return Some(KeyCode::KEY_LEFTCTRL),
        "shift" => return Some(KeyCode::KEY_LEFTSHIFT),
        "alt" => return Some(KeyCode::KEY_LEFTALT),
        "super" | "meta" | "logo" | "win" => return Some(KeyCode::KEY_LEFTMETA),
        "space" => return Some(KeyCode::KEY_SPACE),
        "tab" => return Some(KeyCode::KEY_TAB),
        "enter" | "return" => return Some(KeyCode::KEY_ENTER),
        "esc" | "escape" => return Some(KeyCode::KEY_ESC),
        _ => {}
    }

    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            return Some(LETTER_KEYS[(c as u8 - b'a') as usize]);
        }
        if c.is_ascii_digit() {
            return Some(DIGIT_KEYS[(c as u8 - b'0') as usize]);
        }
    }

    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<usize>().ok()) {
        if (1..=12).contains(&n) {
            return Some(FUNCTION_KEYS[n - 1]);
        }
    }

    None
}

/// Watch all keyboards for the combo and send `()` on each activation.
///
/// One task per device; a device that goes away stops its task, the rest
/// keep running.
pub fn monitor_keyboards(
    targets: Vec<KeyCode>,
    tx: mpsc::Sender<()>,
) -> Result<(), RegistrationError> {
    let keyboards: Vec<_> = evdev::enumerate()
        .filter(|(_, device)| is_keyboard(device))
        .collect();

    if keyboards.is_empty() {
        return Err(RegistrationError::NoKeyboards);
    }

    for (path, device) in keyboards {
        tracing::debug!("Watching keyboard: {:?}", path);
        tokio::spawn(watch_device(device, targets.clone(), tx.clone()));
    }

    Ok(())
}

fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(KeyCode::KEY_ENTER))
}

async fn watch_device(device: Device, targets: Vec<KeyCode>, tx: mpsc::Sender<()>) {
    let mut stream = match device.into_event_stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Failed to open keyboard event stream: {e}");
            return;
        }
    };

    let mut pressed: HashSet<KeyCode> = HashSet::new();

    loop {
        let event = match stream.next_event().await {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Keyboard event stream closed: {e}");
                return;
            }
        };

        if let EventSummary::Key(_, code, value) = event.destructure() {
            match value {
                // Fire on the press that completes the combo; key repeats
                // (value 2) never re-trigger.
                1 => {
                    pressed.insert(code);
                    if targets.contains(&code) && targets.iter().all(|k| pressed.contains(k)) {
                        tracing::debug!("Hotkey activated");
                        if tx.send(()).await.is_err() {
                            return;
                        }
                    }
                }
                0 => {
                    pressed.remove(&code);
                }
                _ => {}
            }
        }
    }
}
