//! Global shortcut that triggers an immediate probe from whichever
//! application holds the selection.

use anyhow::{anyhow, Result};
use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use log::{debug, info};
use tokio::sync::mpsc;

use crate::app::{UiEvent, UserCommand};

/// Registered probe shortcut. Unregisters itself when dropped.
pub struct ProbeShortcut {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
}

pub fn parse_shortcut(spec: &str) -> Result<HotKey> {
    spec.parse::<HotKey>()
        .map_err(|e| anyhow!("Failed to parse shortcut {spec:?}: {e:?}"))
}

/// Registers `spec` system-wide and posts [`UserCommand::ProbeNow`] into the
/// UI queue on every press.
pub fn register_probe_shortcut(
    spec: &str,
    events: mpsc::UnboundedSender<UiEvent>,
) -> Result<ProbeShortcut> {
    let hotkey = parse_shortcut(spec)?;
    let manager = GlobalHotKeyManager::new()
        .map_err(|e| anyhow!("Failed to set up global shortcuts: {e}"))?;

    if let Err(e) = manager.register(hotkey) {
        return Err(anyhow!("Failed to register shortcut {spec}: {e}"));
    }

    let id = hotkey.id();
    GlobalHotKeyEvent::set_event_handler(Some(move |event: GlobalHotKeyEvent| {
        forward_press(id, event.id, event.state, &events);
    }));

    info!("probe shortcut {spec} registered");
    Ok(ProbeShortcut { manager, hotkey })
}

/// Only presses of our own shortcut count; releases and other ids are ignored.
fn forward_press(
    ours: u32,
    id: u32,
    state: HotKeyState,
    events: &mpsc::UnboundedSender<UiEvent>,
) -> bool {
    if id != ours || state != HotKeyState::Pressed {
        return false;
    }
    debug!("probe shortcut pressed");
    events.send(UiEvent::Command(UserCommand::ProbeNow)).is_ok()
}

impl Drop for ProbeShortcut {
    fn drop(&mut self) {
        GlobalHotKeyEvent::set_event_handler(None::<fn(GlobalHotKeyEvent)>);
        if let Err(e) = self.manager.unregister(self.hotkey) {
            debug!("failed to unregister probe shortcut: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use global_hotkey::hotkey::{Code, Modifiers};

    #[test]
    fn test_default_shortcut_parses() {
        let hotkey = parse_shortcut("Ctrl+Alt+Q").unwrap();
        assert_eq!(
            hotkey,
            HotKey::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::KeyQ)
        );
    }

    #[test]
    fn test_malformed_shortcut_is_an_error() {
        assert!(parse_shortcut("Ctrl+Alt+NotAKey").is_err());
    }

    #[test]
    fn test_only_our_presses_are_forwarded() {
        let hotkey = parse_shortcut("Ctrl+Alt+Q").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!forward_press(hotkey.id(), hotkey.id(), HotKeyState::Released, &tx));
        assert!(!forward_press(hotkey.id(), hotkey.id().wrapping_add(1), HotKeyState::Pressed, &tx));
        assert!(rx.try_recv().is_err());

        assert!(forward_press(hotkey.id(), hotkey.id(), HotKeyState::Pressed, &tx));
        assert_eq!(
            rx.try_recv().unwrap(),
            UiEvent::Command(UserCommand::ProbeNow)
        );
    }
}
