use std::time::{Duration, SystemTime};

use log::{debug, warn};

use super::SelectionSnapshot;
use crate::clipboard::ClipboardService;
use crate::error::Result;
use crate::platform::{InputBackend, Point};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(SelectionSnapshot),
    Deselected,
    NoSelection,
}

/// Copies whatever is selected under the pointer and compares the clipboard
/// before and after.
///
/// The clipboard is held for the whole probe and put back to its previous
/// text whenever the synthesized copy changed it, so a probe never shows up
/// in the user's own clipboard. When the clipboard held no text before the
/// probe there is nothing to put back.
pub fn probe_selection(
    clipboard: &ClipboardService,
    input: &dyn InputBackend,
    at: Point,
    settle_delay: Duration,
    last_surfaced: Option<&str>,
    detect_deselection: bool,
) -> Result<ProbeOutcome> {
    let scope = clipboard.scoped_acquire()?;

    let old = scope.read();
    // A failed gesture may still have landed a copy, so restore before reporting it.
    let copied = input.synthesize_copy();
    if !settle_delay.is_zero() {
        std::thread::sleep(settle_delay);
    }
    let new = scope.read();

    if new != old {
        match old.as_deref() {
            Some(previous) => {
                if let Err(e) = scope.write(previous) {
                    warn!("failed to restore clipboard after probe: {e}");
                }
            }
            None => debug!("clipboard held no text before probe; leaving copied text in place"),
        }
    }
    copied?;

    let outcome = match new.as_deref() {
        Some(text)
            if !text.trim().is_empty()
                && Some(text) != old.as_deref()
                && Some(text) != last_surfaced =>
        {
            ProbeOutcome::Found(SelectionSnapshot {
                text: text.to_string(),
                captured_at: SystemTime::now(),
                screen_point: at,
            })
        }
        _ if detect_deselection && new == old && last_surfaced.is_some() => {
            ProbeOutcome::Deselected
        }
        _ => ProbeOutcome::NoSelection,
    };

    Ok(outcome)
}
