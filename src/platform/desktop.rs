use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use mouse_position::mouse_position::Mouse;
use xcap::Monitor;

use super::{ClipboardBackend, InputBackend, Point, Rect};
use crate::error::{AssistError, Result};

/// System clipboard through arboard. A fresh handle is opened per call so the
/// OS clipboard is never held open between operations.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardBackend for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| AssistError::DeviceRead(e.to_string()))?;
        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(AssistError::DeviceRead(e.to_string())),
        }
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| AssistError::ClipboardWrite(e.to_string()))?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|e| AssistError::ClipboardWrite(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct SystemInput {
    last_copy: Mutex<Option<Instant>>,
}

impl SystemInput {
    /// Whether a copy gesture was sent within `window`. When the assistant's
    /// own terminal has focus that gesture comes back as SIGINT.
    pub fn copied_within(&self, window: Duration) -> bool {
        let last = self.last_copy.lock().unwrap_or_else(PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() <= window)
    }

    fn mark_copy(&self) {
        *self.last_copy.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }
}

#[cfg(target_os = "macos")]
const COPY_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const COPY_MODIFIER: Key = Key::Control;

impl InputBackend for SystemInput {
    fn pointer_position(&self) -> Result<Point> {
        match Mouse::get_mouse_position() {
            Mouse::Position { x, y } => Ok(Point::new(x, y)),
            Mouse::Error => Err(AssistError::DeviceRead(
                "pointer position unavailable".to_string(),
            )),
        }
    }

    fn synthesize_copy(&self) -> Result<()> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| AssistError::DeviceRead(format!("input synthesis unavailable: {e}")))?;

        self.mark_copy();
        enigo
            .key(COPY_MODIFIER, Direction::Press)
            .map_err(|e| AssistError::DeviceRead(e.to_string()))?;
        let click = enigo.key(Key::Unicode('c'), Direction::Click);
        // Always let go of the modifier, even if the click failed.
        let release = enigo.key(COPY_MODIFIER, Direction::Release);

        click.map_err(|e| AssistError::DeviceRead(e.to_string()))?;
        release.map_err(|e| AssistError::DeviceRead(e.to_string()))
    }

    /// Bounds of the monitor under `containing`. xcap reports whole monitor
    /// geometry, so a taskbar or dock is not subtracted.
    fn screen_work_area(&self, containing: Point) -> Result<Rect> {
        let monitor = Monitor::from_point(containing.x, containing.y)
            .map_err(|e| AssistError::DeviceRead(format!("monitor lookup failed: {e}")))?;

        Ok(Rect {
            left: monitor.x(),
            top: monitor.y(),
            right: monitor.x() + monitor.width() as i32,
            bottom: monitor.y() + monitor.height() as i32,
        })
    }
}
