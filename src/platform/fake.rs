//! In-memory stand-ins for the OS bindings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ClipboardBackend, InputBackend, Point, Rect};
use crate::error::{AssistError, Result};

#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<Option<String>>,
    failing_reads: AtomicUsize,
    writes: Mutex<Vec<String>>,
}

impl MemoryClipboard {
    pub fn with_text(text: &str) -> Arc<Self> {
        let clipboard = Self::default();
        *clipboard.content.lock().unwrap() = Some(text.to_string());
        Arc::new(clipboard)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn text(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }

    /// Set by the "foreign application" on a synthesized copy; not recorded as a write.
    pub fn set_external(&self, text: &str) {
        *self.content.lock().unwrap() = Some(text.to_string());
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        let pending = self.failing_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_reads.store(pending - 1, Ordering::SeqCst);
            return Err(AssistError::DeviceRead("clipboard occupied".into()));
        }
        Ok(self.text())
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.writes.lock().unwrap().push(text.to_string());
        *self.content.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

/// Replays a pointer path and answers copy gestures with a fixed selection.
pub struct ScriptedInput {
    clipboard: Arc<MemoryClipboard>,
    path: Mutex<VecDeque<Point>>,
    resting: Mutex<Point>,
    selection: Mutex<Option<String>>,
    copies: AtomicUsize,
    failing_copies: AtomicBool,
    pub work_area: Rect,
}

impl ScriptedInput {
    pub fn new(clipboard: Arc<MemoryClipboard>) -> Self {
        Self {
            clipboard,
            path: Mutex::new(VecDeque::new()),
            resting: Mutex::new(Point::new(0, 0)),
            selection: Mutex::new(None),
            copies: AtomicUsize::new(0),
            failing_copies: AtomicBool::new(false),
            work_area: Rect {
                left: 0,
                top: 0,
                right: 1920,
                bottom: 1080,
            },
        }
    }

    pub fn with_path(self, points: &[Point]) -> Self {
        *self.path.lock().unwrap() = points.iter().copied().collect();
        self
    }

    pub fn select(&self, text: Option<&str>) {
        *self.selection.lock().unwrap() = text.map(str::to_string);
    }

    /// Makes every copy gesture report an error after the copy has landed.
    pub fn fail_copies(&self, fail: bool) {
        self.failing_copies.store(fail, Ordering::SeqCst);
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

impl InputBackend for ScriptedInput {
    fn pointer_position(&self) -> Result<Point> {
        let mut resting = self.resting.lock().unwrap();
        if let Some(next) = self.path.lock().unwrap().pop_front() {
            *resting = next;
        }
        Ok(*resting)
    }

    fn synthesize_copy(&self) -> Result<()> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        if let Some(text) = self.selection.lock().unwrap().as_deref() {
            self.clipboard.set_external(text);
        }
        if self.failing_copies.load(Ordering::SeqCst) {
            return Err(AssistError::DeviceRead("modifier release failed".into()));
        }
        Ok(())
    }

    fn screen_work_area(&self, _containing: Point) -> Result<Rect> {
        Ok(self.work_area)
    }
}
