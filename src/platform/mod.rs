//! Narrow OS capability interfaces used by the selection core.
//!
//! The desktop implementations live in [`desktop`]; tests substitute
//! in-memory fakes.

pub mod desktop;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen rectangle in physical pixels; `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }
}

/// Raw access to the system clipboard.
///
/// `Ok(None)` means the clipboard holds no text (empty or non-text data).
/// `Err` means the clipboard could not be accessed right now.
pub trait ClipboardBackend: Send + Sync {
    fn read_text(&self) -> Result<Option<String>>;
    fn write_text(&self, text: &str) -> Result<()>;
}

/// Pointer position, synthetic copy gesture and monitor geometry.
pub trait InputBackend: Send + Sync {
    fn pointer_position(&self) -> Result<Point>;
    fn synthesize_copy(&self) -> Result<()>;
    fn screen_work_area(&self, containing: Point) -> Result<Rect>;
}

#[cfg(test)]
pub(crate) mod fake;
