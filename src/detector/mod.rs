//! Selection detector: infers "the user just selected text" by polling the
//! pointer and diffing the clipboard around a synthesized copy.

mod controller;
mod loop_worker;
mod probe;
mod state;

use std::time::SystemTime;

use crate::platform::{Point, Rect};

pub use controller::DetectorController;
pub use loop_worker::{detector_loop, DetectorContext};
pub use probe::{probe_selection, ProbeOutcome};
pub use state::{DetectorMode, DetectorState, TickDecision};

/// Text captured by one successful probe. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub text: String,
    pub captured_at: SystemTime,
    pub screen_point: Point,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    SelectionFound {
        snapshot: SelectionSnapshot,
        /// Work area of the monitor under the pointer, when it could be read.
        work_area: Option<Rect>,
    },
    Deselected,
}

/// Requests from the UI side to the running detector loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorCommand {
    /// Probe now, skipping the idle counter and cooldown.
    ProbeNow,
    /// The overlay turned this surfaced text away; it may be surfaced again.
    Rejected(String),
}
