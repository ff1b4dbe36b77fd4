//! Overlay lifecycle: selection → icon → action → streaming panel → result.
//!
//! The overlay is driven from one task only (the UI loop in [`crate::app`]);
//! workers reach it through events, never by reference.

use log::{debug, info};
use tokio::sync::watch;

use crate::detector::SelectionSnapshot;
use crate::error::{AssistError, Result};
use crate::pipeline::{CompletionPipeline, OperationKind, PipelineEvent, SessionId};
use crate::platform::{Point, Rect};

pub const WORKING_PLACEHOLDER: &str = "Working on it...";

const ICON_SIZE: i32 = 40;
const ICON_OFFSET_X: i32 = 20;
const ICON_OFFSET_Y: i32 = -40;

/// Rendering seam for the floating icon and result panel.
pub trait OverlaySurface: Send {
    fn show_icon(&mut self, at: Point);
    fn hide_icon(&mut self);
    fn show_panel(&mut self, title: &str, content: &str);
    /// Replaces the panel body in place.
    fn update_panel(&mut self, content: &str);
    fn hide_panel(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    IconShown {
        snapshot: SelectionSnapshot,
        icon_at: Point,
    },
    ActionChosen {
        operation: OperationKind,
    },
    Streaming {
        session: SessionId,
        operation: OperationKind,
        content: String,
    },
    Shown {
        content: String,
    },
}

impl OverlayState {
    /// States in which the detector must not probe.
    fn blocks_probe(&self) -> bool {
        matches!(
            self,
            OverlayState::IconShown { .. }
                | OverlayState::ActionChosen { .. }
                | OverlayState::Streaming { .. }
        )
    }
}

/// Icon position next to the selection point, kept inside the work area.
pub fn icon_anchor(point: Point, work_area: Option<Rect>) -> Point {
    let mut x = point.x + ICON_OFFSET_X;
    let mut y = point.y + ICON_OFFSET_Y;

    if let Some(area) = work_area {
        x = x.min(area.right - ICON_SIZE).max(area.left);
        y = y.min(area.bottom - ICON_SIZE).max(area.top);
    }
    Point::new(x, y)
}

pub fn error_text(operation: &OperationKind, error: &AssistError) -> String {
    format!("{} failed: {}", operation.label(), error)
}

pub struct Overlay<S> {
    state: OverlayState,
    surface: S,
    pipeline: CompletionPipeline,
    probe_gate: watch::Sender<bool>,
}

impl<S: OverlaySurface> Overlay<S> {
    pub fn new(surface: S, pipeline: CompletionPipeline, probe_gate: watch::Sender<bool>) -> Self {
        let overlay = Self {
            state: OverlayState::Hidden,
            surface,
            pipeline,
            probe_gate,
        };
        overlay.publish_gate();
        overlay
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Shows the icon for a fresh selection. Returns `false` when the
    /// selection was turned away because a request is running.
    pub fn on_selection_found(
        &mut self,
        snapshot: SelectionSnapshot,
        work_area: Option<Rect>,
    ) -> bool {
        match &self.state {
            OverlayState::ActionChosen { .. } | OverlayState::Streaming { .. } => {
                debug!("selection ignored while a request is running");
                return false;
            }
            OverlayState::Shown { .. } => self.surface.hide_panel(),
            OverlayState::Hidden | OverlayState::IconShown { .. } => {}
        }

        let icon_at = icon_anchor(snapshot.screen_point, work_area);
        self.surface.show_icon(icon_at);
        self.state = OverlayState::IconShown { snapshot, icon_at };
        self.publish_gate();
        true
    }

    pub fn on_deselected(&mut self) {
        if matches!(self.state, OverlayState::IconShown { .. }) {
            self.surface.hide_icon();
            self.state = OverlayState::Hidden;
            self.publish_gate();
        }
    }

    /// User picked an action on the icon. Consumes the held selection.
    pub fn activate(&mut self, operation: OperationKind) -> Result<SessionId> {
        if matches!(
            self.state,
            OverlayState::ActionChosen { .. } | OverlayState::Streaming { .. }
        ) {
            debug!("activation rejected, request already running");
            return Err(AssistError::AlreadyInFlight);
        }

        let chosen = OverlayState::ActionChosen {
            operation: operation.clone(),
        };
        let snapshot = match std::mem::replace(&mut self.state, chosen) {
            OverlayState::IconShown { snapshot, .. } => snapshot,
            other => {
                self.state = other;
                return Err(AssistError::NoSelection);
            }
        };

        self.surface.hide_icon();
        self.publish_gate();
        let title = operation.label();

        match self.pipeline.submit(&snapshot.text, operation.clone()) {
            Ok(session) => {
                info!("{} started (session {})", title, session.id);
                self.surface.show_panel(&title, WORKING_PLACEHOLDER);
                self.state = OverlayState::Streaming {
                    session: session.id,
                    operation,
                    content: String::new(),
                };
                self.publish_gate();
                Ok(session.id)
            }
            Err(e) => {
                let content = error_text(&operation, &e);
                self.surface.show_panel(&title, &content);
                self.state = OverlayState::Shown { content };
                self.publish_gate();
                Err(e)
            }
        }
    }

    pub fn on_pipeline_event(&mut self, event: PipelineEvent) {
        let (session, outcome) = match event {
            PipelineEvent::Chunk { session, text } => (session, Progress::Chunk(text)),
            PipelineEvent::Done { session, text } => (session, Progress::Done(text)),
            PipelineEvent::Failed { session, error } => (session, Progress::Failed(error)),
        };

        let OverlayState::Streaming {
            session: current,
            operation,
            content,
        } = &mut self.state
        else {
            debug!("dropping progress for session {session}, overlay not streaming");
            self.publish_gate();
            return;
        };
        if *current != session {
            debug!("dropping progress for stale session {session}");
            self.publish_gate();
            return;
        }

        match outcome {
            Progress::Chunk(text) => {
                self.surface.update_panel(&text);
                *content = text;
            }
            Progress::Done(text) => {
                self.surface.update_panel(&text);
                self.state = OverlayState::Shown { content: text };
                self.publish_gate();
            }
            Progress::Failed(error) => {
                let text = error_text(operation, &error);
                self.surface.update_panel(&text);
                self.state = OverlayState::Shown { content: text };
                self.publish_gate();
            }
        }
    }

    /// Close action. A running request keeps streaming in the pipeline but
    /// its output is no longer shown.
    pub fn dismiss(&mut self) {
        self.surface.hide_icon();
        self.surface.hide_panel();
        self.state = OverlayState::Hidden;
        self.publish_gate();
    }

    fn publish_gate(&self) {
        let blocked = self.state.blocks_probe() || self.pipeline.is_busy();
        self.probe_gate.send_if_modified(|current| {
            let changed = *current != blocked;
            *current = blocked;
            changed
        });
    }
}

enum Progress {
    Chunk(String),
    Done(String),
    Failed(AssistError),
}
