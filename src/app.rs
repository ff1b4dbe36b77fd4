//! UI side of the assistant: the single event queue every worker posts into,
//! the loop that drains it into the overlay, and the console stand-ins for
//! the icon and panel widgets.

use std::io::Write;
use std::ops::ControlFlow;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::detector::{DetectorController, DetectorEvent};
use crate::overlay::{Overlay, OverlaySurface};
use crate::pipeline::{OperationKind, PipelineEvent};
use crate::platform::Point;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Detector(DetectorEvent),
    Pipeline(PipelineEvent),
    Command(UserCommand),
}

impl From<DetectorEvent> for UiEvent {
    fn from(event: DetectorEvent) -> Self {
        UiEvent::Detector(event)
    }
}

impl From<PipelineEvent> for UiEvent {
    fn from(event: PipelineEvent) -> Self {
        UiEvent::Pipeline(event)
    }
}

/// Typed on stdin, except `ProbeNow`, which only the global shortcut posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Summarize,
    Translate,
    Dismiss,
    ProbeNow,
    Quit,
}

impl UserCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" | "summarize" => Some(UserCommand::Summarize),
            "t" | "translate" => Some(UserCommand::Translate),
            "x" | "close" | "dismiss" => Some(UserCommand::Dismiss),
            "q" | "quit" | "exit" => Some(UserCommand::Quit),
            _ => None,
        }
    }
}

pub const USAGE: &str =
    "Select text anywhere, then: [s]ummarize, [t]ranslate, [x] close, [q]uit";

/// What the UI loop asks of the running detector.
pub trait DetectorLink {
    fn request_probe(&self) -> bool;
    fn reject_selection(&self, text: &str) -> bool;
}

impl DetectorLink for DetectorController {
    fn request_probe(&self) -> bool {
        DetectorController::request_probe(self)
    }

    fn reject_selection(&self, text: &str) -> bool {
        DetectorController::reject_selection(self, text)
    }
}

/// Applies one queued event to the overlay. `Break` ends the UI loop.
pub fn handle_event<S, D>(
    overlay: &mut Overlay<S>,
    event: UiEvent,
    target_language: &str,
    detector: &D,
) -> ControlFlow<()>
where
    S: OverlaySurface,
    D: DetectorLink + ?Sized,
{
    match event {
        UiEvent::Detector(DetectorEvent::SelectionFound {
            snapshot,
            work_area,
        }) => {
            let text = snapshot.text.clone();
            if !overlay.on_selection_found(snapshot, work_area) {
                detector.reject_selection(&text);
            }
        }
        UiEvent::Detector(DetectorEvent::Deselected) => overlay.on_deselected(),
        UiEvent::Pipeline(event) => overlay.on_pipeline_event(event),
        UiEvent::Command(command) => {
            let operation = match command {
                UserCommand::Summarize => OperationKind::Summarize,
                UserCommand::Translate => OperationKind::Translate {
                    target_language: target_language.to_string(),
                },
                UserCommand::Dismiss => {
                    overlay.dismiss();
                    return ControlFlow::Continue(());
                }
                UserCommand::ProbeNow => {
                    if !detector.request_probe() {
                        warn!("selection detector is not running");
                    }
                    return ControlFlow::Continue(());
                }
                UserCommand::Quit => return ControlFlow::Break(()),
            };
            if let Err(e) = overlay.activate(operation) {
                debug!("activation not started: {e}");
            }
        }
    }
    ControlFlow::Continue(())
}

/// Drains the UI queue until a quit command or until every sender is gone.
pub async fn run_ui_loop<S, D>(
    mut overlay: Overlay<S>,
    mut events: mpsc::UnboundedReceiver<UiEvent>,
    target_language: String,
    detector: &D,
) where
    S: OverlaySurface,
    D: DetectorLink + ?Sized,
{
    while let Some(event) = events.recv().await {
        if handle_event(&mut overlay, event, &target_language, detector).is_break() {
            info!("quit requested");
            break;
        }
    }
}

/// Forwards stdin lines as [`UserCommand`]s. Probing is never offered here:
/// the terminal would be the focused window receiving the copy gesture.
pub fn spawn_command_reader(tx: mpsc::UnboundedSender<UiEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match UserCommand::parse(&line) {
                    Some(command) => {
                        if tx.send(UiEvent::Command(command)).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("{USAGE}"),
                },
                Ok(None) => {
                    debug!("stdin closed");
                    let _ = tx.send(UiEvent::Command(UserCommand::Quit));
                    break;
                }
                Err(e) => {
                    warn!("failed to read command: {e}");
                    break;
                }
            }
        }
    })
}

/// Terminal rendering of the icon and panel. Streaming updates print only
/// the new suffix when the text grew by appending.
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    printed: String,
}

impl ConsoleSurface {
    fn write(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

impl OverlaySurface for ConsoleSurface {
    fn show_icon(&mut self, at: Point) {
        self.write(&format!("\n[selection ready at ({}, {})] {USAGE}\n", at.x, at.y));
    }

    fn hide_icon(&mut self) {}

    fn show_panel(&mut self, title: &str, content: &str) {
        self.write(&format!("\n== {title} ==\n{content}\n"));
        self.printed.clear();
    }

    fn update_panel(&mut self, content: &str) {
        match content.strip_prefix(self.printed.as_str()) {
            Some(suffix) => self.write(suffix),
            None => self.write(&format!("\n{content}")),
        }
        self.printed = content.to_string();
    }

    fn hide_panel(&mut self) {
        if !self.printed.is_empty() {
            self.write("\n");
        }
        self.printed.clear();
    }
}
