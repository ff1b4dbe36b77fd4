use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::probe::{probe_selection, ProbeOutcome};
use super::state::{DetectorState, TickDecision};
use super::{DetectorCommand, DetectorEvent};
use crate::clipboard::ClipboardService;
use crate::config::DetectorConfig;
use crate::platform::{InputBackend, Point};

#[derive(Clone)]
pub struct DetectorContext {
    pub clipboard: Arc<ClipboardService>,
    pub input: Arc<dyn InputBackend>,
    pub config: DetectorConfig,
}

/// Single-timer polling loop. The sleep length is re-read from the state
/// machine every iteration, so mode changes take effect on the next tick.
///
/// `probe_gate` is `true` while the overlay or pipeline is busy; no probe
/// starts while it is set.
pub async fn detector_loop<E>(
    ctx: DetectorContext,
    probe_gate: watch::Receiver<bool>,
    mut commands: mpsc::UnboundedReceiver<DetectorCommand>,
    events: mpsc::UnboundedSender<E>,
    cancel_token: CancellationToken,
) where
    E: From<DetectorEvent> + Send + 'static,
{
    let mut state = DetectorState::new(&ctx.config);
    let mut commands_open = true;

    info!("selection detector started");

    loop {
        let decision = tokio::select! {
            _ = tokio::time::sleep(state.interval()) => {
                let Some(position) = read_pointer(&ctx) else { continue };
                let before = state.mode();
                let decision = state.on_tick(position, Instant::now().into_std(), *probe_gate.borrow());
                if state.mode() != before {
                    debug!("detector mode {:?} -> {:?}", before, state.mode());
                }
                decision
            }
            command = commands.recv(), if commands_open => match command {
                Some(DetectorCommand::ProbeNow) => {
                    let Some(position) = read_pointer(&ctx) else { continue };
                    state.on_manual_request(position, Instant::now().into_std(), *probe_gate.borrow())
                }
                Some(DetectorCommand::Rejected(text)) => {
                    debug!("surfaced selection was not shown, forgetting it");
                    state.on_selection_rejected(&text);
                    continue;
                }
                None => {
                    commands_open = false;
                    continue;
                }
            },
            _ = cancel_token.cancelled() => {
                info!("selection detector shutting down");
                break;
            }
        };

        if let TickDecision::Probe(at) = decision {
            run_probe(&ctx, &mut state, at, &events).await;
            if events.is_closed() {
                info!("selection detector has no listener, stopping");
                break;
            }
        }
    }
}

fn read_pointer(ctx: &DetectorContext) -> Option<Point> {
    match ctx.input.pointer_position() {
        Ok(position) => Some(position),
        Err(e) => {
            debug!("pointer read failed, skipping tick: {e}");
            None
        }
    }
}

async fn run_probe<E>(
    ctx: &DetectorContext,
    state: &mut DetectorState,
    at: Point,
    events: &mpsc::UnboundedSender<E>,
) where
    E: From<DetectorEvent> + Send + 'static,
{
    state.on_probe_started(Instant::now().into_std());

    let clipboard = Arc::clone(&ctx.clipboard);
    let input = Arc::clone(&ctx.input);
    let last_surfaced = state.last_surfaced().map(str::to_owned);
    let settle_delay = ctx.config.settle_delay();
    let detect_deselection = ctx.config.detect_deselection;

    let probed = tokio::task::spawn_blocking(move || {
        let outcome = probe_selection(
            &clipboard,
            input.as_ref(),
            at,
            settle_delay,
            last_surfaced.as_deref(),
            detect_deselection,
        )?;
        let work_area = match outcome {
            ProbeOutcome::Found(_) => input
                .screen_work_area(at)
                .map_err(|e| debug!("work area unavailable: {e}"))
                .ok(),
            _ => None,
        };
        Ok::<_, crate::error::AssistError>((outcome, work_area))
    })
    .await;

    let event = match probed {
        Ok(Ok((ProbeOutcome::Found(snapshot), work_area))) => {
            info!(
                "selection found at ({}, {}), {} chars",
                at.x,
                at.y,
                snapshot.text.chars().count()
            );
            state.on_selection_surfaced(&snapshot.text);
            DetectorEvent::SelectionFound {
                snapshot,
                work_area,
            }
        }
        Ok(Ok((ProbeOutcome::Deselected, _))) => {
            debug!("previous selection no longer active");
            state.on_deselected();
            DetectorEvent::Deselected
        }
        Ok(Ok((ProbeOutcome::NoSelection, _))) => {
            debug!("probe found no new selection");
            return;
        }
        Ok(Err(e)) => {
            debug!("probe failed: {e}");
            return;
        }
        Err(e) => {
            warn!("probe worker join failed: {e}");
            return;
        }
    };

    let _ = events.send(event.into());
}
