use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{detector_loop, DetectorContext};
use super::{DetectorCommand, DetectorEvent};

/// Owns the detector task: start, commands from the UI side, stop.
pub struct DetectorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    command_tx: Option<mpsc::UnboundedSender<DetectorCommand>>,
}

impl DetectorController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            command_tx: None,
        }
    }

    pub fn start<E>(
        &mut self,
        ctx: DetectorContext,
        probe_gate: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<E>,
    ) -> Result<()>
    where
        E: From<DetectorEvent> + Send + 'static,
    {
        if self.handle.is_some() {
            bail!("selection detector already running");
        }

        let cancel_token = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(detector_loop(
            ctx,
            probe_gate,
            command_rx,
            events,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.command_tx = Some(command_tx);
        Ok(())
    }

    /// Asks the running loop for an immediate probe. Returns `false` when the
    /// detector is not running.
    pub fn request_probe(&self) -> bool {
        self.send(DetectorCommand::ProbeNow)
    }

    /// Tells the loop the overlay did not show `text`, so it is not treated
    /// as already surfaced.
    pub fn reject_selection(&self, text: &str) -> bool {
        self.send(DetectorCommand::Rejected(text.to_string()))
    }

    fn send(&self, command: DetectorCommand) -> bool {
        match &self.command_tx {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.command_tx = None;
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("selection detector task failed to join")?;
            info!("selection detector stopped");
        }
        Ok(())
    }
}

impl Default for DetectorController {
    fn default() -> Self {
        Self::new()
    }
}
