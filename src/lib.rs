pub mod ai_client;
pub mod app;
pub mod clipboard;
pub mod config;
pub mod detector;
pub mod error;
pub mod hotkey;
pub mod overlay;
pub mod pipeline;
pub mod platform;

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn, LevelFilter};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use tokio::sync::{mpsc, watch};

use ai_client::AiClient;
use app::{ConsoleSurface, UiEvent};
use clipboard::ClipboardService;
use config::AppConfig;
use detector::{DetectorContext, DetectorController};
use overlay::Overlay;
use pipeline::{ChannelSink, CompletionPipeline, PipelineSettings};
use platform::desktop::{SystemClipboard, SystemInput};

const LOG_FILE_NAME: &str = "selection-digest.log";
/// Ctrl+C arriving this soon after a synthesized copy is our own gesture.
const SELF_INTERRUPT_WINDOW: Duration = Duration::from_secs(1);

fn debug_enabled() -> bool {
    std::env::var("SELECTION_DIGEST_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Terminal logging on stderr (stdout carries the panel), plus a debug-level
/// log file in the config directory when one can be created.
fn init_logging() {
    let term_level = if debug_enabled() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];

    let log_file = config::config_dir().and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        File::create(dir.join(LOG_FILE_NAME)).ok()
    });
    if let Some(file) = log_file {
        loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file));
    }

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("Warning: logger already initialised");
    }
}

pub fn run() -> Result<()> {
    init_logging();
    let config = config::load().context("Failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run_assistant(config))
}

async fn run_assistant(config: AppConfig) -> Result<()> {
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (gate_tx, gate_rx) = watch::channel(false);

    let client = AiClient::new(&config.base_url).context("Failed to create completion client")?;
    let pipeline = CompletionPipeline::new(
        Arc::new(client),
        Arc::new(ChannelSink::new(ui_tx.clone())),
        PipelineSettings::from(&config),
    );
    let overlay = Overlay::new(ConsoleSurface::default(), pipeline, gate_tx);

    let input = Arc::new(SystemInput::default());
    let clipboard = ClipboardService::new(
        Arc::new(SystemClipboard),
        config.detector.clipboard_lock_timeout(),
    );
    let detector_ctx = DetectorContext {
        clipboard: Arc::new(clipboard),
        input: input.clone(),
        config: config.detector.clone(),
    };

    let mut detector = DetectorController::new();
    detector.start(detector_ctx, gate_rx, ui_tx.clone())?;

    let _shortcut = match hotkey::register_probe_shortcut(&config.probe_shortcut, ui_tx.clone()) {
        Ok(shortcut) => Some(shortcut),
        Err(e) => {
            warn!("{e:#}; manual probing is unavailable");
            None
        }
    };
    let reader = app::spawn_command_reader(ui_tx);

    info!(
        "selection-digest running against {} ({})",
        config.base_url, config.model_name
    );
    println!("{} (probe now: {})", app::USAGE, config.probe_shortcut);

    tokio::select! {
        _ = app::run_ui_loop(overlay, ui_rx, config.target_language.clone(), &detector) => {}
        result = wait_for_interrupt(&input) => result?,
    }

    reader.abort();
    detector.stop().await
}

/// Resolves on a Ctrl+C from the user. A synthesized copy that lands in the
/// assistant's own terminal raises SIGINT too; those are skipped.
async fn wait_for_interrupt(input: &SystemInput) -> Result<()> {
    loop {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        if input.copied_within(SELF_INTERRUPT_WINDOW) {
            debug!("ignoring Ctrl+C raised by a synthesized copy");
            continue;
        }
        info!("interrupted");
        return Ok(());
    }
}
