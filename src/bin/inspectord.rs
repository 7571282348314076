//! inspectord - production line inspection daemon
//!
//! This daemon:
//! 1. Loads configuration (file from --config or INSPECTOR_CONFIG, then env overrides)
//! 2. Loads the detector and classifier models (a failed load disables that stage)
//! 3. Opens the camera and applies its initial parameters
//! 4. Streams frames, analysing at most one every analysis interval
//! 5. Logs operator summaries until Ctrl-C or --duration-secs elapses

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use line_inspector::ui::{Ui, UiMode};
use line_inspector::{
    open_camera, AnalysisPipeline, InspectionController, InspectorConfig, LogSink, StopOutcome,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or JSON). Defaults to INSPECTOR_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stage output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
    /// Stop after this many seconds. 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::new(args.ui);

    let cfg = match &args.config {
        Some(path) => InspectorConfig::load_from(Some(path.as_path()))?,
        None => InspectorConfig::load()?,
    };

    let stage = ui.stage("load models");
    let pipeline = AnalysisPipeline::from_config(&cfg);
    let ready = pipeline.statuses().iter().filter(|s| s.is_ready()).count();
    let detail = format!("{}/{} stages ready", ready, pipeline.statuses().len());
    if ready == pipeline.statuses().len() {
        stage.done(detail);
    } else {
        stage.fail(detail);
    }

    let stage = ui.stage("connect camera");
    let camera = open_camera(&cfg.camera)?;
    stage.done(cfg.camera.device.clone());
    let mut controller =
        InspectionController::with_pipeline(camera, pipeline, LogSink::new(), &cfg);

    let stage = ui.stage("start capture");
    if let Err(err) = controller.start() {
        stage.fail(err.to_string());
        return Err(err).context("capture did not start");
    }
    stage.done(format!(
        "analysis every {}ms",
        cfg.analysis.interval.as_millis()
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let deadline =
        (args.duration_secs > 0).then(|| Instant::now() + Duration::from_secs(args.duration_secs));
    log::info!(
        "inspectord running on {} (Ctrl-C to stop)",
        controller.acquisition().camera_name()
    );
    controller.run_until(&shutdown, deadline);

    log::info!("shutting down");
    let outcome = controller.stop();
    if outcome == StopOutcome::Abandoned {
        log::warn!("capture thread did not exit within the join timeout");
    }
    log::info!(
        "{} frames displayed, {} analysed, {} dropped at hand-off",
        controller.sink().frames_displayed(),
        controller.sink().results(),
        controller.acquisition().dropped_frames()
    );
    Ok(())
}
