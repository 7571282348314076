//! inspect_still - run still images through the inspection pipeline
//!
//! Each image is decoded with `image`, analysed once, and reported either as the operator
//! summary or as one JSON object per line (--json).

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

use line_inspector::ui::{Ui, UiMode};
use line_inspector::{summary_text, AnalysisPipeline, AnalysisResult, InspectorConfig, Raster};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or JSON). Defaults to INSPECTOR_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print results as JSON lines.
    #[arg(long)]
    json: bool,
    /// Stage output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
    /// Images to analyse.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Serialize)]
struct StillReport<'a> {
    image: String,
    #[serde(flatten)]
    result: &'a AnalysisResult,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::new(args.ui);

    let cfg = match &args.config {
        Some(path) => InspectorConfig::load_from(Some(path.as_path()))?,
        None => InspectorConfig::load()?,
    };

    let stage = ui.stage("load models");
    let mut pipeline = AnalysisPipeline::from_config(&cfg);
    let disabled: Vec<String> = pipeline
        .statuses()
        .iter()
        .filter(|s| !s.is_ready())
        .map(|s| s.to_string())
        .collect();
    if disabled.is_empty() {
        stage.done("");
    } else {
        stage.fail(disabled.join("; "));
    }

    let mut failures = 0usize;
    for path in &args.images {
        let raster = match load_raster(path) {
            Ok(raster) => raster,
            Err(err) => {
                log::error!("{:#}", err);
                failures += 1;
                continue;
            }
        };
        let result = pipeline.analyze_raster(&raster);
        if args.json {
            let report = StillReport {
                image: path.display().to_string(),
                result: &result,
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("== {}", path.display());
            println!("{}", summary_text(&result));
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} images could not be read", failures, args.images.len());
    }
    Ok(())
}

fn load_raster(path: &Path) -> Result<Raster> {
    let image = image::open(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(Raster::from_image(image.to_rgb8()))
}
