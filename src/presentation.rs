//! Presentation sink.
//!
//! The sink is called from the presentation context only. `on_frame_display` fires for
//! every acquired frame, `on_result` for analysed frames.

use crate::analysis::AnalysisResult;
use crate::frame::Raster;

pub trait PresentationSink {
    fn on_frame_display(&mut self, raster: &Raster);

    fn on_result(&mut self, result: AnalysisResult);

    /// Operator-facing status line.
    fn on_status(&mut self, _text: &str) {}

    /// Frames acquired during the last second.
    fn on_throughput(&mut self, _frames_per_second: u64) {}
}

/// Operator summary of one result.
pub fn summary_text(result: &AnalysisResult) -> String {
    let barcode = result.barcode_text.as_deref().unwrap_or("not found");
    let objects = if result.objects.is_empty() {
        "no objects".to_string()
    } else {
        result.objects.join(", ")
    };
    let product = if result.has_product() {
        format!(
            "{} ({:.1}%)",
            result.product_label, result.product_confidence
        )
    } else {
        result.product_label.clone()
    };
    format!(
        "Barcode: {}\nBrightness: {}\nColor: {}\nObjects: {}\nProduct: {}\nWeight: {}",
        barcode, result.brightness, result.dominant_color, objects, product, result.weight_class
    )
}

/// Sink that writes results and status to the log.
#[derive(Debug, Default)]
pub struct LogSink {
    frames_displayed: u64,
    results: u64,
    last_summary: Option<String>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed
    }

    pub fn results(&self) -> u64 {
        self.results
    }

    pub fn last_summary(&self) -> Option<&str> {
        self.last_summary.as_deref()
    }
}

impl PresentationSink for LogSink {
    fn on_frame_display(&mut self, _raster: &Raster) {
        self.frames_displayed += 1;
    }

    fn on_result(&mut self, result: AnalysisResult) {
        self.results += 1;
        let summary = summary_text(&result);
        // repeated identical summaries only go to debug
        if self.last_summary.as_deref() == Some(summary.as_str()) {
            log::debug!("result unchanged");
        } else {
            log::info!("analysis result:\n{}", summary);
            self.last_summary = Some(summary);
        }
    }

    fn on_status(&mut self, text: &str) {
        log::info!("status: {}", text);
    }

    fn on_throughput(&mut self, frames_per_second: u64) {
        log::debug!("throughput: {} fps", frames_per_second);
    }
}
