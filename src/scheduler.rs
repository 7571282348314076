//! Analysis scheduler.
//!
//! Every frame goes to the display sink. A frame is also analysed when at least
//! `interval` has passed since the previous analysis; other frames are not queued for
//! later. The scheduler runs on the presentation context and calls the pipeline
//! synchronously, so at most one analysis is in flight.

use std::time::{Duration, Instant};

use crate::analysis::AnalysisPipeline;
use crate::frame::{Frame, Raster};
use crate::presentation::PresentationSink;

#[derive(Debug)]
pub struct AnalysisScheduler {
    interval: Duration,
    last_run: Option<Instant>,
    enabled: bool,
    runs: u64,
}

impl AnalysisScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            enabled: true,
            runs: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn analysis on or off. Display forwarding is unaffected.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Pipeline runs so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Throttle decision. Records `now` as the last run when it returns true.
    pub fn should_analyze(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        let due = match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_run = Some(now);
            self.runs += 1;
        }
        due
    }

    /// Display `frame` and analyse it if the throttle allows. Returns whether it was
    /// analysed.
    pub fn on_frame(
        &mut self,
        frame: Frame,
        now: Instant,
        pipeline: &mut AnalysisPipeline,
        sink: &mut dyn PresentationSink,
    ) -> bool {
        let raster = frame.decode().unwrap_or_else(|err| {
            log::debug!("frame not decodable: {}", err);
            Raster::empty()
        });
        sink.on_frame_display(&raster);

        if !self.should_analyze(now) {
            return false;
        }
        let started = Instant::now();
        let result = pipeline.analyze_raster(&raster);
        let elapsed = started.elapsed();
        if elapsed > self.interval {
            log::warn!(
                "analysis took {:?}, longer than the {:?} interval",
                elapsed,
                self.interval
            );
        }
        sink.on_result(result);
        true
    }
}
