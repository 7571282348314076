//! Inspection controller.
//!
//! Single owner of the camera (through the acquisition loop), the analysis pipeline, the
//! scheduler and the presentation sink. The thread that calls `pump`/`run_until` is the
//! presentation context.

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::acquisition::{AcquisitionLoop, AcquisitionState, StopOutcome};
use crate::analysis::AnalysisPipeline;
use crate::config::InspectorConfig;
use crate::error::InspectError;
use crate::ingest::{open_camera, CameraDevice, ParameterValue, Roi};
use crate::presentation::PresentationSink;
use crate::scheduler::AnalysisScheduler;

const THROUGHPUT_PERIOD: Duration = Duration::from_secs(1);

/// Poll granularity of `run_until`; bounds how late a shutdown request is noticed.
const RUN_POLL: Duration = Duration::from_millis(100);

pub struct InspectionController<S: PresentationSink> {
    acquisition: AcquisitionLoop,
    scheduler: AnalysisScheduler,
    pipeline: AnalysisPipeline,
    sink: S,
    last_sample: Instant,
    last_dropped: u64,
}

impl<S: PresentationSink> InspectionController<S> {
    /// Assemble from parts. Camera parameters are applied by the caller.
    pub fn new(
        camera: Box<dyn CameraDevice>,
        pipeline: AnalysisPipeline,
        sink: S,
        cfg: &InspectorConfig,
    ) -> Self {
        let mut scheduler = AnalysisScheduler::new(cfg.analysis.interval);
        scheduler.set_enabled(cfg.analysis.analyze_enabled);
        Self {
            acquisition: AcquisitionLoop::new(camera, &cfg.camera, &cfg.acquisition),
            scheduler,
            pipeline,
            sink,
            last_sample: Instant::now(),
            last_dropped: 0,
        }
    }

    /// Open the configured camera, apply its initial parameters and ROI, and load models.
    pub fn from_config(cfg: &InspectorConfig, sink: S) -> Result<Self> {
        let camera = open_camera(&cfg.camera).context("failed to open camera")?;
        let pipeline = AnalysisPipeline::from_config(cfg);
        Ok(Self::with_pipeline(camera, pipeline, sink, cfg))
    }

    /// Like `from_config` with a pipeline built by the caller.
    pub fn with_pipeline(
        camera: Box<dyn CameraDevice>,
        pipeline: AnalysisPipeline,
        sink: S,
        cfg: &InspectorConfig,
    ) -> Self {
        let mut controller = Self::new(camera, pipeline, sink, cfg);
        for status in controller.pipeline.statuses().to_vec() {
            controller.sink.on_status(&status.to_string());
        }
        for setting in &cfg.camera.parameters {
            if let Err(err) = controller.set_parameter(&setting.name, setting.value.clone()) {
                controller
                    .sink
                    .on_status(&format!("camera parameter {} not applied: {}", setting.name, err));
            }
        }
        if let Some(roi) = cfg.camera.roi {
            if let Err(err) = controller.apply_roi(roi) {
                controller.sink.on_status(&format!("roi not applied: {}", err));
            }
        }
        controller
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    pub fn acquisition(&self) -> &AcquisitionLoop {
        &self.acquisition
    }

    pub fn state(&self) -> AcquisitionState {
        self.acquisition.state()
    }

    pub fn start(&mut self) -> Result<(), InspectError> {
        match self.acquisition.start() {
            Ok(()) => {
                self.last_sample = Instant::now();
                self.acquisition.counter().take();
                let text = format!("capture started: {}", self.acquisition.camera_name());
                self.sink.on_status(&text);
                Ok(())
            }
            Err(err) => {
                self.sink.on_status(&err.to_string());
                Err(err)
            }
        }
    }

    pub fn stop(&mut self) -> StopOutcome {
        let outcome = self.acquisition.stop();
        match outcome {
            StopOutcome::AlreadyStopped => {}
            StopOutcome::Joined => self.sink.on_status("capture stopped"),
            StopOutcome::Abandoned => self
                .sink
                .on_status("capture stopped; camera thread abandoned after timeout"),
        }
        outcome
    }

    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), InspectError> {
        self.acquisition.set_parameter(name, value)
    }

    /// Toggle the camera's automatic exposure and gain together.
    pub fn set_auto_exposure(&mut self, enabled: bool) -> Result<(), InspectError> {
        let mode = if enabled { "Continuous" } else { "Off" };
        self.set_parameter("ExposureAuto", ParameterValue::Text(mode.into()))?;
        self.set_parameter("GainAuto", ParameterValue::Text(mode.into()))?;
        self.sink
            .on_status(&format!("auto exposure {}", if enabled { "on" } else { "off" }));
        Ok(())
    }

    /// Change the sensor region. Streaming is paused around the change because the sensor
    /// rejects geometry writes while acquiring.
    pub fn apply_roi(&mut self, roi: Roi) -> Result<(), InspectError> {
        let was_running = self.acquisition.is_running();
        if was_running {
            self.acquisition.stop();
        }
        let mut result = Ok(());
        for (name, value) in roi.parameters() {
            if let Err(err) = self.acquisition.set_parameter(name, value) {
                result = Err(err);
                break;
            }
        }
        if was_running {
            self.start()?;
        }
        if result.is_ok() {
            self.sink.on_status(&format!("roi set to {}", roi));
        }
        result
    }

    pub fn set_analyze_enabled(&mut self, enabled: bool) {
        self.scheduler.set_enabled(enabled);
        self.sink
            .on_status(if enabled { "analysis enabled" } else { "analysis paused" });
    }

    /// Process frames arriving within `wait`. Returns how many were displayed.
    pub fn pump(&mut self, wait: Duration) -> usize {
        let mut handled = 0;
        let first = match self.acquisition.frames().recv_timeout(wait) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        };
        if let Some(frame) = first {
            self.handle_frame(frame);
            handled += 1;
            while let Ok(frame) = self.acquisition.frames().try_recv() {
                self.handle_frame(frame);
                handled += 1;
            }
        }
        self.sample_throughput(Instant::now());
        handled
    }

    fn handle_frame(&mut self, frame: crate::frame::Frame) {
        log::trace!("frame {:?} handed off after {:?}", frame, frame.age());
        self.scheduler
            .on_frame(frame, Instant::now(), &mut self.pipeline, &mut self.sink);
    }

    fn sample_throughput(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_sample) < THROUGHPUT_PERIOD {
            return;
        }
        self.last_sample = now;
        let fps = self.acquisition.counter().take();
        self.sink.on_throughput(fps);

        let dropped = self.acquisition.dropped_frames();
        if dropped > self.last_dropped {
            log::debug!(
                "hand-off dropped {} frames in the last second",
                dropped - self.last_dropped
            );
            self.last_dropped = dropped;
        }
    }

    /// Pump until `shutdown` is set or `deadline` passes.
    pub fn run_until(&mut self, shutdown: &AtomicBool, deadline: Option<Instant>) {
        while !shutdown.load(Ordering::SeqCst) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            self.pump(RUN_POLL);
        }
    }
}

impl<S: PresentationSink> Drop for InspectionController<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
