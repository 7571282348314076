use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use line_inspector::config::{CameraSettings, InspectorConfig};
use line_inspector::{
    AcquisitionState, AnalysisPipeline, AnalysisResult, CameraDevice, FrameFetch, InspectError,
    InspectionController, ParameterValue, PixelFormat, PresentationSink, Raster, Roi,
    StopOutcome, SyntheticCamera,
};

#[derive(Default)]
struct RecordingSink {
    displayed: usize,
    last_size: Option<(u32, u32)>,
    sizes: Vec<(u32, u32)>,
    results: Vec<AnalysisResult>,
    statuses: Vec<String>,
    throughput: Vec<u64>,
}

impl PresentationSink for RecordingSink {
    fn on_frame_display(&mut self, raster: &Raster) {
        self.displayed += 1;
        self.last_size = Some((raster.width(), raster.height()));
        self.sizes.push((raster.width(), raster.height()));
    }

    fn on_result(&mut self, result: AnalysisResult) {
        self.results.push(result);
    }

    fn on_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn on_throughput(&mut self, frames_per_second: u64) {
        self.throughput.push(frames_per_second);
    }
}

fn test_config(device: &str) -> InspectorConfig {
    let mut cfg = InspectorConfig::default();
    cfg.camera = CameraSettings {
        device: device.to_string(),
        width: 64,
        height: 48,
        target_fps: 100,
        frame_timeout: Duration::from_millis(100),
        pixel_format: PixelFormat::Rgb24,
        parameters: Vec::new(),
        roi: None,
    };
    cfg.acquisition.join_timeout = Duration::from_millis(1000);
    cfg.analysis.interval = Duration::from_millis(50);
    cfg
}

fn controller(device: &str) -> InspectionController<RecordingSink> {
    let cfg = test_config(device);
    let camera = Box::new(SyntheticCamera::new(cfg.camera.clone()));
    InspectionController::new(camera, AnalysisPipeline::default(), RecordingSink::default(), &cfg)
}

/// Pump until `done` holds or `limit` passes.
fn pump_until(
    controller: &mut InspectionController<RecordingSink>,
    limit: Duration,
    done: impl Fn(&RecordingSink) -> bool,
) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        controller.pump(Duration::from_millis(20));
        if done(controller.sink()) {
            return true;
        }
    }
    false
}

#[test]
fn start_stream_and_stop() {
    let mut controller = controller("stub://line");
    assert_eq!(controller.state(), AcquisitionState::Stopped);

    controller.start().expect("start");
    assert_eq!(controller.state(), AcquisitionState::Running);
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| {
        s.displayed >= 5 && !s.results.is_empty()
    }));
    assert_eq!(controller.sink().last_size, Some((64, 48)));

    assert_eq!(controller.stop(), StopOutcome::Joined);
    assert_eq!(controller.state(), AcquisitionState::Stopped);
    assert!(controller
        .sink()
        .statuses
        .iter()
        .any(|s| s.starts_with("capture started")));
}

#[test]
fn stop_is_idempotent() {
    let mut controller = controller("stub://line");
    assert_eq!(controller.stop(), StopOutcome::AlreadyStopped);
    controller.start().expect("start");
    assert_eq!(controller.stop(), StopOutcome::Joined);
    assert_eq!(controller.stop(), StopOutcome::AlreadyStopped);
}

#[test]
fn stop_then_start_does_not_deadlock() {
    let mut controller = controller("stub://line");
    let began = Instant::now();
    for _ in 0..5 {
        controller.start().expect("start");
        assert_eq!(controller.stop(), StopOutcome::Joined);
    }
    controller.start().expect("restart");
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| s.displayed > 0));
    controller.stop();
    assert!(began.elapsed() < Duration::from_secs(10));
}

#[test]
fn failed_start_reverts_to_stopped() {
    let mut controller = controller("stub://line?fail-start");
    let err = controller.start().unwrap_err();
    assert!(matches!(err, InspectError::Capture(_)));
    assert_eq!(controller.state(), AcquisitionState::Stopped);
    assert!(!controller.acquisition().is_abandoned());
    assert_eq!(controller.stop(), StopOutcome::AlreadyStopped);
}

#[test]
fn transient_capture_errors_do_not_end_the_loop() {
    let mut controller = controller("stub://line?flaky");
    controller.start().expect("start");
    // every fifth fetch fails; frames keep arriving past several failures
    assert!(pump_until(&mut controller, Duration::from_secs(5), |s| s.displayed >= 20));
    assert_eq!(controller.state(), AcquisitionState::Running);
    controller.stop();
}

#[test]
fn timeouts_keep_the_loop_alive_and_stop_joins() {
    let mut controller = controller("stub://line?slow");
    controller.start().expect("start");
    assert_eq!(controller.pump(Duration::from_millis(300)), 0);
    assert_eq!(controller.state(), AcquisitionState::Running);
    assert_eq!(controller.stop(), StopOutcome::Joined);
}

/// Blocks in `get_frame` far longer than any join timeout.
struct StuckCamera;

impl CameraDevice for StuckCamera {
    fn name(&self) -> &str {
        "stuck"
    }

    fn start(&mut self) -> Result<(), InspectError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), InspectError> {
        Ok(())
    }

    fn get_frame(&mut self, _timeout: Duration) -> FrameFetch {
        thread::sleep(Duration::from_secs(3));
        FrameFetch::Timeout
    }

    fn set_enum(&mut self, _name: &str, _value: &str) -> Result<(), InspectError> {
        Ok(())
    }

    fn set_float(&mut self, _name: &str, _value: f64) -> Result<(), InspectError> {
        Ok(())
    }

    fn set_int(&mut self, _name: &str, _value: i64) -> Result<(), InspectError> {
        Ok(())
    }
}

#[test]
fn stuck_capture_thread_is_abandoned() {
    let mut cfg = test_config("stuck");
    cfg.acquisition.join_timeout = Duration::from_millis(200);
    let mut controller = InspectionController::new(
        Box::new(StuckCamera),
        AnalysisPipeline::default(),
        RecordingSink::default(),
        &cfg,
    );
    controller.start().expect("start");
    thread::sleep(Duration::from_millis(50));

    let began = Instant::now();
    assert_eq!(controller.stop(), StopOutcome::Abandoned);
    assert!(began.elapsed() < Duration::from_secs(2));
    assert_eq!(controller.state(), AcquisitionState::Stopped);
    assert!(controller.acquisition().is_abandoned());

    // the camera went with the abandoned thread
    assert!(controller.start().is_err());
}

#[test]
fn live_parameter_changes_reach_the_camera() {
    let mut controller = controller("stub://line");
    controller.start().expect("start");
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| s.displayed > 0));

    controller
        .set_parameter("Width", ParameterValue::Int(32))
        .expect("set width");
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| {
        s.last_size == Some((32, 48))
    }));
    controller.stop();
}

#[test]
fn frames_from_before_a_stop_are_not_shown_after_restart() {
    let mut controller = controller("stub://line");
    controller.start().expect("start");
    thread::sleep(Duration::from_millis(200));
    assert_eq!(controller.stop(), StopOutcome::Joined);
    assert!(controller.acquisition().frames().is_empty());

    controller
        .set_parameter("Width", ParameterValue::Int(32))
        .expect("set width");
    controller.start().expect("restart");
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| s.displayed > 0));
    controller.stop();

    let sizes = &controller.sink().sizes;
    assert!(sizes.iter().all(|size| *size == (32, 48)), "{:?}", sizes);
}

#[test]
fn roi_change_restarts_capture() {
    let mut controller = controller("stub://line");
    controller.start().expect("start");
    controller
        .apply_roi(Roi {
            width: 40,
            height: 30,
            offset_x: 4,
            offset_y: 2,
        })
        .expect("apply roi");
    assert_eq!(controller.state(), AcquisitionState::Running);
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| {
        s.last_size == Some((40, 30))
    }));
    assert!(controller
        .sink()
        .statuses
        .iter()
        .any(|s| s == "roi set to 40x30+4+2"));
    controller.stop();
}

#[test]
fn roi_and_auto_exposure_while_stopped() {
    let mut controller = controller("stub://line");
    controller.apply_roi(Roi::full()).expect("full roi");
    controller.set_auto_exposure(true).expect("auto on");
    controller.set_auto_exposure(false).expect("auto off");
    assert_eq!(controller.state(), AcquisitionState::Stopped);
    let statuses = &controller.sink().statuses;
    assert!(statuses.iter().any(|s| s == "auto exposure on"));
    assert!(statuses.iter().any(|s| s == "auto exposure off"));
}

#[test]
fn analysis_can_be_paused_while_display_continues() {
    let mut controller = controller("stub://line");
    controller.set_analyze_enabled(false);
    controller.start().expect("start");
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| s.displayed >= 10));
    assert!(controller.sink().results.is_empty());

    controller.set_analyze_enabled(true);
    assert!(pump_until(&mut controller, Duration::from_secs(3), |s| !s.results.is_empty()));
    controller.stop();
}

#[test]
fn throughput_is_sampled_once_per_second() {
    let mut controller = controller("stub://line");
    controller.start().expect("start");
    let shutdown = AtomicBool::new(false);
    controller.run_until(&shutdown, Some(Instant::now() + Duration::from_millis(2300)));
    controller.stop();

    let samples = &controller.sink().throughput;
    assert!(!samples.is_empty() && samples.len() <= 3);
    assert!(samples.iter().any(|fps| *fps > 0));
}

#[test]
fn slow_presentation_drops_oldest_frames() {
    let mut cfg = test_config("stub://line");
    cfg.acquisition.queue_depth = 1;
    let camera = Box::new(SyntheticCamera::new(cfg.camera.clone()));
    let mut controller = InspectionController::new(
        camera,
        AnalysisPipeline::default(),
        RecordingSink::default(),
        &cfg,
    );
    controller.start().expect("start");
    thread::sleep(Duration::from_millis(400));
    let handled = controller.pump(Duration::from_millis(10));
    controller.stop();

    assert!(handled >= 1 && handled < 10);
    assert!(controller.acquisition().dropped_frames() > 0);
}
