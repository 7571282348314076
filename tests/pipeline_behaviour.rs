use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use line_inspector::analysis::{BarcodeDecoder, BarcodeOutcome, NoBarcodeDecoder};
use line_inspector::detect::{ScriptedSession, Vocabulary};
use line_inspector::{
    AnalysisPipeline, AnalysisResult, AnalysisScheduler, Brightness, DominantColor, Frame,
    ObjectDetector, PixelFormat, PresentationSink, ProductClassifier, Raster, WeightClass,
    PRODUCT_UNDETERMINED,
};

#[derive(Default)]
struct RecordingSink {
    displayed: usize,
    results: Vec<AnalysisResult>,
}

impl PresentationSink for RecordingSink {
    fn on_frame_display(&mut self, _raster: &Raster) {
        self.displayed += 1;
    }

    fn on_result(&mut self, result: AnalysisResult) {
        self.results.push(result);
    }
}

/// Decoder that reports a fixed code on any plane whose first pixel is dark.
struct DarkCornerDecoder;

impl BarcodeDecoder for DarkCornerDecoder {
    fn name(&self) -> &'static str {
        "dark-corner"
    }

    fn decode_luma(&mut self, luma: &[u8], _width: u32, _height: u32) -> BarcodeOutcome {
        if luma[0] < 64 {
            BarcodeOutcome::Found("CODE128-0042".into())
        } else {
            BarcodeOutcome::NotFound
        }
    }
}

/// One detector record: centre (320, 320), width 100, the given height and objectness,
/// two class scores.
fn record(height: f32, objectness: f32, class: usize) -> Vec<f32> {
    let mut scores = [0.1f32, 0.1];
    scores[class] = 0.8;
    vec![
        320.0, 320.0, 100.0, height, objectness, scores[0], scores[1],
    ]
}

fn detector(records: &[Vec<f32>]) -> (ObjectDetector, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let session =
        ScriptedSession::new([1, 3, 640, 640]).with_output(records.concat());
    let calls = session.calls();
    let vocab = Vocabulary::new(vec!["jar".into(), "pack".into()]);
    (ObjectDetector::new(Box::new(session), Some(vocab)), calls)
}

fn rgb_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    let data = rgb.repeat((width * height) as usize);
    Frame::new(data, width, height, PixelFormat::Rgb24)
}

#[test]
fn every_frame_is_displayed_and_analysis_is_throttled() {
    let mut scheduler = AnalysisScheduler::new(Duration::from_millis(500));
    let mut pipeline = AnalysisPipeline::default();
    let mut sink = RecordingSink::default();

    let t0 = Instant::now();
    for i in 0..20u64 {
        let now = t0 + Duration::from_millis(i * 100);
        scheduler.on_frame(rgb_frame(32, 24, [90, 90, 90]), now, &mut pipeline, &mut sink);
    }

    assert_eq!(sink.displayed, 20);
    assert!(sink.results.len() >= 3 && sink.results.len() <= 4);
}

#[test]
fn undecodable_frames_are_still_displayed() {
    let mut scheduler = AnalysisScheduler::new(Duration::from_millis(500));
    let mut pipeline = AnalysisPipeline::default();
    let mut sink = RecordingSink::default();

    let broken = Frame::new(vec![0u8; 7], 16, 16, PixelFormat::Rgb24);
    assert!(scheduler.on_frame(broken, Instant::now(), &mut pipeline, &mut sink));

    assert_eq!(sink.displayed, 1);
    assert_eq!(sink.results, vec![AnalysisResult::degraded()]);
}

#[test]
fn pixel_stages_on_solid_rasters() {
    let mut pipeline = AnalysisPipeline::default();

    let black = pipeline.analyze_raster(&Raster::filled(200, 100, [0, 0, 0]));
    assert_eq!(black.brightness, Brightness::VeryDark);
    assert_eq!(black.dominant_color, DominantColor::Balanced);

    let white = pipeline.analyze_raster(&Raster::filled(200, 100, [255, 255, 255]));
    assert_eq!(white.brightness, Brightness::VeryBright);

    let red = pipeline.analyze_raster(&Raster::filled(200, 100, [255, 0, 0]));
    assert_eq!(red.dominant_color, DominantColor::Red);

    let blue = pipeline.analyze_raster(&Raster::filled(200, 100, [20, 40, 160]));
    assert_eq!(blue.dominant_color, DominantColor::Blue);
}

#[test]
fn barcode_text_is_reported_when_found() {
    let mut pipeline = AnalysisPipeline::new(Box::new(DarkCornerDecoder));
    let found = pipeline.analyze_raster(&Raster::filled(40, 40, [10, 10, 10]));
    assert_eq!(found.barcode_text.as_deref(), Some("CODE128-0042"));

    let mut pipeline = AnalysisPipeline::new(Box::new(NoBarcodeDecoder));
    let missing = pipeline.analyze_raster(&Raster::filled(40, 40, [10, 10, 10]));
    assert_eq!(missing.barcode_text, None);
}

#[test]
fn detections_respect_threshold_and_keep_order() {
    let (detector, calls) = detector(&[
        record(150.0, 0.95, 1),
        record(150.0, 0.40, 0),
        record(150.0, 0.10, 0),
        record(500.0, 0.41, 0),
    ]);
    let mut pipeline = AnalysisPipeline::default().with_detector(detector);

    let result = pipeline.analyze_raster(&Raster::filled(640, 640, [120, 120, 120]));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.objects, vec!["pack", "jar"]);
    assert!(result.detections.iter().all(|d| d.confidence >= 0.4));
    // last box: 500px tall
    assert_eq!(result.weight_class, WeightClass::Class70g);
}

#[test]
fn weight_uses_frame_pixel_height() {
    // 640 input rows map to 1920 frame rows, so 320 input pixels are 960 frame pixels
    let (detector, _) = detector(&[record(320.0, 0.9, 0)]);
    let mut pipeline = AnalysisPipeline::default().with_detector(detector);
    let result = pipeline.analyze_raster(&Raster::filled(640, 1920, [120, 120, 120]));
    assert_eq!(result.detections[0].rect.h, 960);
    assert_eq!(result.weight_class, WeightClass::Class100g);
}

#[test]
fn without_classifier_product_stays_undetermined() {
    let (detector, _) = detector(&[record(150.0, 0.9, 0)]);
    let mut pipeline = AnalysisPipeline::default().with_detector(detector);
    assert!(!pipeline.has_classifier());

    let result = pipeline.analyze_raster(&Raster::filled(640, 640, [120, 120, 120]));

    assert_eq!(result.objects.len(), 1);
    assert!(result.classifications.is_empty());
    assert_eq!(result.product_label, PRODUCT_UNDETERMINED);
    assert_eq!(result.product_confidence, 0.0);
}

#[test]
fn classifier_runs_once_per_detection() {
    let (detector, _) = detector(&[record(150.0, 0.9, 0), record(200.0, 0.8, 1)]);
    let session = ScriptedSession::new([1, 3, 224, 224])
        .then_output(vec![2.0, 0.0])
        .then_output(vec![0.0, 2.0]);
    let classifier_calls = session.calls();
    let classifier =
        ProductClassifier::new(Box::new(session), vec!["tea 50g".into(), "coffee 100g".into()]);
    let mut pipeline = AnalysisPipeline::default()
        .with_detector(detector)
        .with_classifier(classifier);

    let result = pipeline.analyze_raster(&Raster::filled(640, 640, [120, 120, 120]));

    assert_eq!(classifier_calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.classifications.len(), 2);
    assert_eq!(
        result.classifications[0].as_ref().map(|c| c.label.as_str()),
        Some("tea 50g")
    );
    // last classification wins
    assert_eq!(result.product_label, "coffee 100g");
    assert!(result.product_confidence > 80.0 && result.product_confidence <= 100.0);
}

#[test]
fn detector_failure_degrades_only_detection_fields() {
    let session = ScriptedSession::new([1, 3, 640, 640]).failing("out of memory");
    let calls = session.calls();
    let mut pipeline = AnalysisPipeline::new(Box::new(DarkCornerDecoder))
        .with_detector(ObjectDetector::new(Box::new(session), None));

    let result = pipeline.analyze_raster(&Raster::filled(100, 100, [5, 5, 5]));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(result.objects.is_empty());
    assert_eq!(result.weight_class, WeightClass::Unknown);
    assert_eq!(result.barcode_text.as_deref(), Some("CODE128-0042"));
    assert_eq!(result.brightness, Brightness::VeryDark);
}

#[test]
fn malformed_input_yields_degraded_result() {
    let (detector, calls) = detector(&[record(150.0, 0.9, 0)]);
    let mut pipeline = AnalysisPipeline::default().with_detector(detector);

    assert_eq!(pipeline.analyze_raster(&Raster::empty()), AnalysisResult::degraded());
    let zero = Frame::new(Vec::new(), 0, 0, PixelFormat::Rgb24);
    assert_eq!(pipeline.analyze(zero), AnalysisResult::degraded());
    let short = Frame::new(vec![1, 2, 3, 4], 8, 8, PixelFormat::BayerRg8);
    assert_eq!(pipeline.analyze(short), AnalysisResult::degraded());
    // odd NV12 geometry without room for the last chroma row or pair
    let odd_rows = Frame::new(vec![0u8; 9], 2, 3, PixelFormat::Nv12);
    assert_eq!(pipeline.analyze(odd_rows), AnalysisResult::degraded());
    let odd_cols = Frame::new(vec![0u8; 9], 3, 2, PixelFormat::Nv12);
    assert_eq!(pipeline.analyze(odd_cols), AnalysisResult::degraded());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
