//! Acquisition loop.
//!
//! A dedicated capture thread owns the camera while streaming, pulls frames with a bounded
//! wait and hands each one to the presentation context over a bounded channel. When the
//! channel is full the oldest queued frame is dropped, so latency never grows past
//! `queue_depth` frames.
//!
//! States: `Stopped -> Starting -> Running -> Stopping -> Stopped`. A capture thread that
//! does not finish within the join timeout is detached and the loop is marked abandoned;
//! its camera is not recovered.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{AcquisitionSettings, CameraSettings};
use crate::error::InspectError;
use crate::frame::Frame;
use crate::ingest::{CameraDevice, FrameFetch, ParameterValue};

/// Back-off after a driver error so a persistently failing device does not spin.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    AlreadyStopped,
    /// The capture thread exited and returned the camera.
    Joined,
    /// The capture thread missed the join timeout and was detached.
    Abandoned,
}

/// Frames acquired since the last `take`.
///
/// Only the capture thread increments; the throughput sampler reads and resets in one
/// atomic swap, so no increment is lost between the read and the reset.
#[derive(Clone, Debug, Default)]
pub struct FrameCounter(Arc<AtomicU64>);

impl FrameCounter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

/// Work sent to the capture thread while it owns the camera.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureCommand {
    SetParameter { name: String, value: ParameterValue },
}

/// Sending half of the frame hand-off with drop-oldest overflow.
struct FrameSender {
    tx: Sender<Frame>,
    /// Receiver clone used only to evict the oldest queued frame.
    evict: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameSender {
    /// Returns false once the presentation side is gone.
    fn send(&self, frame: Frame) -> bool {
        let frame = match self.tx.try_send(frame) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(frame)) => frame,
        };
        if self.evict.try_recv().is_ok() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => false,
            Err(TrySendError::Full(_)) => {
                // raced with another eviction; this frame is the one that goes
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }
}

struct CaptureThread {
    run: Arc<AtomicBool>,
    commands: Sender<CaptureCommand>,
    done: Receiver<Box<dyn CameraDevice>>,
    join: JoinHandle<()>,
}

pub struct AcquisitionLoop {
    state: AcquisitionState,
    camera: Option<Box<dyn CameraDevice>>,
    camera_name: String,
    frame_timeout: Duration,
    join_timeout: Duration,
    counter: FrameCounter,
    dropped: Arc<AtomicU64>,
    frames_tx: Sender<Frame>,
    frames_rx: Receiver<Frame>,
    thread: Option<CaptureThread>,
    abandoned: bool,
}

impl AcquisitionLoop {
    pub fn new(
        camera: Box<dyn CameraDevice>,
        camera_settings: &CameraSettings,
        settings: &AcquisitionSettings,
    ) -> Self {
        let (frames_tx, frames_rx) = bounded(settings.queue_depth.max(1));
        Self {
            state: AcquisitionState::Stopped,
            camera_name: camera.name().to_string(),
            camera: Some(camera),
            frame_timeout: camera_settings.frame_timeout,
            join_timeout: settings.join_timeout,
            counter: FrameCounter::default(),
            dropped: Arc::new(AtomicU64::new(0)),
            frames_tx,
            frames_rx,
            thread: None,
            abandoned: false,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AcquisitionState::Running
    }

    /// True once a capture thread has been detached. The camera is gone for good.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    /// Presentation side of the frame hand-off.
    pub fn frames(&self) -> &Receiver<Frame> {
        &self.frames_rx
    }

    pub fn counter(&self) -> FrameCounter {
        self.counter.clone()
    }

    /// Frames evicted from the hand-off queue since creation.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Start streaming. A no-op while already running.
    pub fn start(&mut self) -> Result<(), InspectError> {
        match self.state {
            AcquisitionState::Running => return Ok(()),
            AcquisitionState::Stopped => {}
            other => {
                return Err(InspectError::capture(format!(
                    "cannot start acquisition while {:?}",
                    other
                )))
            }
        }
        let mut camera = self.camera.take().ok_or_else(|| {
            InspectError::capture(format!(
                "camera {} is unavailable after an abandoned stop",
                self.camera_name
            ))
        })?;

        self.state = AcquisitionState::Starting;
        log::info!("acquisition: starting {}", self.camera_name);
        // an abandoned thread may still have delivered frames after its stop
        self.discard_queued();

        let run = Arc::new(AtomicBool::new(true));
        let (started_tx, started_rx) = bounded::<Result<(), InspectError>>(1);
        let (done_tx, done_rx) = bounded::<Box<dyn CameraDevice>>(1);
        let (commands_tx, commands_rx) = bounded::<CaptureCommand>(16);
        let sender = FrameSender {
            tx: self.frames_tx.clone(),
            evict: self.frames_rx.clone(),
            dropped: self.dropped.clone(),
        };
        let counter = self.counter.clone();
        let frame_timeout = self.frame_timeout;
        let run_thread = run.clone();

        let spawned = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                if let Err(err) = camera.start() {
                    let _ = started_tx.send(Err(err));
                    let _ = done_tx.send(camera);
                    return;
                }
                let _ = started_tx.send(Ok(()));
                capture_loop(
                    camera.as_mut(),
                    frame_timeout,
                    &run_thread,
                    &commands_rx,
                    &sender,
                    &counter,
                );
                if let Err(err) = camera.stop() {
                    log::warn!("{}", InspectError::Cleanup(err.to_string()));
                }
                let _ = done_tx.send(camera);
            });
        let join = match spawned {
            Ok(join) => join,
            Err(err) => {
                // the camera moved into the closure and is lost with it
                self.abandoned = true;
                self.state = AcquisitionState::Stopped;
                return Err(InspectError::capture(format!(
                    "failed to spawn capture thread: {}",
                    err
                )));
            }
        };

        match started_rx.recv_timeout(self.join_timeout) {
            Ok(Ok(())) => {
                self.thread = Some(CaptureThread {
                    run,
                    commands: commands_tx,
                    done: done_rx,
                    join,
                });
                self.state = AcquisitionState::Running;
                log::info!("acquisition: running");
                Ok(())
            }
            Ok(Err(err)) => {
                self.camera = done_rx.recv_timeout(self.join_timeout).ok();
                if self.camera.is_some() {
                    let _ = join.join();
                } else {
                    self.abandoned = true;
                }
                self.state = AcquisitionState::Stopped;
                log::warn!("acquisition: start failed: {}", err);
                Err(err)
            }
            Err(_) => {
                run.store(false, Ordering::Release);
                self.abandoned = true;
                self.state = AcquisitionState::Stopped;
                log::warn!(
                    "acquisition: camera start did not complete within {:?}; capture thread abandoned",
                    self.join_timeout
                );
                Err(InspectError::capture("camera start timed out"))
            }
        }
    }

    /// Stop streaming. Idempotent; never blocks longer than the join timeout.
    pub fn stop(&mut self) -> StopOutcome {
        let Some(thread) = self.thread.take() else {
            self.state = AcquisitionState::Stopped;
            return StopOutcome::AlreadyStopped;
        };
        self.state = AcquisitionState::Stopping;
        thread.run.store(false, Ordering::Release);
        drop(thread.commands);

        let outcome = match thread.done.recv_timeout(self.join_timeout) {
            Ok(camera) => {
                self.camera = Some(camera);
                if thread.join.join().is_err() {
                    log::warn!("acquisition: capture thread panicked during shutdown");
                }
                StopOutcome::Joined
            }
            Err(_) => {
                log::warn!(
                    "acquisition: capture thread did not stop within {:?}; abandoning it",
                    self.join_timeout
                );
                self.abandoned = true;
                StopOutcome::Abandoned
            }
        };
        self.state = AcquisitionState::Stopped;
        let stale = self.discard_queued();
        log::info!(
            "acquisition: stopped ({:?}, {} queued frames discarded)",
            outcome,
            stale
        );
        outcome
    }

    /// Drop frames still waiting in the hand-off; they predate any change made while stopped.
    fn discard_queued(&self) -> u64 {
        let stale = self.frames_rx.try_iter().count() as u64;
        self.dropped.fetch_add(stale, Ordering::Relaxed);
        stale
    }

    /// Change a camera parameter. Applied between frames while running, directly otherwise.
    pub fn set_parameter(&mut self, name: &str, value: ParameterValue) -> Result<(), InspectError> {
        if let Some(thread) = &self.thread {
            return thread
                .commands
                .send(CaptureCommand::SetParameter {
                    name: name.to_string(),
                    value,
                })
                .map_err(|_| InspectError::capture("capture thread is not accepting commands"));
        }
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| InspectError::capture("camera is unavailable"))?;
        value.apply(name, camera.as_mut())
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    camera: &mut dyn CameraDevice,
    frame_timeout: Duration,
    run: &AtomicBool,
    commands: &Receiver<CaptureCommand>,
    sender: &FrameSender,
    counter: &FrameCounter,
) {
    while run.load(Ordering::Acquire) {
        loop {
            match commands.try_recv() {
                Ok(CaptureCommand::SetParameter { name, value }) => {
                    match value.apply(&name, camera) {
                        Ok(()) => log::info!("camera: {} = {}", name, value),
                        Err(err) => log::warn!("camera: {} = {} rejected: {}", name, value, err),
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        match camera.get_frame(frame_timeout) {
            FrameFetch::Frame(frame) => {
                counter.increment();
                if !sender.send(frame) {
                    log::info!("acquisition: presentation side closed");
                    break;
                }
            }
            FrameFetch::Timeout => {}
            FrameFetch::Error(err) => {
                log::warn!("{}", err);
                std::thread::sleep(ERROR_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![tag], 1, 1, PixelFormat::Mono8)
    }

    #[test]
    fn counter_take_resets() {
        let counter = FrameCounter::default();
        counter.increment();
        counter.increment();
        assert_eq!(counter.take(), 2);
        assert_eq!(counter.take(), 0);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let (tx, rx) = bounded(2);
        let sender = FrameSender {
            tx,
            evict: rx.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        for tag in 1..=4 {
            assert!(sender.send(frame(tag)));
        }
        let kept: Vec<u8> = rx.try_iter().map(|f| f.data()[0]).collect();
        assert_eq!(kept, vec![3, 4]);
        assert_eq!(sender.dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn stop_discards_queued_frames() {
        let settings = CameraSettings {
            device: "stub://line".into(),
            width: 16,
            height: 8,
            target_fps: 200,
            frame_timeout: Duration::from_millis(100),
            pixel_format: PixelFormat::Mono8,
            parameters: Vec::new(),
            roi: None,
        };
        let acquisition_settings = AcquisitionSettings {
            join_timeout: Duration::from_millis(1000),
            queue_depth: 4,
        };
        let camera = Box::new(crate::ingest::SyntheticCamera::new(settings.clone()));
        let mut acquisition = AcquisitionLoop::new(camera, &settings, &acquisition_settings);

        acquisition.start().expect("start");
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(acquisition.stop(), StopOutcome::Joined);

        assert!(acquisition.frames().is_empty());
        assert!(acquisition.dropped_frames() > 0);
    }
}
