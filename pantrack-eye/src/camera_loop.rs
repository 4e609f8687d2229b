//! Per-camera capture -> detect -> publish -> dispatch loop
//!
//! Each loop owns its frame source outright. Blocking calls into the source
//! and the detector run on the blocking pool under a timeout, so a stuck
//! device only slows its own loop. A loop never has more than one open, one
//! read and one inference outstanding, however long they overrun.

use crate::annotate::annotate;
use crate::classify::ClassTable;
use crate::detector::Detector;
use crate::error::VisionError;
use crate::frame::Frame;
use crate::slot::LatestFrameSlot;
use crate::source::{FrameSource, SourceOpener};
use crate::telemetry::CameraTelemetry;
use crate::throttle::{DispatchOutcome, DispatchThrottle};
use pantrack_core::{CameraConfig, CameraId, CaptureConfig, Detection};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// State a camera loop shares with query callers. Every field has its own lock.
pub struct CameraControl {
    camera_id: CameraId,
    device: RwLock<String>,
    pending_device: Mutex<Option<String>>,
    slot: LatestFrameSlot,
    telemetry: CameraTelemetry,
}

impl CameraControl {
    pub fn new(camera: &CameraConfig) -> Self {
        Self {
            camera_id: camera.camera_id,
            device: RwLock::new(camera.device.clone()),
            pending_device: Mutex::new(None),
            slot: LatestFrameSlot::new(),
            telemetry: CameraTelemetry::default(),
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn slot(&self) -> &LatestFrameSlot {
        &self.slot
    }

    pub fn telemetry(&self) -> &CameraTelemetry {
        &self.telemetry
    }

    /// Device the loop is currently bound to
    pub fn device(&self) -> String {
        self.device.read().clone()
    }

    /// Ask the loop to switch devices at the start of its next tick.
    /// A later request before then replaces an earlier one.
    pub fn request_device(&self, device: impl Into<String>) {
        *self.pending_device.lock() = Some(device.into());
    }

    fn take_pending_device(&self) -> Option<String> {
        self.pending_device.lock().take()
    }

    fn set_device(&self, device: &str) {
        *self.device.write() = device.to_string();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No frame this tick (open or read failed, or timed out)
    NoFrame,
    Processed {
        detections: usize,
        target: Option<Detection>,
        dispatch: DispatchOutcome,
    },
}

type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;
type OpenTask = JoinHandle<Result<Box<dyn FrameSource>, VisionError>>;

/// Clears the in-flight flag when the inference finishes, panics, or is never run
struct InferenceGuard(Arc<AtomicBool>);

impl Drop for InferenceGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CameraLoop {
    camera: CameraConfig,
    capture: CaptureConfig,
    opener: Arc<dyn SourceOpener>,
    detector: Arc<dyn Detector>,
    classes: Arc<ClassTable>,
    throttle: Arc<DispatchThrottle>,
    control: Arc<CameraControl>,
    source: Option<SharedSource>,
    /// Open that overran its timeout; picked up by the next attempt
    pending_open: Option<OpenTask>,
    inference_busy: Arc<AtomicBool>,
    consecutive_failures: u32,
}

impl CameraLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: CameraConfig,
        capture: CaptureConfig,
        opener: Arc<dyn SourceOpener>,
        detector: Arc<dyn Detector>,
        classes: Arc<ClassTable>,
        throttle: Arc<DispatchThrottle>,
        control: Arc<CameraControl>,
    ) -> Self {
        Self {
            camera,
            capture,
            opener,
            detector,
            classes,
            throttle,
            control,
            source: None,
            pending_open: None,
            inference_busy: Arc::new(AtomicBool::new(false)),
            consecutive_failures: 0,
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera.camera_id
    }

    pub fn control(&self) -> &Arc<CameraControl> {
        &self.control
    }

    /// One iteration without the rate-limit sleep
    pub async fn tick(&mut self) -> TickOutcome {
        self.apply_pending_device();

        let frame = match self.read_frame().await {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                self.control.telemetry.record_read_failure();
                warn!("Camera {} read failed: {}", self.camera.camera_id, e);
                self.on_read_failure();
                return TickOutcome::NoFrame;
            }
        };
        self.consecutive_failures = 0;

        let detections = match self.detect(frame.clone()).await {
            Ok(detections) => detections,
            Err(e) => {
                self.control.telemetry.record_detector_failure();
                warn!("Camera {} detector failed: {}", self.camera.camera_id, e);
                Vec::new()
            }
        };
        let detection_count = detections.len();

        let classified = self.classes.classify(detections);
        let target = ClassTable::select_target(&classified).cloned();

        self.control
            .slot
            .publish(annotate(&frame, &classified, target.as_ref()));

        let dispatch = self
            .throttle
            .maybe_dispatch(self.camera.camera_id, target.as_ref(), frame.center());

        self.control.telemetry.record_frame();
        self.control.telemetry.record_dispatch(dispatch.is_skipped());

        TickOutcome::Processed {
            detections: detection_count,
            target,
            dispatch,
        }
    }

    fn apply_pending_device(&mut self) {
        let Some(device) = self.control.take_pending_device() else {
            return;
        };
        info!(
            "Camera {} switching device {} -> {}",
            self.camera.camera_id, self.camera.device, device
        );
        self.close_source();
        self.abandon_pending_open();
        self.control.set_device(&device);
        self.camera.device = device;
        self.consecutive_failures = 0;
        self.throttle.reset(self.camera.camera_id);
    }

    async fn open_source(&mut self) -> Result<SharedSource, VisionError> {
        let mut task = match self.pending_open.take() {
            Some(task) => task,
            None => {
                let opener = self.opener.clone();
                let camera = self.camera.clone();
                tokio::task::spawn_blocking(move || opener.open(&camera))
            }
        };

        let source = match timeout(self.capture.read_timeout(), &mut task).await {
            Err(_) => {
                self.pending_open = Some(task);
                return Err(VisionError::Timeout(format!(
                    "opening device {} took longer than {:?}",
                    self.camera.device,
                    self.capture.read_timeout()
                )));
            }
            Ok(Err(join)) => return Err(VisionError::Camera(format!("open task failed: {}", join))),
            Ok(Ok(result)) => result?,
        };

        info!("Camera {} opened device {}", self.camera.camera_id, source.device());
        let shared: SharedSource = Arc::new(Mutex::new(source));
        self.source = Some(shared.clone());
        Ok(shared)
    }

    async fn read_frame(&mut self) -> Result<Frame, VisionError> {
        let source = match self.source.clone() {
            Some(source) => source,
            None => self.open_source().await?,
        };

        let task = tokio::task::spawn_blocking(move || {
            // A read that outlived its timeout may still hold the source
            let mut guard = source
                .try_lock()
                .ok_or_else(|| VisionError::Read("previous read still in progress".to_string()))?;
            guard.read()
        });

        match timeout(self.capture.read_timeout(), task).await {
            Err(_) => Err(VisionError::Timeout(format!(
                "frame read took longer than {:?}",
                self.capture.read_timeout()
            ))),
            Ok(Err(join)) => Err(VisionError::Read(format!("read task failed: {}", join))),
            Ok(Ok(result)) => result,
        }
    }

    async fn detect(&self, frame: Arc<Frame>) -> Result<Vec<Detection>, VisionError> {
        if self.inference_busy.swap(true, Ordering::AcqRel) {
            return Err(VisionError::Detector(format!(
                "{} still running a previous inference",
                self.detector.name()
            )));
        }
        let guard = InferenceGuard(self.inference_busy.clone());
        let detector = self.detector.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            detector.infer(&frame)
        });

        match timeout(self.capture.detect_timeout(), task).await {
            Err(_) => Err(VisionError::Timeout(format!(
                "{} took longer than {:?}",
                self.detector.name(),
                self.capture.detect_timeout()
            ))),
            Ok(Err(join)) => Err(VisionError::Detector(format!("{} task failed: {}", self.detector.name(), join))),
            Ok(Ok(result)) => result,
        }
    }

    fn on_read_failure(&mut self) {
        self.consecutive_failures += 1;
        let limit = self.capture.reopen_after_failures;
        if limit > 0 && self.consecutive_failures >= limit && self.source.is_some() {
            warn!(
                "Camera {} failed {} reads in a row, reopening {}",
                self.camera.camera_id, self.consecutive_failures, self.camera.device
            );
            self.close_source();
            self.control.telemetry.record_reopen();
            self.consecutive_failures = 0;
        }
    }

    /// Close whatever a still-running open eventually returns
    fn abandon_pending_open(&mut self) {
        let Some(task) = self.pending_open.take() else {
            return;
        };
        let camera_id = self.camera.camera_id;
        tokio::spawn(async move {
            if let Ok(Ok(mut late)) = task.await {
                debug!("Camera {} closing late-opened {}", camera_id, late.device());
                let _ = tokio::task::spawn_blocking(move || late.close()).await;
            }
        });
    }

    fn close_source(&mut self) {
        if let Some(source) = self.source.take() {
            // If a stuck read still holds it, the handle closes when that read returns
            if let Some(mut guard) = source.try_lock() {
                guard.close();
            }
            debug!("Camera {} closed its source", self.camera.camera_id);
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let span = info_span!("camera", camera_id = self.camera.camera_id.0);
        tokio::spawn(self.run(shutdown).instrument(span))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Camera loop started on device {} at up to {} fps",
            self.camera.device, self.capture.max_fps
        );
        let period = self.capture.frame_period();
        let retry_delay: Duration = self.capture.retry_delay();

        loop {
            if *shutdown.borrow() {
                break;
            }
            let started = Instant::now();
            let deadline = match self.tick().await {
                TickOutcome::NoFrame => Instant::now() + retry_delay,
                TickOutcome::Processed { .. } => started + period,
            };

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.close_source();
        self.abandon_pending_open();
        info!("Camera loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ColorBlobDetector;
    use pantrack_core::{DetectionConfig, DispatchConfig};
    use pantrack_motor::ActuationQueue;
    use pantrack_storage::CoordinateStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves scripted frames; `None` entries are read failures
    struct ScriptedSource {
        script: VecDeque<Option<Frame>>,
        closed: Arc<AtomicUsize>,
    }

    impl FrameSource for ScriptedSource {
        fn device(&self) -> &str {
            "scripted"
        }

        fn read(&mut self) -> Result<Frame, VisionError> {
            match self.script.pop_front() {
                Some(Some(frame)) => Ok(frame),
                _ => Err(VisionError::Read("scripted failure".to_string())),
            }
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedOpener {
        script: Mutex<Vec<Option<Frame>>>,
        opens: AtomicUsize,
        closed: Arc<AtomicUsize>,
        devices: Mutex<Vec<String>>,
        /// Applied to the first open only
        first_open_delay: Mutex<Option<Duration>>,
    }

    impl ScriptedOpener {
        fn new(script: Vec<Option<Frame>>) -> Self {
            Self {
                script: Mutex::new(script),
                opens: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
                devices: Mutex::new(Vec::new()),
                first_open_delay: Mutex::new(None),
            }
        }
    }

    impl SourceOpener for ScriptedOpener {
        fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameSource>, VisionError> {
            let delay = self.first_open_delay.lock().take();
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.devices.lock().push(camera.device.clone());
            Ok(Box::new(ScriptedSource {
                script: self.script.lock().clone().into_iter().collect(),
                closed: self.closed.clone(),
            }))
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &str {
            "failing"
        }

        fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
            Err(VisionError::Detector("model crashed".to_string()))
        }
    }

    /// Blocks far past the timeout on its first call, then answers instantly
    struct HangOnceDetector {
        calls: AtomicUsize,
        hang: Duration,
    }

    impl Detector for HangOnceDetector {
        fn name(&self) -> &str {
            "hang-once"
        }

        fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(self.hang);
            }
            Ok(Vec::new())
        }
    }

    fn red_square_frame() -> Frame {
        let mut frame = Frame::filled(64, 48, [0, 0, 0]);
        for x in 40..50 {
            for y in 20..30 {
                frame.image.put_pixel(x, y, image::Rgb([255, 0, 0]));
            }
        }
        frame
    }

    struct Harness {
        camera_loop: CameraLoop,
        opener: Arc<ScriptedOpener>,
        store: Arc<CoordinateStore>,
        queue: Arc<ActuationQueue>,
    }

    fn harness(script: Vec<Option<Frame>>, detector: Arc<dyn Detector>, interval_ms: u64) -> Harness {
        let capture = CaptureConfig {
            reopen_after_failures: 2,
            ..CaptureConfig::default()
        };
        harness_with(script, detector, interval_ms, capture)
    }

    fn harness_with(
        script: Vec<Option<Frame>>,
        detector: Arc<dyn Detector>,
        interval_ms: u64,
        capture: CaptureConfig,
    ) -> Harness {
        let store = Arc::new(CoordinateStore::new(100));
        let queue = Arc::new(ActuationQueue::new(16));
        let dispatch = DispatchConfig {
            min_interval_ms: interval_ms,
            deadband_px: 0,
        };
        let throttle = Arc::new(DispatchThrottle::new(&dispatch, store.clone(), queue.clone()));
        let opener = Arc::new(ScriptedOpener::new(script));
        let camera = CameraConfig::new(1, "0");
        let control = Arc::new(CameraControl::new(&camera));
        let camera_loop = CameraLoop::new(
            camera,
            capture,
            opener.clone(),
            detector,
            Arc::new(ClassTable::from(&DetectionConfig::default())),
            throttle,
            control,
        );
        Harness {
            camera_loop,
            opener,
            store,
            queue,
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_and_dispatches_target() {
        let mut h = harness(
            vec![Some(red_square_frame())],
            Arc::new(ColorBlobDetector::default()),
            0,
        );
        let outcome = h.camera_loop.tick().await;
        match outcome {
            TickOutcome::Processed { detections, target, dispatch } => {
                assert_eq!(detections, 1);
                assert_eq!(target.map(|t| (t.x, t.y)), Some((45, 25)));
                assert!(matches!(dispatch, DispatchOutcome::Dispatched { enqueued: true, .. }));
            }
            other => panic!("Expected Processed, got {:?}", other),
        }

        assert!(h.camera_loop.control().slot().consume().is_some());
        let latest = h.store.latest(CameraId(1)).unwrap();
        assert!(latest.has_target);
        assert_eq!(h.queue.len(), 1);
        assert_eq!(h.camera_loop.control().telemetry().snapshot(CameraId(1)).frames_processed, 1);
    }

    #[tokio::test]
    async fn test_empty_frame_dispatches_absence_at_center() {
        let mut h = harness(
            vec![Some(Frame::filled(64, 48, [0, 0, 0]))],
            Arc::new(ColorBlobDetector::default()),
            0,
        );
        h.camera_loop.tick().await;
        let latest = h.store.latest(CameraId(1)).unwrap();
        assert!(!latest.has_target);
        assert_eq!((latest.x, latest.y), (32, 24));
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_detector_failure_counts_as_no_detection() {
        let mut h = harness(vec![Some(red_square_frame())], Arc::new(FailingDetector), 0);
        let outcome = h.camera_loop.tick().await;
        assert!(matches!(outcome, TickOutcome::Processed { detections: 0, target: None, .. }));
        assert!(!h.store.latest(CameraId(1)).unwrap().has_target);
        let snap = h.camera_loop.control().telemetry().snapshot(CameraId(1));
        assert_eq!(snap.detector_failures, 1);
    }

    #[tokio::test]
    async fn test_read_failures_trigger_reopen() {
        let mut h = harness(vec![None, None, None], Arc::new(ColorBlobDetector::default()), 0);
        assert_eq!(h.camera_loop.tick().await, TickOutcome::NoFrame);
        assert_eq!(h.camera_loop.tick().await, TickOutcome::NoFrame);
        assert_eq!(h.opener.closed.load(Ordering::SeqCst), 1);

        // next tick opens a fresh handle
        h.camera_loop.tick().await;
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 2);
        assert!(h.store.camera_ids().is_empty());
        let snap = h.camera_loop.control().telemetry().snapshot(CameraId(1));
        assert_eq!(snap.read_failures, 3);
        assert_eq!(snap.reopens, 1);
    }

    #[tokio::test]
    async fn test_device_switch_rebinds_and_resets_throttle() {
        let frames = vec![Some(red_square_frame()); 4];
        let mut h = harness(frames, Arc::new(ColorBlobDetector::default()), 60_000);

        h.camera_loop.tick().await;
        let throttled = h.camera_loop.tick().await;
        assert!(matches!(throttled, TickOutcome::Processed { ref dispatch, .. } if dispatch.is_skipped()));

        h.camera_loop.control().request_device("3");
        let switched = h.camera_loop.tick().await;
        assert!(matches!(switched, TickOutcome::Processed { ref dispatch, .. } if !dispatch.is_skipped()));

        assert_eq!(*h.opener.devices.lock(), vec!["0".to_string(), "3".to_string()]);
        assert_eq!(h.camera_loop.control().device(), "3");
        assert_eq!(h.store.history(CameraId(1), 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overrunning_inference_is_not_stacked() {
        let detector = Arc::new(HangOnceDetector {
            calls: AtomicUsize::new(0),
            hang: Duration::from_millis(300),
        });
        let capture = CaptureConfig {
            detect_timeout_ms: 50,
            ..CaptureConfig::default()
        };
        let mut h = harness_with(vec![Some(red_square_frame()); 10], detector.clone(), 0, capture);

        // first inference times out and keeps running
        h.camera_loop.tick().await;
        // the next ticks skip inference instead of queueing more blocking work
        for _ in 0..3 {
            let outcome = h.camera_loop.tick().await;
            assert!(matches!(outcome, TickOutcome::Processed { detections: 0, .. }));
        }
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
        let snap = h.camera_loop.control().telemetry().snapshot(CameraId(1));
        assert_eq!(snap.detector_failures, 4);
        assert_eq!(snap.frames_processed, 4);

        // once it finishes, inference resumes
        tokio::time::sleep(Duration::from_millis(400)).await;
        h.camera_loop.tick().await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.camera_loop.control().telemetry().snapshot(CameraId(1)).detector_failures, 4);
    }

    #[tokio::test]
    async fn test_slow_open_is_reused_not_repeated() {
        let capture = CaptureConfig {
            read_timeout_ms: 50,
            ..CaptureConfig::default()
        };
        let mut h = harness_with(
            vec![Some(red_square_frame()); 4],
            Arc::new(ColorBlobDetector::default()),
            0,
            capture,
        );
        *h.opener.first_open_delay.lock() = Some(Duration::from_millis(150));

        assert_eq!(h.camera_loop.tick().await, TickOutcome::NoFrame);
        tokio::time::sleep(Duration::from_millis(250)).await;

        let outcome = h.camera_loop.tick().await;
        assert!(matches!(outcome, TickOutcome::Processed { detections: 1, .. }));
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 1);
        assert_eq!(h.opener.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_open_abandoned_on_switch_is_closed() {
        let capture = CaptureConfig {
            read_timeout_ms: 50,
            ..CaptureConfig::default()
        };
        let mut h = harness_with(
            vec![Some(red_square_frame()); 4],
            Arc::new(ColorBlobDetector::default()),
            0,
            capture,
        );
        *h.opener.first_open_delay.lock() = Some(Duration::from_millis(150));

        assert_eq!(h.camera_loop.tick().await, TickOutcome::NoFrame);
        h.camera_loop.control().request_device("3");
        let switched = h.camera_loop.tick().await;
        assert!(matches!(switched, TickOutcome::Processed { .. }));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(h.opener.opens.load(Ordering::SeqCst), 2);
        // the late handle for device "0" was released
        assert_eq!(h.opener.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let frames = vec![Some(red_square_frame()); 1000];
        let h = harness(frames, Arc::new(ColorBlobDetector::default()), 0);
        let control = h.camera_loop.control().clone();
        let (tx, rx) = watch::channel(false);
        let handle = h.camera_loop.spawn(rx);

        let frame = tokio::task::spawn_blocking(move || control.slot().wait_for_frame(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(frame.is_some());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should stop")
            .unwrap();
        assert!(h.opener.closed.load(Ordering::SeqCst) >= 1);
    }
}
