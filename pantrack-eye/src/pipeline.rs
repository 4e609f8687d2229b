//! Pipeline context: owns every shared piece and hands each loop what it needs

use crate::camera_loop::{CameraControl, CameraLoop};
use crate::classify::ClassTable;
use crate::detector::Detector;
use crate::frame::Frame;
use crate::slot::encode_jpeg;
use crate::source::SourceOpener;
use crate::telemetry::PipelineTelemetry;
use crate::throttle::DispatchThrottle;
use pantrack_core::{CameraId, CoordinateRecord, Error, PipelineConfig, Result};
use pantrack_motor::{ActuationQueue, Actuator, CommandMapper, QueueStats, RotationWorker};
use pantrack_storage::{CameraStats, CameraSummary, CoordinateStore, DEFAULT_HISTORY_LIMIT};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<CoordinateStore>,
    queue: Arc<ActuationQueue>,
    throttle: Arc<DispatchThrottle>,
    classes: Arc<ClassTable>,
    cameras: BTreeMap<CameraId, Arc<CameraControl>>,
    opener: Arc<dyn SourceOpener>,
    detector: Arc<dyn Detector>,
    actuator: Arc<dyn Actuator>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        opener: Arc<dyn SourceOpener>,
        detector: Arc<dyn Detector>,
        actuator: Arc<dyn Actuator>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CoordinateStore::new(config.storage.max_records));
        let queue = Arc::new(ActuationQueue::new(config.actuation.queue_capacity));
        let throttle = Arc::new(DispatchThrottle::new(&config.dispatch, store.clone(), queue.clone()));
        let classes = Arc::new(ClassTable::from(&config.detection));
        let cameras = config
            .cameras
            .iter()
            .map(|camera| (camera.camera_id, Arc::new(CameraControl::new(camera))))
            .collect();
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            queue,
            throttle,
            classes,
            cameras,
            opener,
            detector,
            actuator,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CoordinateStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<ActuationQueue> {
        &self.queue
    }

    pub fn throttle(&self) -> &Arc<DispatchThrottle> {
        &self.throttle
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.cameras.keys().copied().collect()
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Spawn one loop per configured camera plus the rotation worker.
    /// Must be called from inside a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Pipeline already running");
            return;
        }
        self.shutdown.send_replace(false);

        let worker = RotationWorker::new(
            self.queue.clone(),
            self.actuator.clone(),
            CommandMapper::from(&self.config.actuation.command),
        );
        tasks.push(worker.spawn(self.shutdown.subscribe()));

        for camera in &self.config.cameras {
            let Some(control) = self.cameras.get(&camera.camera_id) else {
                continue;
            };
            let mut camera = camera.clone();
            camera.device = control.device();
            let camera_loop = CameraLoop::new(
                camera,
                self.config.capture.clone(),
                self.opener.clone(),
                self.detector.clone(),
                self.classes.clone(),
                self.throttle.clone(),
                control.clone(),
            );
            tasks.push(camera_loop.spawn(self.shutdown.subscribe()));
        }

        info!(
            "Pipeline started: {} camera(s), actuator {}",
            self.cameras.len(),
            self.actuator.name()
        );
    }

    /// Signal every loop and the worker to stop, then wait for them
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Pipeline task ended abnormally: {}", e),
                Err(_) => warn!("Pipeline task did not stop within {:?}", TASK_STOP_TIMEOUT),
            }
        }
        info!("Pipeline stopped");
    }

    fn control(&self, camera_id: CameraId) -> Result<&Arc<CameraControl>> {
        self.cameras.get(&camera_id).ok_or(Error::NotFound(camera_id))
    }

    pub fn latest_frame(&self, camera_id: CameraId) -> Result<Option<Arc<Frame>>> {
        Ok(self.control(camera_id)?.slot().consume())
    }

    /// JPEG of the camera's latest annotated frame; `None` until one exists
    pub fn latest_jpeg(&self, camera_id: CameraId, quality: u8) -> Result<Option<Vec<u8>>> {
        match self.latest_frame(camera_id)? {
            Some(frame) => Ok(Some(encode_jpeg(&frame, quality)?)),
            None => Ok(None),
        }
    }

    /// Blocks up to `timeout` for the camera's first frame
    pub fn wait_for_frame(&self, camera_id: CameraId, timeout: Duration) -> Result<Option<Arc<Frame>>> {
        Ok(self.control(camera_id)?.slot().wait_for_frame(timeout))
    }

    pub fn latest(&self, camera_id: CameraId) -> Result<Option<CoordinateRecord>> {
        self.control(camera_id)?;
        Ok(self.store.latest(camera_id))
    }

    pub fn history(&self, camera_id: CameraId, limit: Option<usize>) -> Result<Vec<CoordinateRecord>> {
        self.store
            .history(camera_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    pub fn stats(&self, camera_id: CameraId) -> Result<CameraStats> {
        self.store.stats(camera_id)
    }

    pub fn clear(&self, camera_id: CameraId) -> Result<()> {
        self.store.clear(camera_id)
    }

    pub fn latest_all(&self) -> BTreeMap<CameraId, CoordinateRecord> {
        self.store.latest_all()
    }

    pub fn summary_all(&self) -> Vec<CameraSummary> {
        self.store.summary_all()
    }

    /// Device the camera's loop is bound to right now
    pub fn device(&self, camera_id: CameraId) -> Result<String> {
        Ok(self.control(camera_id)?.device())
    }

    /// Rebind a camera to another device; takes effect on the loop's next tick
    pub fn select_camera(&self, camera_id: CameraId, device: impl Into<String>) -> Result<()> {
        let device = device.into();
        if device.trim().is_empty() {
            return Err(Error::Configuration("device must not be empty".to_string()));
        }
        let control = self.control(camera_id)?;
        info!("Camera {} will switch to device {}", camera_id, device);
        control.request_device(device);
        Ok(())
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn telemetry(&self) -> PipelineTelemetry {
        PipelineTelemetry {
            cameras: self
                .cameras
                .iter()
                .map(|(id, control)| control.telemetry().snapshot(*id))
                .collect(),
            actuation: self.queue.stats(),
            worker_state: self.queue.state(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
