// Test doubles shared by the scenario, property and concurrency suites
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use pantrack_core::{
    BoundingBox, CameraConfig, CameraId, ClassId, CoordinateRecord, Detection, MoveRequest,
};
use pantrack_eye::{Detector, Frame, FrameSource, SourceOpener, VisionError};
use pantrack_motor::{Actuator, ActuatorCommand, MotorError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

pub fn blank_frame() -> Frame {
    Frame::filled(WIDTH, HEIGHT, [0, 0, 0])
}

pub fn detection(x: i32, y: i32, class: u32, confidence: f32) -> Detection {
    Detection::from_bbox(BoundingBox::new(x - 4, y - 4, x + 4, y + 4), ClassId(class), confidence)
}

pub fn record(camera: u32, x: i32, has_target: bool) -> CoordinateRecord {
    CoordinateRecord {
        camera_id: CameraId(camera),
        x,
        y: 240,
        confidence: if has_target { 0.9 } else { 0.0 },
        has_target,
        timestamp: Utc::now(),
    }
}

pub fn request(camera: u32, x: i32) -> MoveRequest {
    MoveRequest {
        camera_id: CameraId(camera),
        x,
        y: 240,
        confidence: 0.9,
        timestamp: Utc::now(),
    }
}

/// Endless solid frames (black unless tinted); reads on a "stuck" device block for `stall`
pub struct ScriptedSource {
    device: String,
    stall: Option<Duration>,
    tint: Option<[u8; 3]>,
}

impl FrameSource for ScriptedSource {
    fn device(&self) -> &str {
        &self.device
    }

    fn read(&mut self) -> Result<Frame, VisionError> {
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
            return Err(VisionError::Read("stalled".to_string()));
        }
        std::thread::sleep(Duration::from_millis(1));
        Ok(match self.tint {
            Some(color) => Frame::filled(WIDTH, HEIGHT, color),
            None => blank_frame(),
        })
    }
}

/// Opens every device except those marked missing; records what was opened
#[derive(Default)]
pub struct ScriptedOpener {
    opened: Mutex<Vec<String>>,
    missing: Mutex<Vec<String>>,
    stalled: Mutex<HashMap<String, Duration>>,
    tinted: Mutex<HashMap<String, [u8; 3]>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing(self, device: &str) -> Self {
        self.missing.lock().push(device.to_string());
        self
    }

    pub fn with_stalled(self, device: &str, stall: Duration) -> Self {
        self.stalled.lock().insert(device.to_string(), stall);
        self
    }

    /// Frames from `device` are filled with `color`
    pub fn with_tint(self, device: &str, color: [u8; 3]) -> Self {
        self.tinted.lock().insert(device.to_string(), color);
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameSource>, VisionError> {
        if self.missing.lock().contains(&camera.device) {
            return Err(VisionError::Camera(format!("no device {}", camera.device)));
        }
        self.opened.lock().push(camera.device.clone());
        let stall = self.stalled.lock().get(&camera.device).copied();
        let tint = self.tinted.lock().get(&camera.device).copied();
        Ok(Box::new(ScriptedSource {
            device: camera.device.clone(),
            stall,
            tint,
        }))
    }
}

/// Returns the same detections for every frame
pub struct FixedDetector {
    detections: Mutex<Vec<Detection>>,
    calls: AtomicUsize,
}

impl FixedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections: Mutex::new(detections),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, detections: Vec<Detection>) {
        *self.detections.lock() = detections;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for FixedDetector {
    fn name(&self) -> &str {
        "fixed"
    }

    fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.lock().clone())
    }
}

/// Never detects anything; blocks for `hang` on frames of one colour
pub struct HangOnTintDetector {
    tint: [u8; 3],
    hang: Duration,
    hung_calls: AtomicUsize,
}

impl HangOnTintDetector {
    pub fn new(tint: [u8; 3], hang: Duration) -> Self {
        Self {
            tint,
            hang,
            hung_calls: AtomicUsize::new(0),
        }
    }

    pub fn hung_calls(&self) -> usize {
        self.hung_calls.load(Ordering::SeqCst)
    }
}

impl Detector for HangOnTintDetector {
    fn name(&self) -> &str {
        "hang-on-tint"
    }

    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        if frame.image.get_pixel(0, 0).0 == self.tint {
            self.hung_calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.hang);
        }
        Ok(Vec::new())
    }
}

/// Records every command it is asked to run; can be switched to fail
#[derive(Default)]
pub struct RecordingActuator {
    commands: Mutex<Vec<ActuatorCommand>>,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let actuator = Self::default();
        actuator.fail.store(true, Ordering::SeqCst);
        actuator
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, command: &ActuatorCommand) -> Result<(), MotorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.commands.lock().push(command.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(MotorError::Transport("link down".to_string()));
        }
        Ok(())
    }
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
