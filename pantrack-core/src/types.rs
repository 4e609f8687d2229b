use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical camera slot (1, 2, ...), independent of the device it is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CameraId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Detector class index (COCO numbering for the stock models, 0 = person)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis-aligned box in frame pixel coordinates, corners inclusive-exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Integer centre, truncating like the detector post-processing does
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).unsigned_abs()
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).unsigned_abs()
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }
}

/// A single detector output for one observed instance in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Centre of `bbox`
    pub x: i32,
    pub y: i32,
    pub class_id: ClassId,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn from_bbox(bbox: BoundingBox, class_id: ClassId, confidence: f32) -> Self {
        let (x, y) = bbox.center();
        Self {
            x,
            y,
            class_id,
            confidence,
            bbox,
        }
    }
}

/// One dispatched observation for a camera, target present or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRecord {
    pub camera_id: CameraId,
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
    pub has_target: bool,
    pub timestamp: DateTime<Utc>,
}

impl CoordinateRecord {
    /// Record for a qualifying target detection
    pub fn target(camera_id: CameraId, detection: &Detection, timestamp: DateTime<Utc>) -> Self {
        Self {
            camera_id,
            x: detection.x,
            y: detection.y,
            confidence: detection.confidence,
            has_target: true,
            timestamp,
        }
    }

    /// Explicit absence: the frame centre with zero confidence
    pub fn absent(camera_id: CameraId, center: (i32, i32), timestamp: DateTime<Utc>) -> Self {
        Self {
            camera_id,
            x: center.0,
            y: center.1,
            confidence: 0.0,
            has_target: false,
            timestamp,
        }
    }
}

/// Candidate pan target handed to the actuation queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub camera_id: CameraId,
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl From<&CoordinateRecord> for MoveRequest {
    fn from(record: &CoordinateRecord) -> Self {
        Self {
            camera_id: record.camera_id,
            x: record.x,
            y: record.y,
            confidence: record.confidence,
            timestamp: record.timestamp,
        }
    }
}
