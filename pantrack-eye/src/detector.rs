//! Detector capability and a colour-blob reference detector

use crate::error::VisionError;
use crate::frame::Frame;
use pantrack_core::{BoundingBox, ClassId, Detection};

/// Frame in, ordered detections out. Must not mutate the frame.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;
}

/// Finds pixels close to a reference colour and reports their bounding box
/// as a single detection. Confidence is the matching share of that box.
#[derive(Debug, Clone)]
pub struct ColorBlobDetector {
    reference: [u8; 3],
    tolerance: u8,
    min_pixels: u32,
    class_id: ClassId,
}

impl ColorBlobDetector {
    pub fn new(reference: [u8; 3], tolerance: u8) -> Self {
        Self {
            reference,
            tolerance,
            min_pixels: 16,
            class_id: ClassId(0),
        }
    }

    pub fn with_min_pixels(mut self, min_pixels: u32) -> Self {
        self.min_pixels = min_pixels.max(1);
        self
    }

    pub fn with_class(mut self, class_id: ClassId) -> Self {
        self.class_id = class_id;
        self
    }

    fn matches(&self, pixel: &[u8; 3]) -> bool {
        pixel
            .iter()
            .zip(self.reference.iter())
            .all(|(p, r)| p.abs_diff(*r) <= self.tolerance)
    }
}

impl Default for ColorBlobDetector {
    fn default() -> Self {
        Self::new([255, 0, 0], 60)
    }
}

impl Detector for ColorBlobDetector {
    fn name(&self) -> &str {
        "color-blob"
    }

    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let mut count: u32 = 0;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (x, y, pixel) in frame.image.enumerate_pixels() {
            if self.matches(&pixel.0) {
                count += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if count < self.min_pixels {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as i32,
            min_y as i32,
            max_x as i32 + 1,
            max_y as i32 + 1,
        );
        let confidence = (count as f64 / bbox.area().max(1) as f64).min(1.0) as f32;
        Ok(vec![Detection::from_bbox(bbox, self.class_id, confidence)])
    }
}
