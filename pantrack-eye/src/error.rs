//! Error types for pantrack-eye

use pantrack_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Frame read error: {0}")]
    Read(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Camera(msg) => CoreError::DeviceUnavailable(msg),
            VisionError::Read(msg) => CoreError::ReadFailed(msg),
            VisionError::Detector(msg) => CoreError::InferenceFailure(msg),
            VisionError::Timeout(msg) => CoreError::Timeout(msg),
            VisionError::Io(e) => CoreError::Io(e),
            VisionError::Image(e) => CoreError::ReadFailed(format!("Image error: {}", e)),
        }
    }
}
