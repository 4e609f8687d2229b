//! pantrack-core: data model, error taxonomy and configuration shared by
//! every pantrack crate.

pub mod types;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use types::{
    BoundingBox, CameraId, ClassId, CoordinateRecord, Detection, MoveRequest,
};
pub use config::{
    ActuationConfig, CameraConfig, CaptureConfig, ClassRole, ClassRule, CommandConfig,
    ConfigError, DetectionConfig, DispatchConfig, LoggingConfig, PipelineConfig,
    SecondWaypoint, SerialConfig, StorageConfig,
};
