//! pantrack-eye: the camera side of the pan-tracking pipeline
//!
//! Provides:
//! - Frame source and detector capabilities, with directory and colour-blob
//!   reference implementations
//! - Per-camera capture loops that classify, annotate and publish frames
//! - The dispatch throttle feeding the coordinate store and actuation queue
//! - `Pipeline`, the context object that owns and wires all of the above

pub mod error;
pub mod frame;
pub mod source;
pub mod detector;
pub mod classify;
pub mod annotate;
pub mod slot;
pub mod throttle;
pub mod telemetry;
pub mod camera_loop;
pub mod pipeline;

pub use error::VisionError;
pub use frame::Frame;
pub use source::{probe_devices, DeviceInfo, DirectoryOpener, DirectorySource, FrameSource, SourceOpener, DEFAULT_PROBE_LIMIT};
pub use detector::{ColorBlobDetector, Detector};
pub use classify::{ClassTable, ClassifiedDetection};
pub use annotate::annotate;
pub use slot::{encode_jpeg, mjpeg_part, LatestFrameSlot, DEFAULT_JPEG_QUALITY, MJPEG_CONTENT_TYPE};
pub use throttle::{DispatchOutcome, DispatchThrottle, Tick};
pub use telemetry::{CameraTelemetry, CameraTelemetrySnapshot, PipelineTelemetry};
pub use camera_loop::{CameraControl, CameraLoop, TickOutcome};
pub use pipeline::Pipeline;
