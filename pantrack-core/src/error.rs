use crate::types::CameraId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("Inference failure: {0}")]
    InferenceFailure(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Camera not found: {0}")]
    NotFound(CameraId),

    #[error("Queue overflow: dropped {dropped} pending request(s)")]
    QueueOverflow { dropped: usize },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// I/O-class failures are absorbed by the loop that hit them; only query
    /// and configuration failures reach a caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::NotFound(_) | Error::Configuration(_))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound(CameraId(3));
        assert_eq!(err.to_string(), "Camera not found: 3");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::ReadFailed("eof".to_string()).is_recoverable());
        assert!(Error::TransportFailure("port closed".to_string()).is_recoverable());
        assert!(Error::QueueOverflow { dropped: 1 }.is_recoverable());
        assert!(!Error::NotFound(CameraId(1)).is_recoverable());
        assert!(!Error::Configuration("bad".to_string()).is_recoverable());
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
