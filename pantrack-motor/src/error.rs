//! Error types for pantrack-motor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotorError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid command: {0}")]
    Command(String),
}

impl From<MotorError> for pantrack_core::Error {
    fn from(err: MotorError) -> Self {
        match err {
            MotorError::Command(msg) => pantrack_core::Error::Configuration(msg),
            other => pantrack_core::Error::TransportFailure(other.to_string()),
        }
    }
}
