//! Actuator seam: anything that can carry out a two-waypoint command

use crate::command::ActuatorCommand;
use crate::error::MotorError;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Deliver both waypoints in order. Returns once the transport has accepted them.
    async fn execute(&self, command: &ActuatorCommand) -> Result<(), MotorError>;
}

/// Dry-run actuator: logs each command and keeps a copy
#[derive(Debug, Default)]
pub struct LoggingActuator {
    history: Mutex<Vec<ActuatorCommand>>,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl Actuator for LoggingActuator {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn execute(&self, command: &ActuatorCommand) -> Result<(), MotorError> {
        info!("Dry-run actuator: {}", command);
        self.history.lock().push(command.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Waypoint;

    #[tokio::test]
    async fn test_logging_actuator_records_commands() {
        let actuator = LoggingActuator::new();
        let cmd = ActuatorCommand::new(Waypoint::new(7, 10, 100), Waypoint::new(7, -10, 100));
        actuator.execute(&cmd).await.unwrap();
        actuator.execute(&cmd).await.unwrap();
        assert_eq!(actuator.commands().len(), 2);
        assert_eq!(actuator.name(), "dry-run");
    }
}
