//! Serial-port actuator
//!
//! The port is opened lazily on the first command and held open afterwards.
//! Any write failure drops the handle so the next command reopens it.

use crate::actuator::Actuator;
use crate::command::{ActuatorCommand, Waypoint};
use crate::error::MotorError;
use async_trait::async_trait;
use pantrack_core::SerialConfig;
use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type PortSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

pub struct SerialActuator {
    config: SerialConfig,
    port: PortSlot,
    name: String,
}

impl SerialActuator {
    pub fn new(config: SerialConfig) -> Self {
        let name = format!("serial:{}", config.port);
        Self {
            config,
            port: Arc::new(Mutex::new(None)),
            name,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.port.lock().is_some()
    }

    /// Blocking send, for callers outside the runtime (CLI sweep)
    pub fn execute_blocking(&self, command: &ActuatorCommand) -> Result<(), MotorError> {
        write_command(&self.port, &self.config, command)
    }

    /// Full-range test sweep: `channel,max,speed` then `channel,min,speed`
    pub fn sweep(&self, first: Waypoint, second: Waypoint) -> Result<(), MotorError> {
        info!("Sweeping {} -> {} on {}", first, second, self.config.port);
        self.execute_blocking(&ActuatorCommand::new(first, second))
    }
}

#[async_trait]
impl Actuator for SerialActuator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &ActuatorCommand) -> Result<(), MotorError> {
        let port = self.port.clone();
        let config = self.config.clone();
        let command = command.clone();
        tokio::task::spawn_blocking(move || write_command(&port, &config, &command))
            .await
            .map_err(|e| MotorError::Transport(format!("serial writer task failed: {}", e)))?
    }
}

fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>, MotorError> {
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(config.timeout_ms))
        .open()?;
    info!("Opened serial port {} at {} baud", config.port, config.baud_rate);
    if config.settle_ms > 0 {
        std::thread::sleep(Duration::from_millis(config.settle_ms));
    }
    Ok(port)
}

fn write_command(
    slot: &Mutex<Option<Box<dyn SerialPort>>>,
    config: &SerialConfig,
    command: &ActuatorCommand,
) -> Result<(), MotorError> {
    let mut guard = slot.lock();
    if guard.is_none() {
        *guard = Some(open_port(config)?);
    }
    let port = guard
        .as_mut()
        .ok_or_else(|| MotorError::Transport("serial port not open".to_string()))?;

    let result = send_frames(&mut **port, config, command);
    if let Err(ref e) = result {
        warn!("Serial write to {} failed, closing port: {}", config.port, e);
        *guard = None;
    }
    result
}

fn send_frames(
    port: &mut dyn SerialPort,
    config: &SerialConfig,
    command: &ActuatorCommand,
) -> Result<(), MotorError> {
    for (i, frame) in command.frames(&config.terminator).iter().enumerate() {
        if i > 0 && config.inter_command_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(config.inter_command_delay_ms));
        }
        port.write_all(frame)?;
        debug!("Wrote {:?} to {}", String::from_utf8_lossy(frame), config.port);
    }
    port.flush()?;
    Ok(())
}
