//! pantrack-motor: drives the shared pan actuator.
//!
//! Provides:
//! - `ActuationQueue`: non-blocking, bounded hand-off of move requests
//! - `RotationWorker`: the single consumer that coalesces pending requests
//!   and issues one two-waypoint command at a time
//! - `Actuator` seam with a serial implementation and a logging one

pub mod error;
pub mod command;
pub mod actuator;
pub mod serial;
pub mod queue;
pub mod worker;

pub use error::MotorError;
pub use command::{ActuatorCommand, CommandMapper, Waypoint};
pub use actuator::{Actuator, LoggingActuator};
pub use serial::SerialActuator;
pub use queue::{ActuationQueue, Coalesced, QueueStats, WorkerState};
pub use worker::{CommandOutcome, RotationWorker};
