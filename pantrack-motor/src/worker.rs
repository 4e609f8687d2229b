//! The single consumer of the actuation queue

use crate::actuator::Actuator;
use crate::command::{ActuatorCommand, CommandMapper};
use crate::queue::{ActuationQueue, WorkerState};
use pantrack_core::MoveRequest;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Issued {
        request: MoveRequest,
        command: ActuatorCommand,
        discarded: usize,
    },
    /// Transport rejected the command. Not retried; the next request supersedes it.
    Failed {
        request: MoveRequest,
        command: ActuatorCommand,
        error: String,
    },
}

impl CommandOutcome {
    pub fn command(&self) -> &ActuatorCommand {
        match self {
            CommandOutcome::Issued { command, .. } | CommandOutcome::Failed { command, .. } => command,
        }
    }

    pub fn is_issued(&self) -> bool {
        matches!(self, CommandOutcome::Issued { .. })
    }
}

pub struct RotationWorker {
    queue: Arc<ActuationQueue>,
    actuator: Arc<dyn Actuator>,
    mapper: CommandMapper,
}

impl RotationWorker {
    pub fn new(queue: Arc<ActuationQueue>, actuator: Arc<dyn Actuator>, mapper: CommandMapper) -> Self {
        Self {
            queue,
            actuator,
            mapper,
        }
    }

    /// Coalesce whatever is pending and issue one command for the newest request
    pub async fn process_pending(&self) -> Option<CommandOutcome> {
        self.queue.set_state(WorkerState::Draining);
        let Some(coalesced) = self.queue.drain_latest() else {
            self.queue.set_state(WorkerState::Idle);
            return None;
        };
        if coalesced.discarded > 0 {
            debug!("Coalesced {} stale move request(s)", coalesced.discarded);
        }

        let request = coalesced.request;
        let command = self.mapper.command_for(&request);

        self.queue.set_state(WorkerState::Moving);
        let result = self.actuator.execute(&command).await;
        self.queue.set_state(WorkerState::Idle);

        match result {
            Ok(()) => {
                self.queue.record_issued();
                info!(
                    "Camera {} target at ({}, {}) -> {} via {}",
                    request.camera_id, request.x, request.y, command, self.actuator.name()
                );
                Some(CommandOutcome::Issued {
                    request,
                    command,
                    discarded: coalesced.discarded,
                })
            }
            Err(e) => {
                self.queue.record_failure();
                error!("Actuator {} failed on {}: {}", self.actuator.name(), command, e);
                Some(CommandOutcome::Failed {
                    request,
                    command,
                    error: e.to_string(),
                })
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Rotation worker started ({})", self.actuator.name());
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.queue.wait_for_request() => {
                    self.process_pending().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Last look so a request queued just before shutdown is not lost
        if self.process_pending().await.is_some() {
            debug!("Rotation worker flushed a final request on shutdown");
        }
        info!("Rotation worker stopped");
    }
}
