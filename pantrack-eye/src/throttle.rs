//! Per-camera dispatch throttle
//!
//! Turns each tick's target (or its absence) into at most one coordinate
//! record per `min_interval`, and decides whether that record is worth a move
//! request. The per-camera bookkeeping lock is released before the store or
//! the queue is touched.

use chrono::{DateTime, Utc};
use pantrack_core::{CameraId, CoordinateRecord, Detection, DispatchConfig, MoveRequest};
use pantrack_motor::ActuationQueue;
use pantrack_storage::CoordinateStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A point in time on both clocks: `instant` gates the interval, `wall`
/// stamps the record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

impl Tick {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    pub fn after(&self, elapsed: Duration) -> Self {
        let wall_elapsed = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            instant: self.instant + elapsed,
            wall: self.wall + wall_elapsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Inside the interval; nothing stored, nothing queued
    Skipped,
    Dispatched {
        record: CoordinateRecord,
        enqueued: bool,
    },
}

impl DispatchOutcome {
    pub fn record(&self) -> Option<&CoordinateRecord> {
        match self {
            DispatchOutcome::Dispatched { record, .. } => Some(record),
            DispatchOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, DispatchOutcome::Skipped)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CameraDispatchState {
    last_dispatch: Option<Instant>,
    /// Stamp of the last stored record; survives `reset`
    last_wall: Option<DateTime<Utc>>,
    last_enqueued: Option<(i32, i32)>,
}

pub struct DispatchThrottle {
    min_interval: Duration,
    min_interval_wall: chrono::Duration,
    deadband: i64,
    states: Mutex<HashMap<CameraId, CameraDispatchState>>,
    store: Arc<CoordinateStore>,
    queue: Arc<ActuationQueue>,
}

impl DispatchThrottle {
    pub fn new(config: &DispatchConfig, store: Arc<CoordinateStore>, queue: Arc<ActuationQueue>) -> Self {
        Self {
            min_interval: config.min_interval(),
            min_interval_wall: chrono::Duration::from_std(config.min_interval())
                .unwrap_or_else(|_| chrono::Duration::zero()),
            deadband: config.deadband_px as i64,
            states: Mutex::new(HashMap::new()),
            store,
            queue,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn maybe_dispatch(
        &self,
        camera_id: CameraId,
        target: Option<&Detection>,
        center: (i32, i32),
    ) -> DispatchOutcome {
        self.maybe_dispatch_at(camera_id, target, center, Tick::now())
    }

    pub fn maybe_dispatch_at(
        &self,
        camera_id: CameraId,
        target: Option<&Detection>,
        center: (i32, i32),
        tick: Tick,
    ) -> DispatchOutcome {
        let (record, enqueue) = {
            let mut states = self.states.lock();
            let state = states.entry(camera_id).or_default();

            if let Some(last) = state.last_dispatch {
                if tick.instant.saturating_duration_since(last) < self.min_interval {
                    return DispatchOutcome::Skipped;
                }
            }
            let timestamp = self.stamp(state, tick.wall);
            state.last_dispatch = Some(tick.instant);
            state.last_wall = Some(timestamp);

            let record = match target {
                Some(detection) => CoordinateRecord::target(camera_id, detection, timestamp),
                None => CoordinateRecord::absent(camera_id, center, timestamp),
            };
            let enqueue = record.has_target && self.outside_deadband(state.last_enqueued, (record.x, record.y));
            if enqueue {
                state.last_enqueued = Some((record.x, record.y));
            }
            (record, enqueue)
        };

        self.store.append(record.clone());
        if enqueue {
            self.queue.enqueue(MoveRequest::from(&record));
        } else if record.has_target {
            debug!(
                "Camera {} target ({}, {}) within deadband, not queued",
                camera_id, record.x, record.y
            );
        }

        DispatchOutcome::Dispatched {
            record,
            enqueued: enqueue,
        }
    }

    /// Wall stamp for the next record: never earlier than the previous one,
    /// and at least `min_interval` after it while the interval is in force.
    /// Keeps stored timestamps ordered and spaced when the wall clock steps back.
    fn stamp(&self, state: &CameraDispatchState, wall: DateTime<Utc>) -> DateTime<Utc> {
        let floor = match (state.last_wall, state.last_dispatch) {
            (Some(last), Some(_)) => last + self.min_interval_wall,
            (Some(last), None) => last,
            (None, _) => return wall,
        };
        if wall < floor {
            debug!("Wall clock behind last dispatch by {}, clamping stamp", floor - wall);
            floor
        } else {
            wall
        }
    }

    /// Moves only when either axis left the deadband around the last queued position.
    /// A y-only move past the band re-enqueues too; suppression needs both axes inside it.
    fn outside_deadband(&self, last: Option<(i32, i32)>, candidate: (i32, i32)) -> bool {
        match last {
            None => true,
            Some((x, y)) => {
                let dx = (candidate.0 as i64 - x as i64).abs();
                let dy = (candidate.1 as i64 - y as i64).abs();
                dx > self.deadband || dy > self.deadband
            }
        }
    }

    /// Forget a camera's timing and deadband state; its next dispatch is never throttled
    pub fn reset(&self, camera_id: CameraId) {
        if let Some(state) = self.states.lock().get_mut(&camera_id) {
            *state = CameraDispatchState {
                last_wall: state.last_wall,
                ..CameraDispatchState::default()
            };
        }
    }
}
