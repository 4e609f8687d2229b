//! Bounded hand-off between camera loops and the rotation worker
//!
//! `enqueue` never blocks a producer: past capacity the oldest pending request
//! is dropped. The single consumer coalesces whatever is pending into the
//! newest request and acts on that alone.

use pantrack_core::{Error, MoveRequest};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Draining,
    Moving,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Draining => 1,
            WorkerState::Moving => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Draining,
            2 => WorkerState::Moving,
            _ => WorkerState::Idle,
        }
    }
}

/// Newest pending request plus how many older ones were discarded with it
#[derive(Debug, Clone, PartialEq)]
pub struct Coalesced {
    pub request: MoveRequest,
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub dropped: u64,
    pub coalesced: u64,
    pub commands_issued: u64,
    pub transport_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    coalesced: AtomicU64,
    issued: AtomicU64,
    failed: AtomicU64,
}

pub struct ActuationQueue {
    pending: Mutex<VecDeque<MoveRequest>>,
    capacity: usize,
    notify: Notify,
    state: AtomicU8,
    counters: Counters,
}

impl ActuationQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            notify: Notify::new(),
            state: AtomicU8::new(WorkerState::Idle.as_u8()),
            counters: Counters::default(),
        }
    }

    /// Add a request without blocking. Returns the request dropped to make room, if any.
    pub fn enqueue(&self, request: MoveRequest) -> Option<MoveRequest> {
        let camera_id = request.camera_id;
        let dropped = {
            let mut pending = self.pending.lock();
            let dropped = if pending.len() >= self.capacity {
                pending.pop_front()
            } else {
                None
            };
            pending.push_back(request);
            dropped
        };

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        if dropped.is_some() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("{} (camera {} enqueue)", Error::QueueOverflow { dropped: 1 }, camera_id);
        } else {
            debug!("Queued move request from camera {}", camera_id);
        }

        self.notify.notify_one();
        dropped
    }

    /// Take the newest pending request and discard everything older
    pub fn drain_latest(&self) -> Option<Coalesced> {
        let mut pending = self.pending.lock();
        let request = pending.pop_back()?;
        let discarded = pending.len();
        pending.clear();
        drop(pending);

        if discarded > 0 {
            self.counters
                .coalesced
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        Some(Coalesced { request, discarded })
    }

    /// Resolves once a request has been enqueued since the last wake-up
    pub async fn wait_for_request(&self) {
        self.notify.notified().await
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn record_issued(&self) {
        self.counters.issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.len(),
            capacity: self.capacity,
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            commands_issued: self.counters.issued.load(Ordering::Relaxed),
            transport_failures: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
