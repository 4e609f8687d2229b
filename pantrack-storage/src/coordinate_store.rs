//! Coordinate store: one bounded history per camera
//!
//! Each camera's history sits behind its own mutex. The index that maps a
//! camera id to its history is a `DashMap`, and every operation clones the
//! history handle out of the index before locking it, so no call ever holds
//! the index shard and a history lock at the same time.

use crate::history::{CameraHistory, CameraStats};
use dashmap::DashMap;
use pantrack_core::{CameraId, CoordinateRecord, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Records returned by `history` when the caller gives no limit
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSummary {
    pub camera_id: CameraId,
    pub total_records: usize,
    pub latest: Option<CoordinateRecord>,
}

pub struct CoordinateStore {
    histories: DashMap<CameraId, Arc<Mutex<CameraHistory>>>,
    max_records: usize,
}

impl CoordinateStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            histories: DashMap::new(),
            max_records: max_records.max(1),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    fn history_handle(&self, camera_id: CameraId) -> Option<Arc<Mutex<CameraHistory>>> {
        self.histories.get(&camera_id).map(|entry| entry.value().clone())
    }

    fn history_handle_or_create(&self, camera_id: CameraId) -> Arc<Mutex<CameraHistory>> {
        if let Some(handle) = self.history_handle(camera_id) {
            return handle;
        }
        let max_records = self.max_records;
        self.histories
            .entry(camera_id)
            .or_insert_with(|| {
                debug!("Creating coordinate history for camera {}", camera_id);
                Arc::new(Mutex::new(CameraHistory::new(camera_id, max_records)))
            })
            .value()
            .clone()
    }

    /// Append a record to its camera's history, evicting the oldest if full
    pub fn append(&self, record: CoordinateRecord) {
        let handle = self.history_handle_or_create(record.camera_id);
        let camera_id = record.camera_id;
        let evicted = handle.lock().push(record);
        if evicted.is_some() {
            debug!("Camera {} history full, evicted oldest record", camera_id);
        }
    }

    pub fn latest(&self, camera_id: CameraId) -> Option<CoordinateRecord> {
        let handle = self.history_handle(camera_id)?;
        let latest = handle.lock().latest().cloned();
        latest
    }

    /// Last `limit` records in chronological order
    pub fn history(&self, camera_id: CameraId, limit: usize) -> Result<Vec<CoordinateRecord>> {
        let handle = self
            .history_handle(camera_id)
            .ok_or(Error::NotFound(camera_id))?;
        let records = handle.lock().tail(limit);
        Ok(records)
    }

    /// Empty a camera's history; the camera stays known
    pub fn clear(&self, camera_id: CameraId) -> Result<()> {
        let handle = self
            .history_handle(camera_id)
            .ok_or(Error::NotFound(camera_id))?;
        handle.lock().clear();
        info!("Cleared coordinate history for camera {}", camera_id);
        Ok(())
    }

    pub fn stats(&self, camera_id: CameraId) -> Result<CameraStats> {
        let handle = self
            .history_handle(camera_id)
            .ok_or(Error::NotFound(camera_id))?;
        let stats = handle.lock().stats();
        Ok(stats)
    }

    /// Known camera ids, ascending
    pub fn camera_ids(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self.histories.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    fn handles(&self) -> Vec<(CameraId, Arc<Mutex<CameraHistory>>)> {
        let mut handles: Vec<_> = self
            .histories
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles
    }

    /// Latest record of every camera that has one
    pub fn latest_all(&self) -> BTreeMap<CameraId, CoordinateRecord> {
        self.handles()
            .into_iter()
            .filter_map(|(id, handle)| {
                let latest = handle.lock().latest().cloned();
                latest.map(|record| (id, record))
            })
            .collect()
    }

    pub fn summary_all(&self) -> Vec<CameraSummary> {
        self.handles()
            .into_iter()
            .map(|(camera_id, handle)| {
                let history = handle.lock();
                CameraSummary {
                    camera_id,
                    total_records: history.len(),
                    latest: history.latest().cloned(),
                }
            })
            .collect()
    }

    /// Stats for every camera with at least one retained record
    pub fn stats_all(&self) -> Vec<CameraStats> {
        self.handles()
            .into_iter()
            .filter_map(|(_, handle)| {
                let history = handle.lock();
                if history.is_empty() {
                    None
                } else {
                    Some(history.stats())
                }
            })
            .collect()
    }
}

impl Default for CoordinateStore {
    fn default() -> Self {
        Self::new(1000)
    }
}
