//! Per-camera ring buffer

use pantrack_core::{CameraId, CoordinateRecord};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Min/max/mean of one axis over the retained window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisStats {
    pub min: i32,
    pub max: i32,
    /// Rounded to two decimals
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraStats {
    pub camera_id: CameraId,
    pub count: usize,
    pub has_target_count: usize,
    pub no_target_count: usize,
    pub x: Option<AxisStats>,
    pub y: Option<AxisStats>,
}

/// Records for one camera in arrival order, bounded at `capacity`
#[derive(Debug, Clone)]
pub struct CameraHistory {
    camera_id: CameraId,
    records: VecDeque<CoordinateRecord>,
    capacity: usize,
}

impl CameraHistory {
    pub fn new(camera_id: CameraId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            camera_id,
            // Don't reserve the whole window up front; most cameras never fill it
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append, evicting the oldest record once full. Returns the evicted record.
    pub fn push(&mut self, record: CoordinateRecord) -> Option<CoordinateRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn latest(&self) -> Option<&CoordinateRecord> {
        self.records.back()
    }

    /// Last `limit` records, oldest first
    pub fn tail(&self, limit: usize) -> Vec<CoordinateRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CameraStats {
        let count = self.records.len();
        let has_target_count = self.records.iter().filter(|r| r.has_target).count();

        CameraStats {
            camera_id: self.camera_id,
            count,
            has_target_count,
            no_target_count: count - has_target_count,
            x: axis_stats(self.records.iter().map(|r| r.x)),
            y: axis_stats(self.records.iter().map(|r| r.y)),
        }
    }
}

fn axis_stats(values: impl Iterator<Item = i32>) -> Option<AxisStats> {
    let mut min = i32::MAX;
    let mut max = i32::MIN;
    let mut sum: i64 = 0;
    let mut n: i64 = 0;

    for v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v as i64;
        n += 1;
    }

    if n == 0 {
        return None;
    }

    let avg = (sum as f64 / n as f64 * 100.0).round() / 100.0;
    Some(AxisStats { min, max, avg })
}
