use pantrack_core::CameraId;
use pantrack_motor::{QueueStats, WorkerState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one camera loop
#[derive(Debug, Default)]
pub struct CameraTelemetry {
    frames_processed: AtomicU64,
    read_failures: AtomicU64,
    detector_failures: AtomicU64,
    dispatches: AtomicU64,
    skipped_dispatches: AtomicU64,
    reopens: AtomicU64,
}

impl CameraTelemetry {
    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detector_failure(&self) {
        self.detector_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, skipped: bool) {
        if skipped {
            self.skipped_dispatches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dispatches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reopen(&self) {
        self.reopens.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, camera_id: CameraId) -> CameraTelemetrySnapshot {
        CameraTelemetrySnapshot {
            camera_id,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            skipped_dispatches: self.skipped_dispatches.load(Ordering::Relaxed),
            reopens: self.reopens.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraTelemetrySnapshot {
    pub camera_id: CameraId,
    pub frames_processed: u64,
    pub read_failures: u64,
    pub detector_failures: u64,
    pub dispatches: u64,
    pub skipped_dispatches: u64,
    pub reopens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTelemetry {
    pub cameras: Vec<CameraTelemetrySnapshot>,
    pub actuation: QueueStats,
    pub worker_state: WorkerState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let telemetry = CameraTelemetry::default();
        telemetry.record_frame();
        telemetry.record_frame();
        telemetry.record_read_failure();
        telemetry.record_dispatch(false);
        telemetry.record_dispatch(true);
        telemetry.record_dispatch(true);

        let snap = telemetry.snapshot(CameraId(2));
        assert_eq!(snap.camera_id, CameraId(2));
        assert_eq!(snap.frames_processed, 2);
        assert_eq!(snap.read_failures, 1);
        assert_eq!(snap.detector_failures, 0);
        assert_eq!(snap.dispatches, 1);
        assert_eq!(snap.skipped_dispatches, 2);
    }

    #[test]
    fn test_pipeline_telemetry_serializes() {
        let telemetry = CameraTelemetry::default();
        telemetry.record_detector_failure();
        let report = PipelineTelemetry {
            cameras: vec![telemetry.snapshot(CameraId(1))],
            actuation: QueueStats::default(),
            worker_state: WorkerState::Idle,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cameras"][0]["camera_id"], 1);
        assert_eq!(json["cameras"][0]["detector_failures"], 1);
        assert_eq!(json["worker_state"], "idle");

        let back: PipelineTelemetry = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
