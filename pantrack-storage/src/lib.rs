//! pantrack-storage: bounded in-memory history of dispatched coordinates.
//!
//! Nothing here is persisted; a restart starts from empty histories.

pub mod history;
pub mod coordinate_store;

pub use history::{AxisStats, CameraHistory, CameraStats};
pub use coordinate_store::{CameraSummary, CoordinateStore, DEFAULT_HISTORY_LIMIT};
