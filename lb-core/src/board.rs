//! Current detection record
//!
//! One writer (the detection loop) publishes whole [`ConfirmedDetection`] snapshots;
//! any number of readers (the status endpoint, the debug CLI) take an `Arc` to the
//! current one. Identifier and timestamp are always swapped together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::detection::TIME_FORMAT;
use crate::types::VehicleId;

/// The most recent confirmed detection, as served to status queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedDetection {
    pub id: Option<String>,
    pub time: Option<String>,
}

impl ConfirmedDetection {
    pub fn new(vehicle: VehicleId, at: DateTime<Local>) -> Self {
        Self {
            id: Some(vehicle.to_string()),
            time: Some(at.format(TIME_FORMAT).to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.time.is_none()
    }
}

/// Single-writer, multi-reader snapshot cell.
#[derive(Debug, Default)]
pub struct DetectionBoard {
    current: RwLock<Arc<ConfirmedDetection>>,
    revision: AtomicU64,
}

impl DetectionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the record with a new detection.
    pub fn publish(&self, vehicle: VehicleId, at: DateTime<Local>) -> Arc<ConfirmedDetection> {
        let snapshot = Arc::new(ConfirmedDetection::new(vehicle, at));
        self.swap(snapshot.clone());
        snapshot
    }

    /// Reset the record to empty.
    pub fn clear(&self) {
        self.swap(Arc::new(ConfirmedDetection::default()));
    }

    fn swap(&self, snapshot: Arc<ConfirmedDetection>) {
        *self.current.write() = snapshot;
        self.revision.fetch_add(1, Ordering::Release);
    }

    /// The current record. Never blocks on anything but a pointer swap.
    pub fn snapshot(&self) -> Arc<ConfirmedDetection> {
        self.current.read().clone()
    }

    /// Number of writes so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;

    fn at(sec: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 1, 12, 0, sec).earliest().unwrap()
    }

    #[test]
    fn test_starts_empty() {
        let board = DetectionBoard::new();
        assert!(board.snapshot().is_empty());
        assert_eq!(board.revision(), 0);
    }

    #[test]
    fn test_publish_sets_both_fields() {
        let board = DetectionBoard::new();
        board.publish(VehicleId::new(3, 8).unwrap(), at(7));
        let snap = board.snapshot();
        assert_eq!(snap.id.as_deref(), Some("3"));
        assert_eq!(snap.time.as_deref(), Some("2024-06-01 12:00:07"));
        assert_eq!(board.revision(), 1);
    }

    #[test]
    fn test_reads_between_writes_identical() {
        let board = DetectionBoard::new();
        board.publish(VehicleId::new(5, 8).unwrap(), at(1));
        let a = board.snapshot();
        let b = board.snapshot();
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_clear() {
        let board = DetectionBoard::new();
        board.publish(VehicleId::new(5, 8).unwrap(), at(1));
        board.clear();
        assert!(board.snapshot().is_empty());
        assert_eq!(board.revision(), 2);
    }

    #[test]
    fn test_json_shape() {
        let empty = serde_json::to_string(&ConfirmedDetection::default()).unwrap();
        assert_eq!(empty, r#"{"id":null,"time":null}"#);
    }

    #[test]
    fn test_readers_never_see_partial_record() {
        let board = Arc::new(DetectionBoard::new());
        let writer = {
            let board = board.clone();
            thread::spawn(move || {
                for i in 0..500u32 {
                    board.publish(VehicleId::new(i % 8 + 1, 8).unwrap(), at(i % 60));
                    if i % 7 == 0 {
                        board.clear();
                    }
                }
            })
        };
        for _ in 0..2_000 {
            let snap = board.snapshot();
            assert_eq!(snap.id.is_some(), snap.time.is_some());
        }
        writer.join().unwrap();
    }
}
