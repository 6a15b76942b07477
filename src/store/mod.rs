use crate::model::{
    Camera, CameraId, CongestionEvent, DetectedObject, EventId, NewCongestionEvent,
    NewDetection, RoiDefinition, Snapshot, SnapshotId, TimedDetection,
};
use crate::roi::definition::RoiData;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("store lock poisoned")]
    Lock,
    #[error("invalid roi document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary for the five pipeline entities.
///
/// Every method is a single transaction: readers never observe a partially
/// applied write.
pub trait Store: Send + Sync {
    fn cameras(&self) -> Result<Vec<Camera>, StoreError>;

    fn camera(&self, camera_id: CameraId) -> Result<Option<Camera>, StoreError>;

    /// Creates a snapshot in (PENDING, PENDING).
    fn create_snapshot(
        &self,
        camera_id: CameraId,
        captured_at: OffsetDateTime,
        image_path: PathBuf,
    ) -> Result<Snapshot, StoreError>;

    fn snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<Snapshot>, StoreError>;

    fn update_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Drops any detections already attached to the snapshot and inserts `detections`.
    fn replace_detections(
        &self,
        snapshot_id: SnapshotId,
        detections: &[NewDetection],
    ) -> Result<Vec<DetectedObject>, StoreError>;

    fn detections_for_snapshot(
        &self,
        snapshot_id: SnapshotId,
    ) -> Result<Vec<DetectedObject>, StoreError>;

    /// Detections of a camera whose snapshot was captured strictly after `after`.
    fn detections_since(
        &self,
        camera_id: CameraId,
        after: OffsetDateTime,
    ) -> Result<Vec<TimedDetection>, StoreError>;

    fn active_roi(&self, camera_id: CameraId) -> Result<Option<RoiDefinition>, StoreError>;

    /// Deactivates the current definition and activates `data` as the next version.
    fn replace_active_roi(
        &self,
        camera_id: CameraId,
        data: RoiData,
    ) -> Result<RoiDefinition, StoreError>;

    /// Overwrites the active definition's payload without bumping its version.
    fn refresh_active_roi(
        &self,
        camera_id: CameraId,
        data: RoiData,
    ) -> Result<RoiDefinition, StoreError>;

    /// Inserts the event and marks the snapshot's congestion stage COMPLETED.
    /// Returns `None` without writing when the stage is already COMPLETED.
    fn record_congestion(
        &self,
        event: NewCongestionEvent,
    ) -> Result<Option<CongestionEvent>, StoreError>;

    fn congestion_events(&self, camera_id: CameraId) -> Result<Vec<CongestionEvent>, StoreError>;

    fn acknowledge_event(
        &self,
        event_id: EventId,
        at: OffsetDateTime,
    ) -> Result<CongestionEvent, StoreError>;
}
