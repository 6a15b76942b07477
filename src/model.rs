use crate::congestion::level::CongestionLevel;
use crate::roi::definition::RoiData;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

pub type CameraId = u32;
pub type SnapshotId = u64;
pub type DetectionId = u64;
pub type EventId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraStatus {
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub camera_id: CameraId,
    pub name: String,
    /// RTSP or HLS locator handed to the frame grabber.
    pub source_url: String,
    pub status: CameraStatus,
    pub is_active_monitoring: bool,
}

impl Camera {
    pub fn is_capturable(&self) -> bool {
        self.status == CameraStatus::Active && self.is_active_monitoring
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub snapshot_id: SnapshotId,
    pub camera_id: CameraId,
    pub captured_at: OffsetDateTime,
    pub image_path: PathBuf,
    pub processed_image_path: Option<PathBuf>,
    pub ai_status: ProcessingStatus,
    pub congestion_status: ProcessingStatus,
    pub analyzed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Detection as reported by the detector, before it is attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDetection {
    pub label: String,
    pub confidence: f64,
    pub bbox_x: i32,
    pub bbox_y: i32,
    pub bbox_width: i32,
    pub bbox_height: i32,
    #[serde(default)]
    pub center_x: Option<i32>,
    #[serde(default)]
    pub center_y: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub detection_id: DetectionId,
    pub snapshot_id: SnapshotId,
    pub class_label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub center_x: Option<i32>,
    pub center_y: Option<i32>,
}

/// A detection joined with the capture time of its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedDetection {
    pub captured_at: OffsetDateTime,
    pub detection: DetectedObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoiDefinition {
    pub roi_def_id: u32,
    pub camera_id: CameraId,
    pub data: RoiData,
    pub is_active: bool,
    pub version: u32,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCongestionEvent {
    pub camera_id: CameraId,
    pub snapshot_id: SnapshotId,
    pub event_timestamp: OffsetDateTime,
    pub person_count: u32,
    pub roi_area: f64,
    pub congestion_value_raw: f64,
    pub congestion_level: CongestionLevel,
    pub alert_triggered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CongestionEvent {
    pub event_id: EventId,
    pub camera_id: CameraId,
    pub snapshot_id: SnapshotId,
    pub event_timestamp: OffsetDateTime,
    pub person_count: u32,
    pub roi_area: f64,
    pub congestion_value_raw: f64,
    pub congestion_level: CongestionLevel,
    pub alert_triggered: bool,
    pub is_acknowledged: bool,
    pub acknowledged_at: Option<OffsetDateTime>,
}
