use crate::model::{
    BoundingBox, Camera, CameraId, CongestionEvent, DetectedObject, EventId, NewCongestionEvent,
    NewDetection, ProcessingStatus, RoiDefinition, Snapshot, SnapshotId, TimedDetection,
};
use crate::roi::definition::RoiData;
use crate::store::{Store, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::OffsetDateTime;
use tokio::sync::watch;

/// Stored ROI row. The payload is kept as a JSON document and decoded on read.
#[derive(Debug, Clone)]
struct RoiRow {
    roi_def_id: u32,
    camera_id: CameraId,
    document: serde_json::Value,
    is_active: bool,
    version: u32,
    updated_at: OffsetDateTime,
}

impl RoiRow {
    fn decode(&self) -> Result<RoiDefinition, StoreError> {
        Ok(RoiDefinition {
            roi_def_id: self.roi_def_id,
            camera_id: self.camera_id,
            data: RoiData::from_document(self.document.clone())?,
            is_active: self.is_active,
            version: self.version,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Default)]
struct Tables {
    cameras: BTreeMap<CameraId, Camera>,
    snapshots: BTreeMap<SnapshotId, Snapshot>,
    detections: BTreeMap<SnapshotId, Vec<DetectedObject>>,
    rois: Vec<RoiRow>,
    events: BTreeMap<EventId, CongestionEvent>,
    next_snapshot_id: SnapshotId,
    next_detection_id: u64,
    next_roi_id: u32,
    next_event_id: EventId,
}

impl Tables {
    fn active_row(&self, camera_id: CameraId) -> Option<&RoiRow> {
        self.rois
            .iter()
            .find(|row| row.camera_id == camera_id && row.is_active)
    }

    fn active_row_mut(&mut self, camera_id: CameraId) -> Option<&mut RoiRow> {
        self.rois
            .iter_mut()
            .find(|row| row.camera_id == camera_id && row.is_active)
    }
}

/// Process-local store. Each trait call holds the table lock for its whole
/// duration, which gives it transaction semantics.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    rois_tx: watch::Sender<HashMap<CameraId, RoiDefinition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (rois_tx, _rois_rx) = watch::channel(HashMap::new());
        Self {
            tables: RwLock::new(Tables::default()),
            rois_tx,
        }
    }

    pub fn with_cameras(cameras: impl IntoIterator<Item = Camera>) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            for camera in cameras {
                tables.cameras.insert(camera.camera_id, camera);
            }
        }
        store
    }

    pub fn upsert_camera(&self, camera: Camera) -> Result<(), StoreError> {
        self.write()?.cameras.insert(camera.camera_id, camera);
        Ok(())
    }

    /// Active definitions by camera, republished after every ROI write.
    pub fn subscribe_rois(&self) -> watch::Receiver<HashMap<CameraId, RoiDefinition>> {
        self.rois_tx.subscribe()
    }

    /// Every definition ever written for a camera, oldest version first.
    pub fn roi_history(&self, camera_id: CameraId) -> Result<Vec<RoiDefinition>, StoreError> {
        self.read()?
            .rois
            .iter()
            .filter(|row| row.camera_id == camera_id)
            .map(RoiRow::decode)
            .collect()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Lock)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Lock)
    }

    fn publish_rois(&self, tables: &Tables) -> Result<(), StoreError> {
        let active = tables
            .rois
            .iter()
            .filter(|row| row.is_active)
            .map(|row| row.decode().map(|definition| (row.camera_id, definition)))
            .collect::<Result<HashMap<_, _>, _>>()?;
        self.rois_tx.send_replace(active);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_not_found(snapshot_id: SnapshotId) -> StoreError {
    StoreError::NotFound {
        entity: "snapshot",
        id: snapshot_id,
    }
}

fn roi_not_found(camera_id: CameraId) -> StoreError {
    StoreError::NotFound {
        entity: "active roi for camera",
        id: u64::from(camera_id),
    }
}

fn center_of(detection: &NewDetection) -> (Option<i32>, Option<i32>) {
    let center_x = detection
        .center_x
        .or(Some(detection.bbox_x + detection.bbox_width / 2));
    let center_y = detection
        .center_y
        .or(Some(detection.bbox_y + detection.bbox_height / 2));
    (center_x, center_y)
}

impl Store for MemoryStore {
    fn cameras(&self) -> Result<Vec<Camera>, StoreError> {
        Ok(self.read()?.cameras.values().cloned().collect())
    }

    fn camera(&self, camera_id: CameraId) -> Result<Option<Camera>, StoreError> {
        Ok(self.read()?.cameras.get(&camera_id).cloned())
    }

    fn create_snapshot(
        &self,
        camera_id: CameraId,
        captured_at: OffsetDateTime,
        image_path: PathBuf,
    ) -> Result<Snapshot, StoreError> {
        let mut tables = self.write()?;
        if !tables.cameras.contains_key(&camera_id) {
            return Err(StoreError::NotFound {
                entity: "camera",
                id: u64::from(camera_id),
            });
        }
        tables.next_snapshot_id += 1;
        let snapshot = Snapshot {
            snapshot_id: tables.next_snapshot_id,
            camera_id,
            captured_at,
            image_path,
            processed_image_path: None,
            ai_status: ProcessingStatus::Pending,
            congestion_status: ProcessingStatus::Pending,
            analyzed_at: None,
        };
        tables.snapshots.insert(snapshot.snapshot_id, snapshot.clone());
        Ok(snapshot)
    }

    fn snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.read()?.snapshots.get(&snapshot_id).cloned())
    }

    fn update_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let stored = tables
            .snapshots
            .get_mut(&snapshot.snapshot_id)
            .ok_or_else(|| snapshot_not_found(snapshot.snapshot_id))?;
        *stored = snapshot.clone();
        Ok(())
    }

    fn replace_detections(
        &self,
        snapshot_id: SnapshotId,
        detections: &[NewDetection],
    ) -> Result<Vec<DetectedObject>, StoreError> {
        let mut tables = self.write()?;
        if !tables.snapshots.contains_key(&snapshot_id) {
            return Err(snapshot_not_found(snapshot_id));
        }
        let mut stored = Vec::with_capacity(detections.len());
        for detection in detections {
            tables.next_detection_id += 1;
            let (center_x, center_y) = center_of(detection);
            stored.push(DetectedObject {
                detection_id: tables.next_detection_id,
                snapshot_id,
                class_label: detection.label.clone(),
                confidence: detection.confidence,
                bbox: BoundingBox {
                    x: detection.bbox_x,
                    y: detection.bbox_y,
                    width: detection.bbox_width,
                    height: detection.bbox_height,
                },
                center_x,
                center_y,
            });
        }
        tables.detections.insert(snapshot_id, stored.clone());
        Ok(stored)
    }

    fn detections_for_snapshot(
        &self,
        snapshot_id: SnapshotId,
    ) -> Result<Vec<DetectedObject>, StoreError> {
        Ok(self
            .read()?
            .detections
            .get(&snapshot_id)
            .cloned()
            .unwrap_or_default())
    }

    fn detections_since(
        &self,
        camera_id: CameraId,
        after: OffsetDateTime,
    ) -> Result<Vec<TimedDetection>, StoreError> {
        let tables = self.read()?;
        let mut rows: Vec<TimedDetection> = tables
            .snapshots
            .values()
            .filter(|snapshot| snapshot.camera_id == camera_id && snapshot.captured_at > after)
            .flat_map(|snapshot| {
                tables
                    .detections
                    .get(&snapshot.snapshot_id)
                    .into_iter()
                    .flatten()
                    .map(|detection| TimedDetection {
                        captured_at: snapshot.captured_at,
                        detection: detection.clone(),
                    })
            })
            .collect();
        rows.sort_by_key(|row| (row.captured_at, row.detection.detection_id));
        Ok(rows)
    }

    fn active_roi(&self, camera_id: CameraId) -> Result<Option<RoiDefinition>, StoreError> {
        self.read()?
            .active_row(camera_id)
            .map(RoiRow::decode)
            .transpose()
    }

    fn replace_active_roi(
        &self,
        camera_id: CameraId,
        data: RoiData,
    ) -> Result<RoiDefinition, StoreError> {
        let document = data.to_document()?;
        let mut tables = self.write()?;
        let version = tables
            .rois
            .iter()
            .filter(|row| row.camera_id == camera_id)
            .map(|row| row.version)
            .max()
            .unwrap_or(0)
            + 1;
        if let Some(previous) = tables.active_row_mut(camera_id) {
            previous.is_active = false;
        }
        tables.next_roi_id += 1;
        let row = RoiRow {
            roi_def_id: tables.next_roi_id,
            camera_id,
            document,
            is_active: true,
            version,
            updated_at: OffsetDateTime::now_utc(),
        };
        let definition = row.decode()?;
        tables.rois.push(row);
        self.publish_rois(&tables)?;
        Ok(definition)
    }

    fn refresh_active_roi(
        &self,
        camera_id: CameraId,
        data: RoiData,
    ) -> Result<RoiDefinition, StoreError> {
        let document = data.to_document()?;
        let mut tables = self.write()?;
        let row = tables
            .active_row_mut(camera_id)
            .ok_or_else(|| roi_not_found(camera_id))?;
        row.document = document;
        row.updated_at = OffsetDateTime::now_utc();
        let definition = row.decode()?;
        self.publish_rois(&tables)?;
        Ok(definition)
    }

    fn record_congestion(
        &self,
        event: NewCongestionEvent,
    ) -> Result<Option<CongestionEvent>, StoreError> {
        let mut tables = self.write()?;
        let snapshot = tables
            .snapshots
            .get_mut(&event.snapshot_id)
            .ok_or_else(|| snapshot_not_found(event.snapshot_id))?;
        if snapshot.congestion_status == ProcessingStatus::Completed {
            return Ok(None);
        }
        snapshot.congestion_status = ProcessingStatus::Completed;

        tables.next_event_id += 1;
        let stored = CongestionEvent {
            event_id: tables.next_event_id,
            camera_id: event.camera_id,
            snapshot_id: event.snapshot_id,
            event_timestamp: event.event_timestamp,
            person_count: event.person_count,
            roi_area: event.roi_area,
            congestion_value_raw: event.congestion_value_raw,
            congestion_level: event.congestion_level,
            alert_triggered: event.alert_triggered,
            is_acknowledged: false,
            acknowledged_at: None,
        };
        tables.events.insert(stored.event_id, stored.clone());
        Ok(Some(stored))
    }

    fn congestion_events(&self, camera_id: CameraId) -> Result<Vec<CongestionEvent>, StoreError> {
        Ok(self
            .read()?
            .events
            .values()
            .filter(|event| event.camera_id == camera_id)
            .cloned()
            .collect())
    }

    fn acknowledge_event(
        &self,
        event_id: EventId,
        at: OffsetDateTime,
    ) -> Result<CongestionEvent, StoreError> {
        let mut tables = self.write()?;
        let event = tables
            .events
            .get_mut(&event_id)
            .ok_or(StoreError::NotFound {
                entity: "congestion event",
                id: event_id,
            })?;
        if !event.is_acknowledged {
            event.is_acknowledged = true;
            event.acknowledged_at = Some(at);
        }
        Ok(event.clone())
    }
}
