use crate::geometry::Point;
use crate::model::{CameraId, DetectedObject};
use crate::store::{Store, StoreError};
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootprintBatch {
    /// Oldest capture first.
    pub points: Vec<Point>,
    /// Capture time of the newest detection read, qualifying or not.
    pub newest_capture: Option<OffsetDateTime>,
}

impl FootprintBatch {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Bottom-center of the detection box, where the person meets the ground.
pub fn footprint_of(detection: &DetectedObject) -> Option<Point> {
    let (center_x, _) = detection.center_x.zip(detection.center_y)?;
    let bbox = &detection.bbox;
    if bbox.width <= 0 || bbox.height <= 0 {
        return None;
    }
    Some(Point::new(
        f64::from(center_x),
        f64::from(bbox.y) + f64::from(bbox.height),
    ))
}

/// Footprints of `tracked_class` detections captured strictly after `after`.
pub fn extract_footprints(
    store: &dyn Store,
    camera_id: CameraId,
    after: OffsetDateTime,
    tracked_class: &str,
) -> Result<FootprintBatch, StoreError> {
    let rows = store.detections_since(camera_id, after)?;
    let newest_capture = rows.iter().map(|row| row.captured_at).max();
    let points = rows
        .iter()
        .filter(|row| row.detection.class_label == tracked_class)
        .filter_map(|row| footprint_of(&row.detection))
        .collect();
    Ok(FootprintBatch {
        points,
        newest_capture,
    })
}
