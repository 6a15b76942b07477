use crate::error::AppError;
use crate::model::{
    BoundingBox, CongestionEvent, NewCongestionEvent, ProcessingStatus, SnapshotId,
};
use crate::pipeline::transitions::{StageEvent, Track, transition};
use crate::store::Store;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

pub mod level;

use level::{CongestionThresholds, determine_congestion_level};

pub const DEFAULT_R_RATIO: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSettings {
    /// Share of a box's height treated as ground contact.
    pub r_ratio: f64,
    pub thresholds: CongestionThresholds,
    pub tracked_class: String,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            r_ratio: DEFAULT_R_RATIO,
            thresholds: CongestionThresholds::default(),
            tracked_class: "person".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    AiNotCompleted(ProcessingStatus),
    NoActiveRoi,
    NonPositiveArea(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(CongestionEvent),
    AlreadyProcessed,
    /// The congestion stage was marked FAILED.
    Rejected(RejectReason),
}

/// Ground area attributed to one detected person.
pub fn footprint_contribution(bbox: &BoundingBox, r_ratio: f64) -> f64 {
    f64::from(bbox.width) * (f64::from(bbox.height) * r_ratio).max(1.0)
}

pub struct CongestionScorer {
    store: Arc<dyn Store>,
    settings: ScoringSettings,
}

impl CongestionScorer {
    pub fn new(store: Arc<dyn Store>, settings: ScoringSettings) -> Self {
        Self { store, settings }
    }

    pub fn score_snapshot(&self, snapshot_id: SnapshotId) -> Result<ScoreOutcome, AppError> {
        self.score_snapshot_at(snapshot_id, OffsetDateTime::now_utc())
    }

    pub fn score_snapshot_at(
        &self,
        snapshot_id: SnapshotId,
        now: OffsetDateTime,
    ) -> Result<ScoreOutcome, AppError> {
        let snapshot = self
            .store
            .snapshot(snapshot_id)?
            .ok_or(AppError::SnapshotNotFound(snapshot_id))?;

        if snapshot.congestion_status == ProcessingStatus::Completed {
            info!(snapshot_id, "Congestion already scored");
            return Ok(ScoreOutcome::AlreadyProcessed);
        }
        transition(
            Track::Congestion,
            snapshot.congestion_status,
            StageEvent::Succeed,
        )?;

        if snapshot.ai_status != ProcessingStatus::Completed {
            return self.reject(snapshot_id, RejectReason::AiNotCompleted(snapshot.ai_status));
        }

        let roi_area = match self.store.active_roi(snapshot.camera_id)? {
            Some(roi) if roi.data.area() > 0.0 => roi.data.area(),
            Some(roi) => {
                return self.reject(snapshot_id, RejectReason::NonPositiveArea(roi.data.area()));
            }
            None => return self.reject(snapshot_id, RejectReason::NoActiveRoi),
        };

        let persons: Vec<BoundingBox> = self
            .store
            .detections_for_snapshot(snapshot_id)?
            .into_iter()
            .filter(|detection| detection.class_label == self.settings.tracked_class)
            .map(|detection| detection.bbox)
            .collect();
        let occupied: f64 = persons
            .iter()
            .map(|bbox| footprint_contribution(bbox, self.settings.r_ratio))
            .sum();
        let value = occupied / roi_area;
        let level = determine_congestion_level(value, &self.settings.thresholds);

        let event = NewCongestionEvent {
            camera_id: snapshot.camera_id,
            snapshot_id,
            event_timestamp: now,
            person_count: u32::try_from(persons.len()).unwrap_or(u32::MAX),
            roi_area,
            congestion_value_raw: value,
            congestion_level: level,
            alert_triggered: level.is_alert(),
        };

        match self.store.record_congestion(event)? {
            Some(event) => {
                info!(
                    camera_id = event.camera_id,
                    snapshot_id,
                    person_count = event.person_count,
                    value = event.congestion_value_raw,
                    level = ?event.congestion_level,
                    alert = event.alert_triggered,
                    "Congestion scored"
                );
                Ok(ScoreOutcome::Scored(event))
            }
            None => Ok(ScoreOutcome::AlreadyProcessed),
        }
    }

    fn reject(
        &self,
        snapshot_id: SnapshotId,
        reason: RejectReason,
    ) -> Result<ScoreOutcome, AppError> {
        let mut snapshot = self
            .store
            .snapshot(snapshot_id)?
            .ok_or(AppError::SnapshotNotFound(snapshot_id))?;
        snapshot.congestion_status =
            transition(Track::Congestion, snapshot.congestion_status, StageEvent::Fail)?;
        self.store.update_snapshot(&snapshot)?;
        warn!(snapshot_id, reason = ?reason, "Congestion scoring rejected");
        Ok(ScoreOutcome::Rejected(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion::level::CongestionLevel;
    use crate::geometry::Point;
    use crate::model::{Camera, CameraStatus, NewDetection, Snapshot};
    use crate::roi::definition::RoiData;
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    fn store_with_camera() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_cameras([Camera {
            camera_id: 1,
            name: "hall".to_string(),
            source_url: "rtsp://example.invalid/hall".to_string(),
            status: CameraStatus::Active,
            is_active_monitoring: true,
        }]))
    }

    fn square_roi(side: f64) -> RoiData {
        RoiData::ManualPolygon {
            coordinates: vec![
                Point::new(0.0, 0.0),
                Point::new(side, 0.0),
                Point::new(side, side),
                Point::new(0.0, side),
            ],
            area: side * side,
        }
    }

    fn detection(label: &str, width: i32, height: i32) -> NewDetection {
        NewDetection {
            label: label.to_string(),
            confidence: 0.9,
            bbox_x: 0,
            bbox_y: 0,
            bbox_width: width,
            bbox_height: height,
            center_x: None,
            center_y: None,
        }
    }

    fn analysed_snapshot(
        store: &MemoryStore,
        detections: &[NewDetection],
    ) -> Result<Snapshot, AppError> {
        let mut snapshot = store.create_snapshot(1, OffsetDateTime::now_utc(), PathBuf::new())?;
        store.replace_detections(snapshot.snapshot_id, detections)?;
        snapshot.ai_status = ProcessingStatus::Completed;
        store.update_snapshot(&snapshot)?;
        Ok(snapshot)
    }

    #[test]
    fn contribution_uses_minimum_depth_of_one() {
        let short = BoundingBox {
            x: 0,
            y: 0,
            width: 30,
            height: 10,
        };
        let tall = BoundingBox {
            x: 0,
            y: 0,
            width: 30,
            height: 100,
        };
        assert_eq!(footprint_contribution(&short, 0.05), 30.0);
        assert_eq!(footprint_contribution(&tall, 0.05), 150.0);
    }

    #[test]
    fn hundred_people_over_full_roi_is_very_high() -> Result<(), AppError> {
        let store = store_with_camera();
        store.replace_active_roi(1, square_roi(100.0))?;
        // 100 x max(1, 20 * 0.05) = 100 each
        let people = vec![detection("person", 100, 20); 100];
        let snapshot = analysed_snapshot(&store, &people)?;
        let scorer = CongestionScorer::new(store.clone(), ScoringSettings::default());

        let ScoreOutcome::Scored(event) = scorer.score_snapshot(snapshot.snapshot_id)? else {
            panic!("snapshot was not scored");
        };

        assert_eq!(event.person_count, 100);
        assert!((event.congestion_value_raw - 1.0).abs() < 1e-9);
        assert_eq!(event.congestion_level, CongestionLevel::VeryHigh);
        assert!(event.alert_triggered);
        Ok(())
    }

    #[test]
    fn other_classes_are_ignored() -> Result<(), AppError> {
        let store = store_with_camera();
        store.replace_active_roi(1, square_roi(100.0))?;
        let snapshot = analysed_snapshot(
            &store,
            &[detection("person", 100, 20), detection("bicycle", 500, 500)],
        )?;
        let scorer = CongestionScorer::new(store.clone(), ScoringSettings::default());

        let ScoreOutcome::Scored(event) = scorer.score_snapshot(snapshot.snapshot_id)? else {
            panic!("snapshot was not scored");
        };

        assert_eq!(event.person_count, 1);
        assert!((event.congestion_value_raw - 0.01).abs() < 1e-9);
        assert_eq!(event.congestion_level, CongestionLevel::Low);
        assert!(!event.alert_triggered);
        Ok(())
    }

    #[test]
    fn scoring_twice_is_a_no_op() -> Result<(), AppError> {
        let store = store_with_camera();
        store.replace_active_roi(1, square_roi(100.0))?;
        let snapshot = analysed_snapshot(&store, &[detection("person", 10, 20)])?;
        let scorer = CongestionScorer::new(store.clone(), ScoringSettings::default());

        assert!(matches!(
            scorer.score_snapshot(snapshot.snapshot_id)?,
            ScoreOutcome::Scored(_)
        ));
        assert_eq!(
            scorer.score_snapshot(snapshot.snapshot_id)?,
            ScoreOutcome::AlreadyProcessed
        );
        assert_eq!(store.congestion_events(1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn pending_ai_fails_the_congestion_stage() -> Result<(), AppError> {
        let store = store_with_camera();
        store.replace_active_roi(1, square_roi(100.0))?;
        let snapshot = store.create_snapshot(1, OffsetDateTime::now_utc(), PathBuf::new())?;
        let scorer = CongestionScorer::new(store.clone(), ScoringSettings::default());

        let outcome = scorer.score_snapshot(snapshot.snapshot_id)?;

        assert_eq!(
            outcome,
            ScoreOutcome::Rejected(RejectReason::AiNotCompleted(ProcessingStatus::Pending))
        );
        let stored = store
            .snapshot(snapshot.snapshot_id)?
            .ok_or(AppError::SnapshotNotFound(snapshot.snapshot_id))?;
        assert_eq!(stored.congestion_status, ProcessingStatus::Failed);
        assert!(store.congestion_events(1)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_or_empty_roi_is_rejected() -> Result<(), AppError> {
        let store = store_with_camera();
        let scorer = CongestionScorer::new(store.clone(), ScoringSettings::default());

        let first = analysed_snapshot(&store, &[])?;
        assert_eq!(
            scorer.score_snapshot(first.snapshot_id)?,
            ScoreOutcome::Rejected(RejectReason::NoActiveRoi)
        );

        store.replace_active_roi(1, RoiData::points_only(vec![Point::new(1.0, 1.0)], None))?;
        let second = analysed_snapshot(&store, &[])?;
        assert_eq!(
            scorer.score_snapshot(second.snapshot_id)?,
            ScoreOutcome::Rejected(RejectReason::NonPositiveArea(0.0))
        );
        Ok(())
    }

    #[test]
    fn failed_stage_is_terminal() -> Result<(), AppError> {
        let store = store_with_camera();
        let snapshot = store.create_snapshot(1, OffsetDateTime::now_utc(), PathBuf::new())?;
        let scorer = CongestionScorer::new(store.clone(), ScoringSettings::default());
        scorer.score_snapshot(snapshot.snapshot_id)?;

        let result = scorer.score_snapshot(snapshot.snapshot_id);

        assert!(matches!(result, Err(AppError::Transition(_))));
        Ok(())
    }
}
