use crate::error::AppError;
use crate::geometry::alpha::{AlphaComplex, optimize_alpha};
use crate::geometry::{Point, Polygon, Shape, contains, convex_hull, dedup_points};
use crate::model::CameraId;
use crate::state::{AppState, CycleReport, CycleStatus};
use crate::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub mod cache;
pub mod definition;
pub mod footprint;
pub mod overlay;
pub mod window;

use cache::{AlphaCache, fingerprint};
use definition::{RoiData, RoiKind};
use footprint::{FootprintBatch, extract_footprints};
use overlay::{OverlayFrame, OverlaySink};
use window::merge_window;

pub const DEFAULT_MIN_POINTS: usize = 3;
pub const DEFAULT_INITIAL_BACKFILL_DAYS: i64 = 7;
pub const DEFAULT_OPTIMIZE_SAMPLE_THRESHOLD: usize = 500;
pub const DEFAULT_OPTIMIZE_SAMPLE_SIZE: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct RoiSettings {
    pub max_points: usize,
    pub min_points: usize,
    pub initial_backfill: time::Duration,
    pub optimize_sample_threshold: usize,
    pub optimize_sample_size: usize,
    pub alpha_cache_capacity: usize,
    pub tracked_class: String,
}

impl Default for RoiSettings {
    fn default() -> Self {
        Self {
            max_points: window::DEFAULT_MAX_POINTS,
            min_points: DEFAULT_MIN_POINTS,
            initial_backfill: time::Duration::days(DEFAULT_INITIAL_BACKFILL_DAYS),
            optimize_sample_threshold: DEFAULT_OPTIMIZE_SAMPLE_THRESHOLD,
            optimize_sample_size: DEFAULT_OPTIMIZE_SAMPLE_SIZE,
            alpha_cache_capacity: cache::DEFAULT_ALPHA_CACHE_CAPACITY,
            tracked_class: "person".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoiUpdateOutcome {
    /// Nothing new since the marker; no state was touched.
    NoNewFootprints,
    /// The active definition is operator-drawn and left alone.
    Manual,
    /// Every new point fell inside the current boundary. The window and the
    /// marker were refreshed in place.
    Unchanged { points: usize },
    /// Points were stored without a new boundary (too few points, or the
    /// shape could not be built). An existing boundary is kept.
    PointsOnly { points: usize, version: u32 },
    Updated {
        kind: RoiKind,
        area: f64,
        vertex_count: usize,
        alpha: Option<f64>,
        version: u32,
    },
}

/// Keeps a capped window of ground footprints per camera and refits the
/// concave boundary when new points leave the current one.
pub struct RoiEstimator {
    store: Arc<dyn Store>,
    settings: RoiSettings,
    cache: AlphaCache,
    overlay: Option<Arc<dyn OverlaySink>>,
}

impl RoiEstimator {
    pub fn new(store: Arc<dyn Store>, settings: RoiSettings) -> Self {
        let cache = AlphaCache::new(settings.alpha_cache_capacity);
        Self {
            store,
            settings,
            cache,
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn OverlaySink>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn cache(&self) -> &AlphaCache {
        &self.cache
    }

    pub fn update_camera(
        &mut self,
        camera_id: CameraId,
        now: OffsetDateTime,
    ) -> Result<RoiUpdateOutcome, AppError> {
        let existing = self.store.active_roi(camera_id)?.map(|roi| roi.data);
        if existing
            .as_ref()
            .is_some_and(|data| data.kind() == RoiKind::ManualPolygon)
        {
            debug!(camera_id, "Manual ROI in place, skipping estimation");
            return Ok(RoiUpdateOutcome::Manual);
        }

        let start = existing
            .as_ref()
            .and_then(RoiData::last_processed)
            .unwrap_or(now - self.settings.initial_backfill);
        let batch = extract_footprints(
            self.store.as_ref(),
            camera_id,
            start,
            &self.settings.tracked_class,
        )?;
        let (added, marker) = match batch {
            FootprintBatch {
                points,
                newest_capture: Some(marker),
            } if !points.is_empty() => (points, marker),
            _ => {
                debug!(camera_id, since = %start, "No new footprints");
                return Ok(RoiUpdateOutcome::NoNewFootprints);
            }
        };

        let previous: &[Point] = existing.as_ref().map(RoiData::points).unwrap_or(&[]);
        let window = merge_window(previous, &added, self.settings.max_points);

        let outcome = match existing.as_ref() {
            Some(data)
                if data.has_boundary()
                    && added.iter().all(|&point| contains(data.boundary(), point)) =>
            {
                self.store
                    .refresh_active_roi(camera_id, data.with_window(window.clone(), Some(marker)))?;
                RoiUpdateOutcome::Unchanged {
                    points: window.len(),
                }
            }
            _ => self.refit(camera_id, existing.as_ref(), &window, marker)?,
        };

        match &outcome {
            RoiUpdateOutcome::Updated {
                kind,
                area,
                vertex_count,
                version,
                ..
            } => info!(
                camera_id,
                kind = ?kind,
                area = *area,
                vertices = *vertex_count,
                version = *version,
                points = window.len(),
                "ROI updated"
            ),
            other => debug!(camera_id, outcome = ?other, "ROI cycle finished"),
        }

        self.render_overlay(camera_id, now, &window, &added, &outcome);
        Ok(outcome)
    }

    /// Visits every monitored camera. A failing camera is counted and
    /// logged; the others are still processed.
    pub fn run_cycle(&mut self, now: OffsetDateTime) -> Result<CycleReport, AppError> {
        let cameras = self.store.cameras()?;
        let mut report = CycleReport::default();
        for camera in cameras.iter().filter(|camera| camera.is_active_monitoring) {
            match self.update_camera(camera.camera_id, now) {
                Ok(_) => report.record(true),
                Err(err) => {
                    warn!(camera_id = camera.camera_id, error = %err, "ROI update failed");
                    report.record(false);
                }
            }
        }
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "ROI cycle complete"
        );
        Ok(report)
    }

    fn refit(
        &mut self,
        camera_id: CameraId,
        existing: Option<&RoiData>,
        window: &[Point],
        marker: OffsetDateTime,
    ) -> Result<RoiUpdateOutcome, AppError> {
        let unique = dedup_points(window);
        if unique.len() < self.settings.min_points {
            debug!(camera_id, points = unique.len(), "Too few points for a boundary");
            return self.keep_points(camera_id, existing, window, marker);
        }

        let floor = existing
            .filter(|data| data.has_boundary())
            .map(RoiData::area)
            .unwrap_or(0.0);
        let Some(data) = self.fit_boundary(&unique, floor, window, marker) else {
            warn!(camera_id, points = unique.len(), "ROI shape computation failed");
            return self.keep_points(camera_id, existing, window, marker);
        };

        let kind = data.kind();
        let area = data.area();
        let vertex_count = data.boundary().len();
        let alpha = data.alpha();
        let stored = self.store.replace_active_roi(camera_id, data)?;
        Ok(RoiUpdateOutcome::Updated {
            kind,
            area,
            vertex_count,
            alpha,
            version: stored.version,
        })
    }

    /// Concave boundary of `unique` whose area is at least `floor`. Falls
    /// back to the convex hull when no concave region reaches it.
    fn fit_boundary(
        &mut self,
        unique: &[Point],
        floor: f64,
        window: &[Point],
        marker: OffsetDateTime,
    ) -> Option<RoiData> {
        let complex = AlphaComplex::build(unique).ok()?;
        let key = fingerprint(unique);
        let alpha = match self.cache.get(key) {
            Some(alpha) => alpha,
            None => {
                let sample = sample_points(
                    unique,
                    self.settings.optimize_sample_threshold,
                    self.settings.optimize_sample_size,
                );
                let alpha = optimize_alpha(&sample)?;
                self.cache.set(key, alpha);
                alpha
            }
        };

        let region = match complex.shape(alpha) {
            Shape::Region(polygon) if polygon.area >= floor => Some((alpha, polygon)),
            _ => complex.relax_to_area(alpha, floor.max(f64::MIN_POSITIVE)),
        };
        match region {
            Some((alpha, polygon)) => Some(sliding(polygon, alpha, window, marker)),
            None => match convex_hull(unique) {
                Shape::Region(hull) => Some(RoiData::DynamicConvexHull {
                    coordinates: hull.exterior(),
                    area: hull.area,
                    points: window.to_vec(),
                    last_processed_timestamp: Some(marker),
                }),
                Shape::NoShape(_) => None,
            },
        }
    }

    fn keep_points(
        &self,
        camera_id: CameraId,
        existing: Option<&RoiData>,
        window: &[Point],
        marker: OffsetDateTime,
    ) -> Result<RoiUpdateOutcome, AppError> {
        let stored = match existing {
            Some(data) if data.has_boundary() => self
                .store
                .refresh_active_roi(camera_id, data.with_window(window.to_vec(), Some(marker)))?,
            Some(_) => self.store.refresh_active_roi(
                camera_id,
                RoiData::points_only(window.to_vec(), Some(marker)),
            )?,
            None => self.store.replace_active_roi(
                camera_id,
                RoiData::points_only(window.to_vec(), Some(marker)),
            )?,
        };
        Ok(RoiUpdateOutcome::PointsOnly {
            points: window.len(),
            version: stored.version,
        })
    }

    fn render_overlay(
        &self,
        camera_id: CameraId,
        now: OffsetDateTime,
        window: &[Point],
        added: &[Point],
        outcome: &RoiUpdateOutcome,
    ) {
        let Some(overlay) = self.overlay.as_ref() else {
            return;
        };
        // A kept older boundary is not this cycle's result.
        let computed = match outcome {
            RoiUpdateOutcome::Updated { .. } | RoiUpdateOutcome::Unchanged { .. } => {
                match self.store.active_roi(camera_id) {
                    Ok(active) => active.map(|roi| roi.data).filter(RoiData::has_boundary),
                    Err(err) => {
                        warn!(camera_id, error = %err, "Overlay skipped");
                        return;
                    }
                }
            }
            _ => None,
        };
        let frame = OverlayFrame {
            camera_id,
            generated_at: now,
            accumulated: window,
            added,
            boundary: computed.as_ref().map(RoiData::boundary),
            area: computed.as_ref().map(RoiData::area).unwrap_or(0.0),
        };
        match overlay.render(&frame) {
            Ok(path) => debug!(camera_id, path = %path.display(), "ROI overlay written"),
            Err(err) => warn!(camera_id, error = %err, "Failed to write ROI overlay"),
        }
    }
}

fn sliding(polygon: Polygon, alpha: f64, window: &[Point], marker: OffsetDateTime) -> RoiData {
    RoiData::DynamicAlphaShapeSliding {
        coordinates: polygon.exterior(),
        area: polygon.area,
        points: window.to_vec(),
        alpha: Some(alpha),
        last_processed_timestamp: Some(marker),
    }
}

/// Evenly strided subset of `points` once there are more than `threshold`.
pub fn sample_points(points: &[Point], threshold: usize, size: usize) -> Vec<Point> {
    if points.len() <= threshold || size == 0 || size >= points.len() {
        return points.to_vec();
    }
    let stride = points.len() as f64 / size as f64;
    (0..size)
        .map(|index| points[((index as f64 * stride) as usize).min(points.len() - 1)])
        .collect()
}

pub fn spawn_refresh_thread(
    mut estimator: RoiEstimator,
    state: Arc<RwLock<AppState>>,
    interval: std::time::Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();
            let now = OffsetDateTime::now_utc();

            match estimator.run_cycle(now) {
                Ok(report) => match state.write() {
                    Ok(mut guard) => guard.set_roi_cycle(CycleStatus {
                        report,
                        finished_at: OffsetDateTime::now_utc(),
                    }),
                    Err(_) => warn!("State lock poisoned while recording ROI cycle"),
                },
                Err(err) => warn!(error = %err, "Error running ROI cycle"),
            }

            sleep_with_stop(interval, &stop, cycle_start);
        }
    })
}

pub(crate) fn sleep_with_stop(duration: std::time::Duration, stop: &AtomicBool, start: Instant) {
    let Some(remaining) = duration.checked_sub(start.elapsed()) else {
        return;
    };
    let step = std::time::Duration::from_millis(100);
    let mut slept = std::time::Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step.min(remaining - slept));
        slept += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Camera, CameraStatus, CongestionEvent, DetectedObject, EventId, NewCongestionEvent,
        NewDetection, RoiDefinition, Snapshot, SnapshotId, TimedDetection,
    };
    use crate::store::{MemoryStore, StoreError};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-07-01 12:00 UTC);

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_cameras([Camera {
            camera_id: 1,
            name: "lobby".to_string(),
            source_url: "rtsp://example.invalid/lobby".to_string(),
            status: CameraStatus::Active,
            is_active_monitoring: true,
        }]))
    }

    fn observe(
        store: &MemoryStore,
        at: OffsetDateTime,
        footprints: &[(i32, i32)],
    ) -> Result<(), AppError> {
        observe_on(store, 1, at, footprints)
    }

    /// Stores one snapshot whose person detections have the given footprints.
    fn observe_on(
        store: &MemoryStore,
        camera_id: CameraId,
        at: OffsetDateTime,
        footprints: &[(i32, i32)],
    ) -> Result<(), AppError> {
        let snapshot = store.create_snapshot(camera_id, at, PathBuf::new())?;
        let detections: Vec<NewDetection> = footprints
            .iter()
            .map(|&(x, y)| NewDetection {
                label: "person".to_string(),
                confidence: 0.9,
                bbox_x: x - 5,
                bbox_y: y - 30,
                bbox_width: 10,
                bbox_height: 30,
                center_x: Some(x),
                center_y: Some(y - 15),
            })
            .collect();
        store.replace_detections(snapshot.snapshot_id, &detections)?;
        Ok(())
    }

    #[test]
    fn sample_points_is_strided_and_bounded() {
        let points: Vec<Point> = (0..1000).map(|i| Point::new(i as f64, 0.0)).collect();
        let sample = sample_points(&points, 500, 300);
        assert_eq!(sample.len(), 300);
        assert_eq!(sample[0], points[0]);
        assert!(sample.windows(2).all(|pair| pair[0].x < pair[1].x));
        assert_eq!(sample_points(&points[..400], 500, 300).len(), 400);
    }

    #[test]
    fn empty_cycle_leaves_no_trace() -> Result<(), AppError> {
        let store = store();
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        let outcome = estimator.update_camera(1, NOW)?;

        assert_eq!(outcome, RoiUpdateOutcome::NoNewFootprints);
        assert!(store.active_roi(1)?.is_none());
        Ok(())
    }

    #[test]
    fn detections_older_than_backfill_are_ignored() -> Result<(), AppError> {
        let store = store();
        observe(&store, NOW - Duration::days(8), &[(0, 0), (50, 0), (0, 50)])?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        assert_eq!(
            estimator.update_camera(1, NOW)?,
            RoiUpdateOutcome::NoNewFootprints
        );
        Ok(())
    }

    #[test]
    fn two_points_are_stored_without_boundary() -> Result<(), AppError> {
        let store = store();
        let captured = NOW - Duration::hours(1);
        observe(&store, captured, &[(10, 10), (20, 20)])?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        let outcome = estimator.update_camera(1, NOW)?;

        assert_eq!(
            outcome,
            RoiUpdateOutcome::PointsOnly {
                points: 2,
                version: 1
            }
        );
        let active = store.active_roi(1)?.ok_or(AppError::CameraNotFound(1))?;
        assert!(!active.data.has_boundary());
        assert_eq!(active.data.last_processed(), Some(captured));
        Ok(())
    }

    #[test]
    fn marker_prevents_double_counting() -> Result<(), AppError> {
        let store = store();
        observe(&store, NOW - Duration::hours(2), &[(10, 10), (20, 20)])?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());
        estimator.update_camera(1, NOW)?;

        let outcome = estimator.update_camera(1, NOW + Duration::minutes(5))?;

        assert_eq!(outcome, RoiUpdateOutcome::NoNewFootprints);
        let active = store.active_roi(1)?.ok_or(AppError::CameraNotFound(1))?;
        assert_eq!(active.data.points().len(), 2);
        Ok(())
    }

    #[test]
    fn collinear_points_fall_back_to_points_only() -> Result<(), AppError> {
        let store = store();
        observe(&store, NOW - Duration::hours(1), &[(0, 0), (10, 10), (20, 20), (30, 30)])?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        let outcome = estimator.update_camera(1, NOW)?;

        assert!(matches!(outcome, RoiUpdateOutcome::PointsOnly { points: 4, .. }));
        Ok(())
    }

    #[test]
    fn manual_roi_is_never_touched() -> Result<(), AppError> {
        let store = store();
        let manual = RoiData::ManualPolygon {
            coordinates: vec![
                Point::new(0.0, 0.0),
                Point::new(5.0, 0.0),
                Point::new(0.0, 5.0),
            ],
            area: 12.5,
        };
        store.replace_active_roi(1, manual.clone())?;
        observe(&store, NOW - Duration::hours(1), &[(100, 100), (200, 100), (100, 200)])?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        assert_eq!(estimator.update_camera(1, NOW)?, RoiUpdateOutcome::Manual);
        assert_eq!(store.active_roi(1)?.map(|roi| roi.data), Some(manual));
        Ok(())
    }

    #[test]
    fn points_on_the_boundary_leave_it_unchanged() -> Result<(), AppError> {
        let store = store();
        observe(&store, NOW - Duration::hours(3), &[(0, 0), (100, 0), (0, 100)])?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());
        estimator.update_camera(1, NOW)?;

        observe(&store, NOW - Duration::hours(2), &[(0, 0), (100, 0), (0, 100)])?;
        let outcome = estimator.update_camera(1, NOW)?;

        assert_eq!(outcome, RoiUpdateOutcome::Unchanged { points: 6 });
        let active = store.active_roi(1)?.ok_or(AppError::CameraNotFound(1))?;
        assert_eq!(active.version, 1);
        assert_eq!(active.data.last_processed(), Some(NOW - Duration::hours(2)));
        Ok(())
    }

    #[test]
    fn identical_point_sets_share_one_cache_entry() -> Result<(), AppError> {
        let store = store();
        store.upsert_camera(Camera {
            camera_id: 2,
            name: "mirror".to_string(),
            source_url: "rtsp://example.invalid/mirror".to_string(),
            status: CameraStatus::Active,
            is_active_monitoring: true,
        })?;
        let triangle = [(0, 0), (100, 0), (30, 100)];
        observe_on(&store, 1, NOW - Duration::hours(1), &triangle)?;
        observe_on(&store, 2, NOW - Duration::hours(1), &triangle)?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        let first = estimator.update_camera(1, NOW)?;
        let second = estimator.update_camera(2, NOW)?;

        assert_eq!(estimator.cache().len(), 1);
        let (
            RoiUpdateOutcome::Updated { alpha: a, .. },
            RoiUpdateOutcome::Updated { alpha: b, .. },
        ) = (first, second)
        else {
            panic!("both cameras should get a boundary");
        };
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn window_is_capped() -> Result<(), AppError> {
        let store = store();
        let settings = RoiSettings {
            max_points: 5,
            ..RoiSettings::default()
        };
        let mut estimator = RoiEstimator::new(store.clone(), settings);
        for cycle in 0..4 {
            let at = NOW - Duration::hours(10 - cycle);
            let offset = (cycle as i32) * 40;
            observe(
                &store,
                at,
                &[(offset, 0), (offset + 200, 30), (offset + 10, 300)],
            )?;
            estimator.update_camera(1, NOW)?;
            let active = store.active_roi(1)?.ok_or(AppError::CameraNotFound(1))?;
            assert!(active.data.points().len() <= 5);
        }
        Ok(())
    }

    #[test]
    fn run_cycle_skips_unmonitored_cameras() -> Result<(), AppError> {
        let store = store();
        store.upsert_camera(Camera {
            camera_id: 2,
            name: "dock".to_string(),
            source_url: "rtsp://example.invalid/dock".to_string(),
            status: CameraStatus::Inactive,
            is_active_monitoring: false,
        })?;
        let mut estimator = RoiEstimator::new(store.clone(), RoiSettings::default());

        let report = estimator.run_cycle(NOW)?;

        assert_eq!(report.total, 1);
        assert_eq!(report.succeeded, 1);
        Ok(())
    }

    #[derive(Default)]
    struct RecordingOverlay {
        boundaries: Mutex<Vec<Option<usize>>>,
    }

    impl OverlaySink for RecordingOverlay {
        fn render(&self, frame: &OverlayFrame<'_>) -> std::io::Result<PathBuf> {
            self.boundaries
                .lock()
                .map_err(|_| std::io::Error::other("overlay lock poisoned"))?
                .push(frame.boundary.map(<[Point]>::len));
            Ok(PathBuf::from("overlay.svg"))
        }
    }

    #[test]
    fn overlay_marks_failed_refit_even_with_older_boundary() -> Result<(), AppError> {
        let store = store();
        store.replace_active_roi(
            1,
            RoiData::DynamicAlphaShapeSliding {
                coordinates: vec![
                    Point::new(0.0, 0.0),
                    Point::new(100.0, 0.0),
                    Point::new(100.0, 100.0),
                    Point::new(0.0, 100.0),
                ],
                area: 10_000.0,
                points: Vec::new(),
                alpha: Some(0.01),
                last_processed_timestamp: Some(NOW - Duration::hours(5)),
            },
        )?;
        observe(&store, NOW - Duration::hours(1), &[(300, 300), (400, 300)])?;
        let overlay = Arc::new(RecordingOverlay::default());
        let mut estimator =
            RoiEstimator::new(store.clone(), RoiSettings::default()).with_overlay(overlay.clone());

        let outcome = estimator.update_camera(1, NOW)?;

        assert!(matches!(outcome, RoiUpdateOutcome::PointsOnly { points: 2, .. }));
        let active = store.active_roi(1)?.ok_or(AppError::CameraNotFound(1))?;
        assert_eq!(active.data.area(), 10_000.0);
        let drawn = overlay.boundaries.lock().expect("overlay lock").clone();
        assert_eq!(drawn, vec![None]);
        Ok(())
    }

    #[test]
    fn overlay_draws_fresh_boundary() -> Result<(), AppError> {
        let store = store();
        observe(&store, NOW - Duration::hours(1), &[(0, 0), (100, 0), (0, 100)])?;
        let overlay = Arc::new(RecordingOverlay::default());
        let mut estimator =
            RoiEstimator::new(store.clone(), RoiSettings::default()).with_overlay(overlay.clone());

        estimator.update_camera(1, NOW)?;

        let drawn = overlay.boundaries.lock().expect("overlay lock").clone();
        assert_eq!(drawn, vec![Some(3)]);
        Ok(())
    }

    /// Delegates to a memory store but cannot read one camera's ROI.
    struct UnreadableRoiStore {
        inner: Arc<MemoryStore>,
        broken: CameraId,
    }

    impl Store for UnreadableRoiStore {
        fn cameras(&self) -> Result<Vec<Camera>, StoreError> {
            self.inner.cameras()
        }

        fn camera(&self, camera_id: CameraId) -> Result<Option<Camera>, StoreError> {
            self.inner.camera(camera_id)
        }

        fn create_snapshot(
            &self,
            camera_id: CameraId,
            captured_at: OffsetDateTime,
            image_path: PathBuf,
        ) -> Result<Snapshot, StoreError> {
            self.inner.create_snapshot(camera_id, captured_at, image_path)
        }

        fn snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<Snapshot>, StoreError> {
            self.inner.snapshot(snapshot_id)
        }

        fn update_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
            self.inner.update_snapshot(snapshot)
        }

        fn replace_detections(
            &self,
            snapshot_id: SnapshotId,
            detections: &[NewDetection],
        ) -> Result<Vec<DetectedObject>, StoreError> {
            self.inner.replace_detections(snapshot_id, detections)
        }

        fn detections_for_snapshot(
            &self,
            snapshot_id: SnapshotId,
        ) -> Result<Vec<DetectedObject>, StoreError> {
            self.inner.detections_for_snapshot(snapshot_id)
        }

        fn detections_since(
            &self,
            camera_id: CameraId,
            after: OffsetDateTime,
        ) -> Result<Vec<TimedDetection>, StoreError> {
            self.inner.detections_since(camera_id, after)
        }

        fn active_roi(&self, camera_id: CameraId) -> Result<Option<RoiDefinition>, StoreError> {
            if camera_id == self.broken {
                return Err(StoreError::Unavailable("roi table offline".to_string()));
            }
            self.inner.active_roi(camera_id)
        }

        fn replace_active_roi(
            &self,
            camera_id: CameraId,
            data: RoiData,
        ) -> Result<RoiDefinition, StoreError> {
            self.inner.replace_active_roi(camera_id, data)
        }

        fn refresh_active_roi(
            &self,
            camera_id: CameraId,
            data: RoiData,
        ) -> Result<RoiDefinition, StoreError> {
            self.inner.refresh_active_roi(camera_id, data)
        }

        fn record_congestion(
            &self,
            event: NewCongestionEvent,
        ) -> Result<Option<CongestionEvent>, StoreError> {
            self.inner.record_congestion(event)
        }

        fn congestion_events(
            &self,
            camera_id: CameraId,
        ) -> Result<Vec<CongestionEvent>, StoreError> {
            self.inner.congestion_events(camera_id)
        }

        fn acknowledge_event(
            &self,
            event_id: EventId,
            at: OffsetDateTime,
        ) -> Result<CongestionEvent, StoreError> {
            self.inner.acknowledge_event(event_id, at)
        }
    }

    #[test]
    fn failing_camera_does_not_stop_the_cycle() -> Result<(), AppError> {
        let inner = store();
        inner.upsert_camera(Camera {
            camera_id: 2,
            name: "platform".to_string(),
            source_url: "rtsp://example.invalid/platform".to_string(),
            status: CameraStatus::Active,
            is_active_monitoring: true,
        })?;
        let triangle = [(0, 0), (100, 0), (30, 100)];
        observe_on(&inner, 1, NOW - Duration::hours(1), &triangle)?;
        observe_on(&inner, 2, NOW - Duration::hours(1), &triangle)?;
        let store = Arc::new(UnreadableRoiStore {
            inner: inner.clone(),
            broken: 1,
        });
        let mut estimator = RoiEstimator::new(store, RoiSettings::default());

        let report = estimator.run_cycle(NOW)?;

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(inner.active_roi(1)?.is_none());
        let healthy = inner.active_roi(2)?.ok_or(AppError::CameraNotFound(2))?;
        assert!(healthy.data.has_boundary());
        Ok(())
    }
}
