use crate::congestion::{CongestionScorer, ScoreOutcome};
use crate::detector::{DetectionFilter, DetectionReport, DetectorError, DetectorHandle};
use crate::error::AppError;
use crate::model::{NewDetection, ProcessingStatus, Snapshot, SnapshotId};
use crate::state::AppState;
use crate::store::Store;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

pub mod queue;
pub mod transitions;

use queue::{Job, LocalTaskQueue, TaskQueue, WorkItem, submit};
use transitions::{StageEvent, Track, transition};

const WORKER_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome {
    Completed { detections: usize },
    AlreadyCompleted,
    /// The detector call failed and the AI stage was marked FAILED.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ai(AiOutcome),
    Congestion(ScoreOutcome),
}

/// Runs the per-snapshot stages and chains them through the task queue.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    detector: Arc<DetectorHandle>,
    filter: DetectionFilter,
    scorer: CongestionScorer,
    queue: Arc<dyn TaskQueue>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        detector: Arc<DetectorHandle>,
        filter: DetectionFilter,
        scorer: CongestionScorer,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            store,
            detector,
            filter,
            scorer,
            queue,
        }
    }

    pub fn run_ai_stage(&self, snapshot_id: SnapshotId) -> Result<AiOutcome, AppError> {
        let mut snapshot = self
            .store
            .snapshot(snapshot_id)?
            .ok_or(AppError::SnapshotNotFound(snapshot_id))?;

        match snapshot.ai_status {
            ProcessingStatus::Completed => {
                // Scoring may never have been queued if the enqueue failed.
                if snapshot.congestion_status == ProcessingStatus::Pending {
                    info!(snapshot_id, "AI stage already completed, queueing scoring again");
                    self.enqueue_scoring(&snapshot)?;
                } else {
                    debug!(snapshot_id, "AI stage already completed");
                }
                return Ok(AiOutcome::AlreadyCompleted);
            }
            ProcessingStatus::Processing => {
                warn!(snapshot_id, "AI stage found in progress, running it again");
            }
            _ => {}
        }

        snapshot.ai_status = transition(Track::Ai, snapshot.ai_status, StageEvent::Start)?;
        self.store.update_snapshot(&snapshot)?;

        let report = match self.detect(&snapshot) {
            Ok(report) => report,
            Err(err) => {
                let reason = err.to_string();
                snapshot.ai_status = transition(Track::Ai, snapshot.ai_status, StageEvent::Fail)?;
                self.store.update_snapshot(&snapshot)?;
                warn!(snapshot_id, error = %reason, "AI stage failed");
                return Ok(AiOutcome::Failed { reason });
            }
        };

        let kept = self.filter.apply(report.detections);
        let detections = kept.len();
        if let Err(err) = self.complete(&mut snapshot, &kept, report.annotated_image) {
            self.mark_failed(snapshot_id);
            return Err(err);
        }
        info!(
            camera_id = snapshot.camera_id,
            snapshot_id, detections, "AI stage completed"
        );

        self.enqueue_scoring(&snapshot)?;
        Ok(AiOutcome::Completed { detections })
    }

    fn enqueue_scoring(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        submit(
            self.queue.as_ref(),
            Job::ScoreCongestion {
                snapshot_id: snapshot.snapshot_id,
            },
            snapshot.camera_id,
        )
    }

    pub fn run_congestion_stage(&self, snapshot_id: SnapshotId) -> Result<ScoreOutcome, AppError> {
        self.scorer.score_snapshot(snapshot_id)
    }

    pub fn dispatch(&self, item: &WorkItem) -> Result<StageOutcome, AppError> {
        match Job::from_work_item(item)? {
            Job::AnalyzeSnapshot { snapshot_id } => {
                self.run_ai_stage(snapshot_id).map(StageOutcome::Ai)
            }
            Job::ScoreCongestion { snapshot_id } => self
                .run_congestion_stage(snapshot_id)
                .map(StageOutcome::Congestion),
        }
    }

    fn detect(&self, snapshot: &Snapshot) -> Result<DetectionReport, DetectorError> {
        self.detector.get()?.detect(&snapshot.image_path)
    }

    fn complete(
        &self,
        snapshot: &mut Snapshot,
        detections: &[NewDetection],
        annotated_image: Option<PathBuf>,
    ) -> Result<(), AppError> {
        self.store
            .replace_detections(snapshot.snapshot_id, detections)?;
        snapshot.processed_image_path = annotated_image;
        snapshot.analyzed_at = Some(OffsetDateTime::now_utc());
        snapshot.ai_status = transition(Track::Ai, snapshot.ai_status, StageEvent::Succeed)?;
        self.store.update_snapshot(snapshot)?;
        Ok(())
    }

    /// Best effort: a store that just failed may fail again.
    fn mark_failed(&self, snapshot_id: SnapshotId) {
        let result = self.store.snapshot(snapshot_id).and_then(|snapshot| match snapshot {
            Some(mut snapshot) if snapshot.ai_status == ProcessingStatus::Processing => {
                snapshot.ai_status = ProcessingStatus::Failed;
                self.store.update_snapshot(&snapshot)
            }
            _ => Ok(()),
        });
        if let Err(err) = result {
            error!(snapshot_id, error = %err, "Could not mark AI stage failed");
        }
    }
}

/// Drains `queue` on a dedicated thread until `stop` is raised.
pub fn spawn_worker(
    orchestrator: Arc<Orchestrator>,
    queue: Arc<LocalTaskQueue>,
    state: Arc<RwLock<AppState>>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match queue.pop_timeout(WORKER_POLL) {
                Ok(Some(item)) => match orchestrator.dispatch(&item) {
                    Ok(outcome) => debug!(job = %item.name, outcome = ?outcome, "Unit of work done"),
                    Err(err) => warn!(
                        job = %item.name,
                        group = %item.group_key,
                        error = %err,
                        "Unit of work failed"
                    ),
                },
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "Task queue unusable, stopping worker");
                    break;
                }
            }

            let depth = queue.depth().unwrap_or(0);
            match state.write() {
                Ok(mut guard) => guard.set_queue_depth(depth),
                Err(_) => warn!("State lock poisoned while recording queue depth"),
            }
        }
    })
}
