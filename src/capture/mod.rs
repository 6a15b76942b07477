use crate::error::AppError;
use crate::model::{Camera, CameraId, Snapshot};
use crate::pipeline::queue::{Job, TaskQueue, submit};
use crate::state::CycleReport;
use crate::store::Store;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub mod ffmpeg;
pub mod mock;

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_MIN_IMAGE_BYTES: u64 = 1000;
pub const DEFAULT_OUTPUT_DIR: &str = "captured";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("frame too small ({bytes} bytes, need {min})")]
    TooSmall { bytes: u64, min: u64 },
    #[error("grabber failed: {0}")]
    Failed(String),
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timestamp error: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<String>,
}

/// Source of single still frames.
pub trait FrameGrabber: Send + Sync + 'static {
    /// Writes one frame from `source_url` to `output`.
    fn grab(
        &self,
        source_url: &str,
        output: &Path,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Checks that `source_url` serves a video stream.
    fn probe(&self, source_url: &str)
    -> impl Future<Output = Result<StreamInfo, CaptureError>> + Send;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub output_dir: PathBuf,
    pub timeout: Duration,
    pub max_workers: usize,
    pub min_image_bytes: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
            min_image_bytes: DEFAULT_MIN_IMAGE_BYTES,
        }
    }
}

/// `<output_dir>/<camera_id>/snap_<yymmddHHMMSS>.jpg`
pub fn snapshot_path(
    output_dir: &Path,
    camera_id: CameraId,
    captured_at: OffsetDateTime,
) -> Result<PathBuf, CaptureError> {
    let stamp = captured_at.format(format_description!(
        "[year repr:last_two][month][day][hour][minute][second]"
    ))?;
    Ok(output_dir
        .join(camera_id.to_string())
        .join(format!("snap_{stamp}.jpg")))
}

/// Grabs one frame per capturable camera, records a snapshot for each good
/// frame and queues its analysis.
pub async fn capture_all_active_cameras<G: FrameGrabber>(
    grabber: Arc<G>,
    store: Arc<dyn Store>,
    queue: Arc<dyn TaskQueue>,
    settings: &CaptureSettings,
) -> Result<CycleReport, AppError> {
    let cameras: Vec<Camera> = store
        .cameras()?
        .into_iter()
        .filter(Camera::is_capturable)
        .collect();
    let mut report = CycleReport::default();
    if cameras.is_empty() {
        debug!("No cameras to capture");
        return Ok(report);
    }

    let workers = cameras.len().min(settings.max_workers).max(1);
    let permits = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    for camera in cameras {
        let grabber = Arc::clone(&grabber);
        let store = Arc::clone(&store);
        let queue = Arc::clone(&queue);
        let permits = Arc::clone(&permits);
        let settings = settings.clone();
        tasks.spawn(async move {
            let camera_id = camera.camera_id;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        camera_id,
                        Err(AppError::Capture(CaptureError::Failed(
                            "worker pool closed".to_string(),
                        ))),
                    );
                }
            };
            let result = capture_camera(
                grabber.as_ref(),
                store.as_ref(),
                queue.as_ref(),
                &camera,
                &settings,
            )
            .await;
            (camera_id, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((camera_id, Ok(snapshot))) => {
                debug!(
                    camera_id,
                    snapshot_id = snapshot.snapshot_id,
                    path = %snapshot.image_path.display(),
                    "Frame captured"
                );
                report.record(true);
            }
            Ok((camera_id, Err(err))) => {
                warn!(camera_id, error = %err, "Capture failed");
                report.record(false);
            }
            Err(err) => {
                warn!(error = %err, "Capture task aborted");
                report.record(false);
            }
        }
    }

    info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        workers,
        "Capture cycle finished"
    );
    Ok(report)
}

async fn capture_camera<G: FrameGrabber>(
    grabber: &G,
    store: &dyn Store,
    queue: &dyn TaskQueue,
    camera: &Camera,
    settings: &CaptureSettings,
) -> Result<Snapshot, AppError> {
    let captured_at = OffsetDateTime::now_utc();
    let path = snapshot_path(&settings.output_dir, camera.camera_id, captured_at)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(CaptureError::Io)?;
    }

    let grabbed = match tokio::time::timeout(
        settings.timeout,
        grabber.grab(&camera.source_url, &path),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(CaptureError::Timeout(settings.timeout)),
    };
    let checked = match grabbed {
        Ok(()) => check_size(&path, settings.min_image_bytes).await,
        Err(err) => Err(err),
    };
    if let Err(err) = checked {
        discard(&path).await;
        return Err(err.into());
    }

    let snapshot = store.create_snapshot(camera.camera_id, captured_at, path)?;
    submit(
        queue,
        Job::AnalyzeSnapshot {
            snapshot_id: snapshot.snapshot_id,
        },
        camera.camera_id,
    )?;
    Ok(snapshot)
}

async fn check_size(path: &Path, min_bytes: u64) -> Result<(), CaptureError> {
    let bytes = tokio::fs::metadata(path).await?.len();
    if bytes < min_bytes {
        return Err(CaptureError::TooSmall {
            bytes,
            min: min_bytes,
        });
    }
    Ok(())
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial frame"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "Failed to remove partial frame"),
    }
}

/// Probes every capturable camera once and logs which are reachable.
pub async fn probe_cameras<G: FrameGrabber>(
    grabber: &G,
    store: &dyn Store,
) -> Result<CycleReport, AppError> {
    let mut report = CycleReport::default();
    for camera in store.cameras()?.into_iter().filter(Camera::is_capturable) {
        match grabber.probe(&camera.source_url).await {
            Ok(info) => {
                info!(
                    camera_id = camera.camera_id,
                    codec = %info.codec_name,
                    width = info.width,
                    height = info.height,
                    "Camera reachable"
                );
                report.record(true);
            }
            Err(err) => {
                warn!(camera_id = camera.camera_id, error = %err, "Camera unreachable");
                report.record(false);
            }
        }
    }
    Ok(report)
}
