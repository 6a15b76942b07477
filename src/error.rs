use crate::capture::CaptureError;
use crate::detector::DetectorError;
use crate::pipeline::queue::QueueError;
use crate::pipeline::transitions::TransitionError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("task queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("invalid stage transition: {0}")]
    Transition(#[from] TransitionError),
    #[error("snapshot {0} not found")]
    SnapshotNotFound(u64),
    #[error("camera {0} not found")]
    CameraNotFound(u32),
    #[error("invalid job payload: {0}")]
    Job(#[from] serde_json::Error),
    #[error("unknown unit of work: {0}")]
    UnknownJob(String),
}
