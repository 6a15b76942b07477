use crate::model::NewDetection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub mod mock;
pub mod remote;

pub const DEFAULT_TRACKED_CLASS: &str = "person";
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector not configured")]
    NotConfigured,
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("detection request failed: {0}")]
    Request(String),
    #[error("invalid detector response: {0}")]
    InvalidResponse(String),
    #[error("detector handle lock poisoned")]
    Lock,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    pub detections: Vec<NewDetection>,
    /// Copy of the input with boxes drawn on it, when the detector made one.
    pub annotated_image: Option<PathBuf>,
}

pub trait Detector: Send + Sync {
    fn detect(&self, image: &Path) -> Result<DetectionReport, DetectorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    pub tracked_class: String,
    pub min_confidence: f64,
}

impl DetectionFilter {
    pub fn keeps(&self, detection: &NewDetection) -> bool {
        detection.label == self.tracked_class && detection.confidence >= self.min_confidence
    }

    pub fn apply(&self, detections: Vec<NewDetection>) -> Vec<NewDetection> {
        detections
            .into_iter()
            .filter(|detection| self.keeps(detection))
            .collect()
    }
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            tracked_class: DEFAULT_TRACKED_CLASS.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

type DetectorInit = Box<dyn Fn() -> Result<Arc<dyn Detector>, DetectorError> + Send + Sync>;

/// Lazily constructed, shared detector.
///
/// The first caller runs `init`; later callers get the same instance. A
/// failed initialisation is not remembered, so the next call tries again.
pub struct DetectorHandle {
    init: DetectorInit,
    slot: Mutex<Option<Arc<dyn Detector>>>,
}

impl DetectorHandle {
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Detector>, DetectorError> + Send + Sync + 'static,
    {
        Self {
            init: Box::new(init),
            slot: Mutex::new(None),
        }
    }

    pub fn ready(detector: Arc<dyn Detector>) -> Self {
        let handle = Self::new(|| Err(DetectorError::NotConfigured));
        if let Ok(mut slot) = handle.slot.lock() {
            *slot = Some(detector);
        }
        handle
    }

    /// Handle whose every call fails; used when no detector is configured.
    pub fn disabled() -> Self {
        Self::new(|| Err(DetectorError::NotConfigured))
    }

    pub fn get(&self) -> Result<Arc<dyn Detector>, DetectorError> {
        let mut slot = self.slot.lock().map_err(|_| DetectorError::Lock)?;
        if let Some(detector) = slot.as_ref() {
            return Ok(Arc::clone(detector));
        }
        let detector = (self.init)()?;
        *slot = Some(Arc::clone(&detector));
        Ok(detector)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorHandle")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
