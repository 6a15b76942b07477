use crate::detector::{DetectionReport, Detector, DetectorError};
use crate::model::NewDetection;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A person box with its center filled in.
pub fn person(x: i32, y: i32, width: i32, height: i32, confidence: f64) -> NewDetection {
    NewDetection {
        label: "person".to_string(),
        confidence,
        bbox_x: x,
        bbox_y: y,
        bbox_width: width,
        bbox_height: height,
        center_x: Some(x + width / 2),
        center_y: Some(y + height / 2),
    }
}

#[derive(Debug, Clone)]
pub struct MockDetectorBehavior {
    pub detect_ok: bool,
    pub detections: Vec<NewDetection>,
    pub annotated_image: Option<PathBuf>,
}

impl MockDetectorBehavior {
    pub fn ok(detections: Vec<NewDetection>) -> Self {
        Self {
            detect_ok: true,
            detections,
            annotated_image: None,
        }
    }

    pub fn annotated(detections: Vec<NewDetection>, annotated_image: impl Into<PathBuf>) -> Self {
        Self {
            detect_ok: true,
            detections,
            annotated_image: Some(annotated_image.into()),
        }
    }

    pub fn fail() -> Self {
        Self {
            detect_ok: false,
            detections: Vec::new(),
            annotated_image: None,
        }
    }
}

/// Replays one behavior per call, then repeats the last one.
#[derive(Debug)]
pub struct MockDetector {
    behaviors: Mutex<VecDeque<MockDetectorBehavior>>,
    last: Mutex<MockDetectorBehavior>,
    calls: AtomicUsize,
}

impl MockDetector {
    pub fn new(behaviors: Vec<MockDetectorBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors.into()),
            last: Mutex::new(MockDetectorBehavior::ok(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> Result<MockDetectorBehavior, DetectorError> {
        let mut queue = self.behaviors.lock().map_err(|_| DetectorError::Lock)?;
        let mut last = self.last.lock().map_err(|_| DetectorError::Lock)?;
        if let Some(behavior) = queue.pop_front() {
            *last = behavior;
        }
        Ok(last.clone())
    }
}

impl Detector for MockDetector {
    fn detect(&self, image: &Path) -> Result<DetectionReport, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.next_behavior()?;
        if !behavior.detect_ok {
            return Err(DetectorError::Request(format!(
                "mock detection failed for {}",
                image.display()
            )));
        }
        Ok(DetectionReport {
            detections: behavior.detections,
            annotated_image: behavior.annotated_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_behaviors_then_repeats_last() -> Result<(), DetectorError> {
        let detector = MockDetector::new(vec![
            MockDetectorBehavior::fail(),
            MockDetectorBehavior::ok(vec![person(0, 0, 10, 10, 0.9)]),
        ]);
        let image = Path::new("frame.jpg");

        assert!(detector.detect(image).is_err());
        assert_eq!(detector.detect(image)?.detections.len(), 1);
        assert_eq!(detector.detect(image)?.detections.len(), 1);
        assert_eq!(detector.calls(), 3);
        Ok(())
    }
}
