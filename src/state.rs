use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

/// Aggregate result of one pass over all cameras.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn record(&mut self, succeeded: bool) {
        self.total += 1;
        if succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStatus {
    pub report: CycleReport,
    pub finished_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct AppState {
    detector_enabled: bool,
    roi_enabled: bool,
    capture: Option<CycleStatus>,
    capture_tx: watch::Sender<Option<CycleStatus>>,
    roi: Option<CycleStatus>,
    roi_tx: watch::Sender<Option<CycleStatus>>,
    queue_depth: usize,
}

impl AppState {
    pub fn new(detector_enabled: bool, roi_enabled: bool) -> Self {
        let (capture_tx, _capture_rx) = watch::channel(None);
        let (roi_tx, _roi_rx) = watch::channel(None);
        Self {
            detector_enabled,
            roi_enabled,
            capture: None,
            capture_tx,
            roi: None,
            roi_tx,
            queue_depth: 0,
        }
    }

    pub fn detector_enabled(&self) -> bool {
        self.detector_enabled
    }

    pub fn roi_enabled(&self) -> bool {
        self.roi_enabled
    }

    pub fn capture_cycle(&self) -> Option<&CycleStatus> {
        self.capture.as_ref()
    }

    pub fn subscribe_capture_cycles(&self) -> watch::Receiver<Option<CycleStatus>> {
        self.capture_tx.subscribe()
    }

    pub fn set_capture_cycle(&mut self, status: CycleStatus) {
        self.capture = Some(status);
        self.capture_tx.send_replace(Some(status));
    }

    pub fn roi_cycle(&self) -> Option<&CycleStatus> {
        self.roi.as_ref()
    }

    pub fn subscribe_roi_cycles(&self) -> watch::Receiver<Option<CycleStatus>> {
        self.roi_tx.subscribe()
    }

    pub fn set_roi_cycle(&mut self, status: CycleStatus) {
        self.roi = Some(status);
        self.roi_tx.send_replace(Some(status));
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn set_queue_depth(&mut self, depth: usize) {
        self.queue_depth = depth;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(true, true)
    }
}
