use crate::capture::{CaptureError, FrameGrabber, StreamInfo};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockGrabberBehavior {
    pub grab_ok: bool,
    /// Bytes written to the output file, also on failure.
    pub bytes: usize,
    pub hang: bool,
    pub reachable: bool,
}

impl MockGrabberBehavior {
    pub fn frame(bytes: usize) -> Self {
        Self {
            grab_ok: true,
            bytes,
            hang: false,
            reachable: true,
        }
    }

    /// Leaves a truncated file behind and reports failure.
    pub fn fail() -> Self {
        Self {
            grab_ok: false,
            bytes: 64,
            hang: false,
            reachable: true,
        }
    }

    /// Writes a partial file and never finishes.
    pub fn hang() -> Self {
        Self {
            grab_ok: true,
            bytes: 64,
            hang: true,
            reachable: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            grab_ok: false,
            bytes: 0,
            hang: false,
            reachable: false,
        }
    }
}

/// Grabber answering per source URL, with a fallback for unknown URLs.
#[derive(Debug)]
pub struct MockGrabber {
    fallback: MockGrabberBehavior,
    by_source: HashMap<String, MockGrabberBehavior>,
    grabs: AtomicUsize,
}

impl MockGrabber {
    pub fn new(fallback: MockGrabberBehavior) -> Self {
        Self {
            fallback,
            by_source: HashMap::new(),
            grabs: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, source_url: &str, behavior: MockGrabberBehavior) -> Self {
        self.by_source.insert(source_url.to_string(), behavior);
        self
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    fn behavior(&self, source_url: &str) -> &MockGrabberBehavior {
        self.by_source.get(source_url).unwrap_or(&self.fallback)
    }
}

impl FrameGrabber for MockGrabber {
    async fn grab(&self, source_url: &str, output: &Path) -> Result<(), CaptureError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior(source_url).clone();
        if behavior.bytes > 0 {
            tokio::fs::write(output, vec![0xFF; behavior.bytes]).await?;
        }
        if behavior.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !behavior.grab_ok {
            return Err(CaptureError::Failed(format!("mock grab failed for {source_url}")));
        }
        Ok(())
    }

    async fn probe(&self, source_url: &str) -> Result<StreamInfo, CaptureError> {
        if !self.behavior(source_url).reachable {
            return Err(CaptureError::Probe(format!("{source_url} unreachable")));
        }
        Ok(StreamInfo {
            codec_name: "h264".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: Some("25/1".to_string()),
        })
    }
}
