use crate::capture::{
    CaptureSettings, DEFAULT_CAPTURE_TIMEOUT, DEFAULT_MAX_WORKERS, DEFAULT_MIN_IMAGE_BYTES,
    DEFAULT_OUTPUT_DIR, DEFAULT_PROBE_TIMEOUT,
};
use crate::congestion::level::{
    CongestionThresholds, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD, DEFAULT_MEDIUM_THRESHOLD,
};
use crate::congestion::{DEFAULT_R_RATIO, ScoringSettings};
use crate::detector::{DEFAULT_MIN_CONFIDENCE, DEFAULT_TRACKED_CLASS, DetectionFilter};
use crate::model::{Camera, CameraId, CameraStatus};
use crate::roi::cache::DEFAULT_ALPHA_CACHE_CAPACITY;
use crate::roi::window::DEFAULT_MAX_POINTS;
use crate::roi::{
    DEFAULT_INITIAL_BACKFILL_DAYS, DEFAULT_MIN_POINTS, DEFAULT_OPTIMIZE_SAMPLE_SIZE,
    DEFAULT_OPTIMIZE_SAMPLE_THRESHOLD, RoiSettings,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_CAPTURE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ROI_REFRESH_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub capture: Option<CaptureSection>,
    #[serde(default)]
    pub detector: Option<DetectorSection>,
    #[serde(default)]
    pub roi: Option<RoiSection>,
    #[serde(default)]
    pub congestion: Option<CongestionSection>,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CaptureSection {
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
    pub max_workers: Option<usize>,
    pub min_image_bytes: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DetectorSection {
    /// HTTP endpoint of the detection service. Detection is disabled without it.
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub tracked_class: Option<String>,
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoiSection {
    pub enabled: Option<bool>,
    pub refresh_interval_secs: Option<u64>,
    pub max_points: Option<usize>,
    pub min_points: Option<usize>,
    pub initial_backfill_days: Option<i64>,
    pub alpha_cache_capacity: Option<usize>,
    pub optimize_sample_threshold: Option<usize>,
    pub optimize_sample_size: Option<usize>,
    /// Directory for per-cycle SVG overlays; none are written when unset.
    pub overlay_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CongestionSection {
    pub r_ratio: Option<f64>,
    pub low_threshold: Option<f64>,
    pub medium_threshold: Option<f64>,
    pub high_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraEntry {
    pub id: CameraId,
    pub name: String,
    pub source_url: String,
    #[serde(default = "default_camera_status")]
    pub status: CameraStatus,
    #[serde(default = "default_monitoring")]
    pub monitoring: bool,
}

fn default_camera_status() -> CameraStatus {
    CameraStatus::Active
}

fn default_monitoring() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = self.thresholds();
        if !thresholds.is_ascending() {
            return Err(ConfigError::Invalid(format!(
                "congestion thresholds must be strictly ascending, got {} / {} / {}",
                thresholds.low, thresholds.medium, thresholds.high
            )));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(entry) = self.cameras.iter().find(|entry| !seen.insert(entry.id)) {
            return Err(ConfigError::Invalid(format!(
                "camera id {} is listed twice",
                entry.id
            )));
        }
        Ok(())
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn cameras(&self) -> Vec<Camera> {
        self.cameras
            .iter()
            .map(|entry| Camera {
                camera_id: entry.id,
                name: entry.name.clone(),
                source_url: entry.source_url.clone(),
                status: entry.status,
                is_active_monitoring: entry.monitoring,
            })
            .collect()
    }

    fn capture_section(&self) -> CaptureSection {
        self.capture.clone().unwrap_or_default()
    }

    pub fn capture_interval(&self) -> Duration {
        let secs = self
            .capture
            .as_ref()
            .and_then(|c| c.interval_secs)
            .unwrap_or(DEFAULT_CAPTURE_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        let section = self.capture_section();
        CaptureSettings {
            output_dir: section
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            timeout: section
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CAPTURE_TIMEOUT),
            max_workers: section.max_workers.unwrap_or(DEFAULT_MAX_WORKERS).max(1),
            min_image_bytes: section.min_image_bytes.unwrap_or(DEFAULT_MIN_IMAGE_BYTES),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        self.capture
            .as_ref()
            .and_then(|c| c.probe_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn ffmpeg_path(&self) -> PathBuf {
        self.capture_section()
            .ffmpeg_path
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub fn ffprobe_path(&self) -> PathBuf {
        self.capture_section()
            .ffprobe_path
            .unwrap_or_else(|| PathBuf::from("ffprobe"))
    }

    /// Detector endpoint, or `None` when detection is disabled.
    pub fn detector_endpoint(&self) -> Option<&str> {
        let endpoint = self.detector.as_ref()?.endpoint.as_deref()?.trim();
        if endpoint.is_empty() {
            None
        } else {
            Some(endpoint)
        }
    }

    pub fn detector_timeout(&self) -> Duration {
        let millis = self
            .detector
            .as_ref()
            .and_then(|d| d.timeout_ms)
            .unwrap_or(DEFAULT_DETECTOR_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    pub fn tracked_class(&self) -> String {
        self.detector
            .as_ref()
            .and_then(|d| d.tracked_class.clone())
            .unwrap_or_else(|| DEFAULT_TRACKED_CLASS.to_string())
    }

    pub fn detection_filter(&self) -> DetectionFilter {
        DetectionFilter {
            tracked_class: self.tracked_class(),
            min_confidence: self
                .detector
                .as_ref()
                .and_then(|d| d.min_confidence)
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
        }
    }

    pub fn roi_enabled(&self) -> bool {
        self.roi.as_ref().and_then(|r| r.enabled).unwrap_or(true)
    }

    pub fn roi_refresh_interval(&self) -> Duration {
        let secs = self
            .roi
            .as_ref()
            .and_then(|r| r.refresh_interval_secs)
            .unwrap_or(DEFAULT_ROI_REFRESH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn overlay_dir(&self) -> Option<&Path> {
        let dir = self.roi.as_ref()?.overlay_dir.as_deref()?;
        if dir.as_os_str().is_empty() {
            None
        } else {
            Some(dir)
        }
    }

    pub fn roi_settings(&self) -> RoiSettings {
        let section = self.roi.clone().unwrap_or_default();
        RoiSettings {
            max_points: section.max_points.unwrap_or(DEFAULT_MAX_POINTS),
            min_points: section.min_points.unwrap_or(DEFAULT_MIN_POINTS).max(3),
            initial_backfill: time::Duration::days(
                section
                    .initial_backfill_days
                    .unwrap_or(DEFAULT_INITIAL_BACKFILL_DAYS),
            ),
            optimize_sample_threshold: section
                .optimize_sample_threshold
                .unwrap_or(DEFAULT_OPTIMIZE_SAMPLE_THRESHOLD),
            optimize_sample_size: section
                .optimize_sample_size
                .unwrap_or(DEFAULT_OPTIMIZE_SAMPLE_SIZE),
            alpha_cache_capacity: section
                .alpha_cache_capacity
                .unwrap_or(DEFAULT_ALPHA_CACHE_CAPACITY),
            tracked_class: self.tracked_class(),
        }
    }

    fn thresholds(&self) -> CongestionThresholds {
        let section = self.congestion.clone().unwrap_or_default();
        CongestionThresholds {
            low: section.low_threshold.unwrap_or(DEFAULT_LOW_THRESHOLD),
            medium: section.medium_threshold.unwrap_or(DEFAULT_MEDIUM_THRESHOLD),
            high: section.high_threshold.unwrap_or(DEFAULT_HIGH_THRESHOLD),
        }
    }

    pub fn scoring_settings(&self) -> ScoringSettings {
        ScoringSettings {
            r_ratio: self
                .congestion
                .as_ref()
                .and_then(|c| c.r_ratio)
                .unwrap_or(DEFAULT_R_RATIO),
            thresholds: self.thresholds(),
            tracked_class: self.tracked_class(),
        }
    }
}
