use serde::{Deserialize, Serialize};

pub const DEFAULT_LOW_THRESHOLD: f64 = 0.1;
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.35;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl CongestionLevel {
    pub fn is_alert(self) -> bool {
        matches!(self, Self::High | Self::VeryHigh)
    }
}

/// Upper bounds (exclusive) of LOW, MEDIUM and HIGH; anything above is VERY_HIGH.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl CongestionThresholds {
    pub fn is_ascending(&self) -> bool {
        self.low < self.medium && self.medium < self.high
    }
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_THRESHOLD,
            medium: DEFAULT_MEDIUM_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

pub fn determine_congestion_level(value: f64, thresholds: &CongestionThresholds) -> CongestionLevel {
    if value < thresholds.low {
        CongestionLevel::Low
    } else if value < thresholds.medium {
        CongestionLevel::Medium
    } else if value < thresholds.high {
        CongestionLevel::High
    } else {
        CongestionLevel::VeryHigh
    }
}
