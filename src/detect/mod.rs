//! Windowed z-score anomaly detection.

pub mod detector;
pub mod window;

pub use detector::{Observation, Phase, WindowedAnomalyDetector};
pub use window::{SampleWindow, Stats, Status};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Severity levels for flagged samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Grade an anomaly by how far it sits from the baseline.
    pub fn from_z_score(z_score: f64) -> Self {
        if z_score > 6.0 {
            Severity::Critical
        } else if z_score > 4.5 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// A sample that deviated from its window baseline by more than the threshold.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Anomaly {
    pub value: f64,
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
    pub z_score: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub detected_at: chrono::DateTime<chrono::Utc>,
}
