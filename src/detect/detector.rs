//! Thread-safe windowed anomaly detector.
//!
//! [`WindowedAnomalyDetector`] keeps the most recent `window_size` samples of
//! one metric and flags a new sample when its z-score against that window
//! exceeds the configured threshold. The window sits behind a
//! `std::sync::RwLock`: [`add`](WindowedAnomalyDetector::add),
//! [`observe`](WindowedAnomalyDetector::observe) and
//! [`reset`](WindowedAnomalyDetector::reset) take the write lock, while
//! [`stats`](WindowedAnomalyDetector::stats) and
//! [`status`](WindowedAnomalyDetector::status) share the read lock.
//!
//! Non-finite samples are accepted but poison the baseline: NaN never
//! compares greater than the threshold, so detection is silently suppressed
//! until the bad sample is evicted. Callers should filter them out.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::detect::window::{SampleWindow, Stats, Status};
use crate::detect::{Anomaly, DetectError, Severity};

/// Where the detector was when a sample arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fewer than `window_size` samples recorded; no judgement possible.
    Warming,
    /// Window full but its spread is zero; no meaningful z-score.
    Flat,
    /// Window full with non-zero spread; the sample was scored.
    Scored,
}

/// The outcome of feeding one sample to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: f64,
    pub phase: Phase,
    /// Statistics of the window before `value` was inserted.
    pub baseline: Stats,
    pub z_score: Option<f64>,
    pub threshold: f64,
    pub is_anomaly: bool,
}

impl Observation {
    /// Build an [`Anomaly`] record if this sample was flagged.
    pub fn anomaly(&self) -> Option<Anomaly> {
        if !self.is_anomaly {
            return None;
        }
        let z_score = self.z_score?;
        Some(Anomaly {
            value: self.value,
            baseline_mean: self.baseline.mean,
            baseline_std_dev: self.baseline.std_dev,
            z_score,
            threshold: self.threshold,
            severity: Severity::from_z_score(z_score),
            detected_at: chrono::Utc::now(),
        })
    }
}

#[derive(Debug)]
pub struct WindowedAnomalyDetector {
    config: DetectorConfig,
    window: RwLock<SampleWindow>,
}

impl WindowedAnomalyDetector {
    /// Create a detector with an empty window.
    ///
    /// Fails with [`DetectError::InvalidConfiguration`] if `window_size` is
    /// zero or `threshold` is negative or not finite.
    pub fn new(window_size: usize, threshold: f64) -> Result<Self, DetectError> {
        Self::from_config(&DetectorConfig::new(window_size, threshold))
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self, DetectError> {
        config.validate()?;
        Ok(Self {
            config: *config,
            window: RwLock::new(SampleWindow::new(config.window_size)),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Record `value` and report whether it was anomalous against the
    /// window as it stood before the insertion.
    pub fn add(&self, value: f64) -> bool {
        self.observe(value).is_anomaly
    }

    /// Like [`add`](Self::add), but also returns the baseline and z-score
    /// the decision was based on.
    pub fn observe(&self, value: f64) -> Observation {
        if !value.is_finite() {
            warn!(value, "non-finite sample added; anomaly detection degrades until it is evicted");
        }

        let mut window = self.write();

        let mut observation = Observation {
            value,
            phase: Phase::Warming,
            baseline: Stats::default(),
            z_score: None,
            threshold: self.config.threshold,
            is_anomaly: false,
        };

        if window.is_full() {
            // Baseline excludes the incoming sample.
            let baseline = window.stats();
            observation.baseline = baseline;
            if baseline.std_dev > 0.0 {
                let z_score = (value - baseline.mean).abs() / baseline.std_dev;
                observation.phase = Phase::Scored;
                observation.z_score = Some(z_score);
                observation.is_anomaly = z_score > self.config.threshold;
            } else {
                observation.phase = Phase::Flat;
            }
        }

        window.push(value);

        if observation.phase == Phase::Warming && window.is_full() {
            debug!(window_size = self.config.window_size, "detector window filled");
        }
        if observation.is_anomaly {
            debug!(
                value,
                mean = observation.baseline.mean,
                std_dev = observation.baseline.std_dev,
                z_score = ?observation.z_score,
                "anomalous sample"
            );
        }

        observation
    }

    /// Mean and population standard deviation of the current window.
    pub fn stats(&self) -> Stats {
        self.read().stats()
    }

    /// Stats and sample count taken from a single snapshot of the window.
    pub fn status(&self) -> Status {
        self.read().status()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// True once `window_size` samples have been recorded since construction
    /// or the last reset.
    pub fn is_warm(&self) -> bool {
        self.read().is_full()
    }

    /// Drop every sample; configuration is kept.
    pub fn reset(&self) {
        self.write().clear();
        debug!("detector window reset");
    }

    // Every mutation is a single push/pop/clear, so a panic elsewhere while
    // the lock was held cannot leave the window inconsistent.
    fn read(&self) -> RwLockReadGuard<'_, SampleWindow> {
        self.window.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SampleWindow> {
        self.window.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reference_scenario() {
        let det = WindowedAnomalyDetector::new(3, 2.0).unwrap();

        assert!(!det.add(1.0));
        assert_eq!(det.len(), 1);
        assert!(!det.add(2.0));
        assert_eq!(det.len(), 2);
        assert!(!det.add(3.0));
        assert_eq!(det.len(), 3);

        let obs = det.observe(100.0);
        assert!(obs.is_anomaly);
        assert_eq!(obs.phase, Phase::Scored);
        assert!(close(obs.baseline.mean, 2.0));
        assert!(close(obs.baseline.std_dev, (2.0_f64 / 3.0).sqrt()));
        // |100 - 2| / 0.8165 ~ 120.02
        let z = obs.z_score.unwrap();
        assert!((z - 120.02).abs() < 0.01, "z = {z}");

        let status = det.status();
        assert_eq!(status.count, 3);
        assert!(close(status.mean, 35.0));
        // sqrt(((2-35)^2 + (3-35)^2 + (100-35)^2) / 3) = sqrt(6338 / 3)
        assert!(close(status.std_dev, (6338.0_f64 / 3.0).sqrt()));
    }

    #[test]
    fn test_warm_up_never_flags() {
        let det = WindowedAnomalyDetector::new(4, 0.0).unwrap();
        for v in [1.0, 1_000.0, -1_000.0] {
            let obs = det.observe(v);
            assert!(!obs.is_anomaly);
            assert_eq!(obs.phase, Phase::Warming);
            assert_eq!(obs.z_score, None);
        }
        assert!(!det.is_warm());
        assert!(!det.add(5.0));
        assert!(det.is_warm());
    }

    #[test]
    fn test_zero_variance_baseline_is_flat() {
        let det = WindowedAnomalyDetector::new(3, 1.0).unwrap();
        for _ in 0..3 {
            det.add(10.0);
        }
        let obs = det.observe(1e12);
        assert_eq!(obs.phase, Phase::Flat);
        assert!(!obs.is_anomaly);
        assert!(obs.anomaly().is_none());
    }

    #[test]
    fn test_uniform_inexact_window_never_flags() {
        for (repeated, probe) in [(0.7, 1.7), (0.1, 1.1), (3.3, 100.0)] {
            let det = WindowedAnomalyDetector::new(3, 3.0).unwrap();
            for _ in 0..3 {
                det.add(repeated);
            }
            let obs = det.observe(probe);
            assert_eq!(obs.phase, Phase::Flat, "window of {repeated}");
            assert_eq!(obs.baseline, Stats { mean: repeated, std_dev: 0.0 });
            assert!(!obs.is_anomaly);
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        // Window [0, 2]: mean 1, std_dev 1. Value 3 has z == 2.
        let det = WindowedAnomalyDetector::new(2, 2.0).unwrap();
        det.add(0.0);
        det.add(2.0);
        let obs = det.observe(3.0);
        assert_eq!(obs.z_score, Some(2.0));
        assert!(!obs.is_anomaly);
    }

    #[test]
    fn test_low_side_deviation_is_flagged() {
        let det = WindowedAnomalyDetector::new(3, 2.0).unwrap();
        for v in [10.0, 11.0, 12.0] {
            det.add(v);
        }
        assert!(det.add(-50.0));
    }

    #[test]
    fn test_anomaly_record() {
        let det = WindowedAnomalyDetector::new(3, 2.0).unwrap();
        for v in [1.0, 2.0, 3.0] {
            det.add(v);
        }
        let anomaly = det.observe(100.0).anomaly().expect("should be anomaly");
        assert_eq!(anomaly.value, 100.0);
        assert_eq!(anomaly.threshold, 2.0);
        assert!(close(anomaly.baseline_mean, 2.0));
        assert_eq!(anomaly.severity, Severity::Critical);
    }

    #[test]
    fn test_reset_returns_to_warming() {
        let det = WindowedAnomalyDetector::new(2, 1.0).unwrap();
        det.add(1.0);
        det.add(3.0);
        assert!(det.is_warm());

        det.reset();
        assert_eq!(
            det.status(),
            Status {
                mean: 0.0,
                std_dev: 0.0,
                count: 0
            }
        );
        assert!(det.is_empty());
        assert_eq!(det.window_size(), 2);
        assert_eq!(det.threshold(), 1.0);
        assert!(!det.add(1_000.0));
    }

    #[test]
    fn test_nan_suppresses_detection() {
        let det = WindowedAnomalyDetector::new(3, 1.0).unwrap();
        for v in [1.0, f64::NAN, 3.0] {
            det.add(v);
        }
        assert!(det.stats().mean.is_nan());
        assert!(!det.add(1e9));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            WindowedAnomalyDetector::new(0, 3.0),
            Err(DetectError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            WindowedAnomalyDetector::new(10, -1.0),
            Err(DetectError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let det = WindowedAnomalyDetector::from_config(&DetectorConfig::default()).unwrap();
        assert_eq!(det.window_size(), 30);
        assert_eq!(det.threshold(), 3.0);
        assert_eq!(det.config(), &DetectorConfig::default());
    }

    #[test]
    fn test_window_size_one() {
        let det = WindowedAnomalyDetector::new(1, 0.0).unwrap();
        assert!(!det.add(5.0));
        // Single-sample baseline has zero spread.
        assert!(!det.add(500.0));
        assert_eq!(det.status().count, 1);
        assert_eq!(det.stats().mean, 500.0);
    }
}
