//! sigmawatch -- streaming z-score anomaly detection for a single metric.
//!
//! This crate provides a bounded, thread-safe sample window that flags a new
//! value when it sits more than a configured number of standard deviations
//! away from the window's recent history.
//!
//! ```
//! use sigmawatch::WindowedAnomalyDetector;
//!
//! let detector = WindowedAnomalyDetector::new(3, 2.0)?;
//! for v in [1.0, 2.0, 3.0] {
//!     assert!(!detector.add(v));
//! }
//! assert!(detector.add(100.0));
//! assert_eq!(detector.status().count, 3);
//! # Ok::<(), sigmawatch::DetectError>(())
//! ```

pub mod config;
pub mod detect;

pub use config::{ConfigSource, DetectorConfig, LoadedConfig, SigmawatchConfig};
pub use detect::{
    Anomaly, DetectError, Observation, Phase, Severity, Stats, Status, WindowedAnomalyDetector,
};
