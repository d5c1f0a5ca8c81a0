//! TOML configuration for sigmawatch.
//!
//! Every section falls back to compiled-in defaults, so an empty file is a
//! valid configuration. The config file path can be overridden with the
//! `SIGMAWATCH_CONFIG` environment variable.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::DetectError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SIGMAWATCH_CONFIG";

/// Standard system location, tried when the environment variable is unset.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sigmawatch/sigmawatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigmawatchConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Named explicitly, e.g. `--config` on the command line.
    Explicit(PathBuf),
    /// Named by `SIGMAWATCH_CONFIG`.
    Env(PathBuf),
    /// The standard system location.
    System(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Env(p) | ConfigSource::System(p) => Some(p.as_path()),
            ConfigSource::Defaults => None,
        }
    }
}

/// A resolved configuration plus the candidates that failed along the way.
///
/// Resolution happens before logging is set up, so nothing is logged while
/// loading; call [`LoadedConfig::log`] once a subscriber is installed.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: SigmawatchConfig,
    pub source: ConfigSource,
    pub skipped: Vec<(ConfigSource, anyhow::Error)>,
}

impl LoadedConfig {
    pub fn log(&self) {
        for (source, error) in &self.skipped {
            if let Some(path) = source.path() {
                warn!(
                    path = %path.display(),
                    error = %format!("{error:#}"),
                    "config file could not be loaded, falling back"
                );
            }
        }
        match self.source.path() {
            Some(path) => info!(path = %path.display(), "loaded sigmawatch configuration"),
            None => debug!("no config file found, using compiled-in defaults"),
        }
    }
}

impl SigmawatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load a file the caller asked for by name; failure is an error, not a fallback.
    pub fn load_explicit(path: &Path) -> Result<LoadedConfig> {
        Ok(LoadedConfig {
            config: Self::load(path)?,
            source: ConfigSource::Explicit(path.to_path_buf()),
            skipped: Vec::new(),
        })
    }

    /// Resolve configuration from `SIGMAWATCH_CONFIG`, then
    /// `/etc/sigmawatch/sigmawatch.toml`, then compiled-in defaults.
    pub fn discover() -> LoadedConfig {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::discover_from(env_path, Path::new(SYSTEM_CONFIG_PATH))
    }

    fn discover_from(env_path: Option<PathBuf>, system_path: &Path) -> LoadedConfig {
        let mut candidates: Vec<ConfigSource> = env_path.map(ConfigSource::Env).into_iter().collect();
        // The system file is optional; only its absence is silent.
        if system_path.exists() {
            candidates.push(ConfigSource::System(system_path.to_path_buf()));
        }

        let mut skipped = Vec::new();
        for source in candidates {
            let Some(path) = source.path() else { continue };
            match Self::load(path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        source,
                        skipped,
                    }
                }
                Err(e) => skipped.push((source, e)),
            }
        }

        LoadedConfig {
            config: Self::default(),
            source: ConfigSource::Defaults,
            skipped,
        }
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        self.detector.validate()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Window and threshold for a single detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Number of most recent samples kept as the baseline.
    pub window_size: usize,
    /// Z-score above which a sample is flagged.
    pub threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            threshold: 3.0,
        }
    }
}

impl DetectorConfig {
    pub fn new(window_size: usize, threshold: f64) -> Self {
        Self {
            window_size,
            threshold,
        }
    }

    /// Reject windows that can never fill and thresholds that are not a
    /// finite, non-negative number of standard deviations.
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.window_size == 0 {
            return Err(DetectError::InvalidConfiguration(
                "window_size must be positive".to_string(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DetectError::InvalidConfiguration(format!(
                "threshold must be a finite, non-negative number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (e.g. `"info"`, `"sigmawatch=debug"`).
    pub level: String,
    /// Emit structured JSON log lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
