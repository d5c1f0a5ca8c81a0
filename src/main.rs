use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use sigmawatch::{Observation, Phase, Severity, SigmawatchConfig, Status, WindowedAnomalyDetector};

#[derive(Parser)]
#[command(
    name = "sigmawatch",
    about = "Streaming z-score anomaly detection over a bounded sample window",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $SIGMAWATCH_CONFIG, then /etc/sigmawatch/sigmawatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed samples (one per line) through a detector and report anomalies
    Scan {
        /// Read samples from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Number of recent samples used as the baseline
        #[arg(long)]
        window_size: Option<usize>,

        /// Z-score above which a sample is flagged
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<f64>,

        /// JSON lines output for machine parsing
        #[arg(long)]
        json: bool,

        /// Only print flagged samples
        #[arg(long)]
        anomalies_only: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Serialize)]
struct ScanRecord<'a> {
    line: usize,
    #[serde(flatten)]
    observation: &'a Observation,
    severity: Option<Severity>,
}

#[derive(Serialize)]
struct ScanSummary {
    samples: usize,
    anomalies: usize,
    window_size: usize,
    status: Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => SigmawatchConfig::load_explicit(path)?,
        None => SigmawatchConfig::discover(),
    };

    // Initialize tracing; RUST_LOG wins over the configured level.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&loaded.config.logging.level)
            }),
        )
        .with_writer(io::stderr);
    if loaded.config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Config resolution ran before the subscriber existed; report it now.
    loaded.log();
    let config = loaded.config;

    match cli.command {
        Commands::Scan {
            input,
            window_size,
            threshold,
            json,
            anomalies_only,
        } => {
            let mut config = config;
            if let Some(n) = window_size {
                config.detector.window_size = n;
            }
            if let Some(t) = threshold {
                config.detector.threshold = t;
            }
            let detector = WindowedAnomalyDetector::from_config(&config.detector)?;
            tracing::info!(
                window_size = detector.window_size(),
                threshold = detector.threshold(),
                input = ?input,
                "Starting scan"
            );

            let reader: Box<dyn BufRead> = match &input {
                Some(path) => Box::new(BufReader::new(open_input(path)?)),
                None => Box::new(io::stdin().lock()),
            };
            let summary = scan(&detector, reader, json, anomalies_only)?;

            if json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                println!();
                println!(
                    "Samples: {}  Anomalies: {}  Window: {}/{}  Mean: {:.4}  StdDev: {:.4}",
                    summary.samples,
                    summary.anomalies,
                    summary.status.count,
                    summary.window_size,
                    summary.status.mean,
                    summary.status.std_dev
                );
            }
        }
        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("failed to open input file: {}", path.display()))
}

fn scan(
    detector: &WindowedAnomalyDetector,
    reader: impl BufRead,
    json: bool,
    anomalies_only: bool,
) -> Result<ScanSummary> {
    let mut samples = 0;
    let mut anomalies = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read line {}", line_no))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let value: f64 = trimmed
            .parse()
            .with_context(|| format!("line {}: invalid sample {:?}", line_no, trimmed))?;

        let observation = detector.observe(value);
        samples += 1;
        let severity = observation.anomaly().map(|a| a.severity);
        if severity.is_some() {
            anomalies += 1;
            tracing::warn!(line = line_no, value, z_score = ?observation.z_score, "Anomaly detected");
        } else if anomalies_only {
            continue;
        }

        if json {
            let record = ScanRecord {
                line: line_no,
                observation: &observation,
                severity,
            };
            println!("{}", serde_json::to_string(&record)?);
        } else {
            println!("{:>6} | {:>14.4} | {}", line_no, value, describe(&observation, severity));
        }
    }

    Ok(ScanSummary {
        samples,
        anomalies,
        window_size: detector.window_size(),
        status: detector.status(),
    })
}

fn describe(observation: &Observation, severity: Option<Severity>) -> String {
    match (observation.phase, observation.z_score, severity) {
        (Phase::Warming, _, _) => "warming".to_string(),
        (Phase::Flat, _, _) => "flat baseline".to_string(),
        (Phase::Scored, Some(z), Some(sev)) => format!("ANOMALY z={:.2} ({:?})", z, sev),
        (Phase::Scored, Some(z), None) => format!("ok z={:.2}", z),
        (Phase::Scored, None, _) => "ok".to_string(),
    }
}
