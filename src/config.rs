use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Where the translator loads locale catalogs from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSourceKind {
    /// Catalogs compiled into the binary
    Embedded,
    /// `{dir}/{code}.json` on disk
    Directory(PathBuf),
    /// `{base_url}/locales/{code}.json` over HTTP
    Http(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    // Localization
    pub catalog_source: CatalogSourceKind,
    pub preferences_file: PathBuf,

    // Page lifecycle
    pub startup_delay: Duration,

    // Simulation
    pub speed_test: SpeedTestConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let catalog_source = match std::env::var("CATALOG_SOURCE")
            .unwrap_or_else(|_| "embedded".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "embedded" => CatalogSourceKind::Embedded,
            "dir" | "directory" => CatalogSourceKind::Directory(
                std::env::var("LOCALES_DIR")
                    .unwrap_or_else(|_| "locales".to_string())
                    .into(),
            ),
            "http" => CatalogSourceKind::Http(
                std::env::var("CATALOG_BASE_URL")
                    .context("CATALOG_BASE_URL not set (required when CATALOG_SOURCE=http)")?,
            ),
            other => bail!(
                "Invalid CATALOG_SOURCE '{}'. Expected embedded, dir or http",
                other
            ),
        };

        let defaults = SpeedTestConfig::default();
        // Applies to both latency phases unless one is set on its own
        let ping_failure_rate = env_parse("PING_FAILURE_RATE")?.unwrap_or(0.0);
        let speed_test = SpeedTestConfig {
            download_duration: env_millis("DOWNLOAD_DURATION_MS")?
                .unwrap_or(defaults.download_duration),
            sample_interval: env_millis("SAMPLE_INTERVAL_MS")?.unwrap_or(defaults.sample_interval),
            connection_count: env_parse("CONNECTION_COUNT")?.unwrap_or(defaults.connection_count),
            max_connections: env_parse("MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections),
            latency_ping_count: env_parse("LATENCY_PING_COUNT")?
                .unwrap_or(defaults.latency_ping_count),
            seed: env_parse("RNG_SEED")?,
            faults: FaultPlan {
                download_connection_failure_rate: env_parse("DOWNLOAD_FAILURE_RATE")?
                    .unwrap_or(0.0),
                dropped_connections: env_parse("DROPPED_CONNECTIONS")?.unwrap_or(0),
                upload_failure_rate: env_parse("UPLOAD_FAILURE_RATE")?.unwrap_or(0.0),
                unloaded_ping_failure_rate: env_parse("UNLOADED_PING_FAILURE_RATE")?
                    .unwrap_or(ping_failure_rate),
                loaded_ping_failure_rate: env_parse("LOADED_PING_FAILURE_RATE")?
                    .unwrap_or(ping_failure_rate),
            },
            ..defaults
        };
        speed_test.validate()?;

        Ok(Self {
            catalog_source,
            preferences_file: std::env::var("PREFERENCES_FILE")
                .unwrap_or_else(|_| "speedcheck-preferences.json".to_string())
                .into(),
            startup_delay: env_millis("STARTUP_DELAY_MS")?.unwrap_or(Duration::from_millis(500)),
            speed_test,
        })
    }
}

/// Parse an optional environment variable, failing only on malformed values.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}

/// Inclusive numeric range a simulated value is drawn from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            bail!("{} range must be finite", name);
        }
        if self.min > self.max {
            bail!("{} range is inverted: {} > {}", name, self.min, self.max);
        }
        Ok(())
    }
}

/// Failure probabilities (0.0 - 1.0) injected into the simulated network
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaultPlan {
    /// Chance that a download connection drops on each file it starts
    pub download_connection_failure_rate: f64,
    /// Download connections (lowest ids first) that drop before moving any data
    pub dropped_connections: usize,
    /// Chance that the upload phase fails
    pub upload_failure_rate: f64,
    /// Chance that an individual ping is lost before the download
    pub unloaded_ping_failure_rate: f64,
    /// Chance that an individual ping is lost after the upload
    pub loaded_ping_failure_rate: f64,
}

impl FaultPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ping_failure_rate(&self, loaded: bool) -> f64 {
        if loaded {
            self.loaded_ping_failure_rate
        } else {
            self.unloaded_ping_failure_rate
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("DOWNLOAD_FAILURE_RATE", self.download_connection_failure_rate),
            ("UPLOAD_FAILURE_RATE", self.upload_failure_rate),
            ("UNLOADED_PING_FAILURE_RATE", self.unloaded_ping_failure_rate),
            ("LOADED_PING_FAILURE_RATE", self.loaded_ping_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                bail!("{} must be between 0 and 1, got {}", name, rate);
            }
        }
        Ok(())
    }
}

/// Timing and value ranges for the simulated measurement phases.
///
/// The numbers are demo values; nothing depends on them being exact.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestConfig {
    // Download
    pub download_duration: Duration,
    pub sample_interval: Duration,
    pub connection_count: usize,
    pub max_connections: usize,
    pub download_sizes_mb: Vec<f64>,
    pub chunk_bytes: u64,
    pub per_connection_mbps: f64,
    pub speed_variation: MetricRange,
    pub download_floor_mbps: f64,

    // Upload
    pub upload_size_mb: f64,
    pub upload_mbps: MetricRange,
    pub upload_floor_mbps: f64,

    // Latency
    pub latency_ping_count: usize,
    pub latency_unloaded_ms: MetricRange,
    pub latency_loaded_ms: MetricRange,

    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    pub faults: FaultPlan,
}

impl Default for SpeedTestConfig {
    fn default() -> Self {
        Self {
            download_duration: Duration::from_secs(10),
            sample_interval: Duration::from_millis(200),
            connection_count: 4,
            max_connections: 8,
            download_sizes_mb: vec![1.0, 2.0, 5.0, 10.0, 20.0],
            chunk_bytes: 256 * 1024,
            per_connection_mbps: 50.0,
            speed_variation: MetricRange::new(0.7, 1.3),
            download_floor_mbps: 0.1,

            upload_size_mb: 5.0,
            upload_mbps: MetricRange::new(10.0, 30.0),
            upload_floor_mbps: 0.1,

            latency_ping_count: 5,
            latency_unloaded_ms: MetricRange::new(10.0, 30.0),
            latency_loaded_ms: MetricRange::new(20.0, 60.0),

            seed: None,
            faults: FaultPlan::none(),
        }
    }
}

impl SpeedTestConfig {
    /// Number of simulated download connections actually opened
    pub fn effective_connections(&self) -> usize {
        self.connection_count.min(self.max_connections)
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_duration.is_zero() {
            bail!("Download duration must be greater than zero");
        }
        if self.sample_interval.is_zero() {
            bail!("Sample interval must be greater than zero");
        }
        if self.sample_interval >= self.download_duration {
            bail!(
                "Sample interval ({} ms) must be shorter than the download duration ({} ms)",
                self.sample_interval.as_millis(),
                self.download_duration.as_millis()
            );
        }
        if self.effective_connections() == 0 {
            bail!("At least one download connection is required");
        }
        if self.latency_ping_count == 0 {
            bail!("At least one latency ping is required");
        }
        if self.download_sizes_mb.is_empty() {
            bail!("Download size list is empty");
        }
        if self
            .download_sizes_mb
            .iter()
            .any(|size| !size.is_finite() || *size <= 0.0)
        {
            bail!("Download sizes must be positive");
        }
        if self.chunk_bytes == 0 {
            bail!("Chunk size must be greater than zero");
        }
        if !(self.per_connection_mbps > 0.0) {
            bail!("Per-connection speed must be positive");
        }
        if !(self.upload_size_mb > 0.0) {
            bail!("Upload size must be positive");
        }

        self.speed_variation.validate("Speed variation")?;
        self.upload_mbps.validate("Upload speed")?;
        self.latency_unloaded_ms.validate("Unloaded latency")?;
        self.latency_loaded_ms.validate("Loaded latency")?;

        if self.speed_variation.min <= 0.0 {
            bail!("Speed variation must stay above zero");
        }
        if self.upload_mbps.min <= 0.0 {
            bail!("Upload speed range must stay above zero");
        }
        if self.latency_unloaded_ms.min < 0.0 || self.latency_loaded_ms.min < 0.0 {
            bail!("Latency ranges cannot be negative");
        }

        self.faults.validate()
    }
}
