//! Simulated network: pings, upload, and download connections that only sleep.

use crate::config::{FaultPlan, MetricRange, SpeedTestConfig};
use crate::speedtest::LinkError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Longest single simulated wait, keeps degenerate speeds from sleeping forever
const MAX_SIMULATED_WAIT: Duration = Duration::from_secs(3600);

/// Draw a value from `range`; a collapsed range yields its minimum.
pub(crate) fn sample<R: Rng>(rng: &mut R, range: MetricRange) -> f64 {
    if range.max > range.min {
        rng.gen_range(range.min..=range.max)
    } else {
        range.min
    }
}

fn fails<R: Rng>(rng: &mut R, rate: f64) -> bool {
    rng.gen_bool(rate.clamp(0.0, 1.0))
}

/// Time needed to move `bytes` at `mbps`.
fn transfer_time(bytes: f64, mbps: f64) -> Duration {
    let secs = bytes * 8.0 / (mbps * 1_000_000.0);
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_SIMULATED_WAIT)
        .min(MAX_SIMULATED_WAIT)
}

fn millis(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms / 1000.0)
        .unwrap_or(Duration::ZERO)
        .min(MAX_SIMULATED_WAIT)
}

/// Source of every simulated delay and value in a test run.
pub struct SimulatedLink {
    config: SpeedTestConfig,
    rng: StdRng,
}

impl SimulatedLink {
    pub fn new(config: SpeedTestConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &SpeedTestConfig {
        &self.config
    }

    /// One round trip. Returns the simulated latency in milliseconds.
    pub async fn ping(&mut self, loaded: bool) -> Result<f64, LinkError> {
        let range = if loaded {
            self.config.latency_loaded_ms
        } else {
            self.config.latency_unloaded_ms
        };
        let latency = sample(&mut self.rng, range);
        let lost = fails(&mut self.rng, self.config.faults.ping_failure_rate(loaded));

        sleep(millis(latency)).await;

        if lost {
            Err(LinkError::PingLost)
        } else {
            Ok(latency)
        }
    }

    /// Push `upload_size_mb` at a randomized speed. Returns that speed in Mbps.
    pub async fn upload(&mut self) -> Result<f64, LinkError> {
        let speed = sample(&mut self.rng, self.config.upload_mbps);
        let rejected = fails(&mut self.rng, self.config.faults.upload_failure_rate);

        sleep(transfer_time(self.config.upload_size_mb * BYTES_PER_MB, speed)).await;

        if rejected {
            Err(LinkError::UploadRejected)
        } else {
            Ok(speed)
        }
    }

    /// A download connection with its own RNG stream, ready to be spawned.
    pub fn open_connection(&mut self, id: usize) -> SimulatedConnection {
        SimulatedConnection {
            id,
            rng: StdRng::seed_from_u64(self.rng.gen()),
            sizes_mb: self.config.download_sizes_mb.clone(),
            chunk_bytes: self.config.chunk_bytes.max(1),
            per_connection_mbps: self.config.per_connection_mbps,
            variation: self.config.speed_variation,
            faults: self.config.faults,
            dropped: id < self.config.faults.dropped_connections,
        }
    }
}

/// One logical download stream.
pub struct SimulatedConnection {
    id: usize,
    rng: StdRng,
    sizes_mb: Vec<f64>,
    chunk_bytes: u64,
    per_connection_mbps: f64,
    variation: MetricRange,
    faults: FaultPlan,
    dropped: bool,
}

impl SimulatedConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Download files back to back, adding each chunk to `bytes` as it lands.
    ///
    /// Only returns when the simulated network drops the connection; the
    /// download phase aborts the task otherwise.
    pub async fn run(mut self, bytes: Arc<AtomicU64>) -> Result<(), LinkError> {
        if self.dropped {
            return Err(LinkError::ConnectionDropped);
        }

        loop {
            if fails(&mut self.rng, self.faults.download_connection_failure_rate) {
                return Err(LinkError::ConnectionDropped);
            }

            let size_mb = self.sizes_mb.choose(&mut self.rng).copied().unwrap_or(1.0);
            let speed = self.per_connection_mbps * sample(&mut self.rng, self.variation);
            let chunk_time = transfer_time(self.chunk_bytes as f64, speed);

            let mut remaining = ((size_mb * BYTES_PER_MB) as u64).max(1);
            while remaining > 0 {
                let chunk = remaining.min(self.chunk_bytes);
                let wait = if chunk == self.chunk_bytes {
                    chunk_time
                } else {
                    transfer_time(chunk as f64, speed)
                };
                sleep(wait).await;

                bytes.fetch_add(chunk, Ordering::Relaxed);
                remaining -= chunk;
            }
        }
    }
}
