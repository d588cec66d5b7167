//! Synthetic producer: noisy drone trajectories sent over the wire protocol.
//!
//! For drone `i` (1-based) at step `t` (1-based):
//!
//! ```text
//! x = t^1.1 - 8t + 3 t^0.2 i + n
//! y = t^0.9 + 3t + 10i       + n
//! z = 10i                     + n
//! ```
//!
//! where every `n` is an independent sample of `Normal(0, limit / 3)`.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::info;

use crate::client::TelemetryClient;
use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::protocol::{Message, PointRecord};

/// Gaussian noise source. A seed of 0 draws from OS entropy.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Create a generator, deterministic for any non-zero `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// One sample of `Normal(0, stddev)`.
    #[inline]
    pub fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }
}

/// Closed-form trajectories for a fleet of drones.
#[derive(Debug, Clone)]
pub struct Trajectory {
    drones: usize,
    stddev: f64,
    noise: NoiseGenerator,
}

impl Trajectory {
    /// `drones` trajectories with noise bounded by `noise_limit`.
    #[must_use]
    pub fn new(drones: usize, noise_limit: f64, seed: u64) -> Self {
        Self {
            drones,
            stddev: noise_limit / 3.0,
            noise: NoiseGenerator::new(seed),
        }
    }

    /// Noise-free position of drone `drone` at step `t`.
    #[must_use]
    pub fn ideal(drone: usize, t: u64) -> PointRecord {
        #[allow(clippy::cast_precision_loss)]
        let (i, t) = (drone as f64, t as f64);
        PointRecord::new(
            t.powf(1.1) - 8.0 * t + 3.0 * t.powf(0.2) * i,
            t.powf(0.9) + 3.0 * t + 10.0 * i,
            10.0 * i,
        )
    }

    /// One batch: every drone's noisy position at step `t`, in drone order.
    pub fn sample(&mut self, t: u64) -> Vec<PointRecord> {
        (1..=self.drones)
            .map(|drone| {
                let ideal = Self::ideal(drone, t);
                PointRecord::new(
                    ideal.x + self.noise.gaussian(self.stddev),
                    ideal.y + self.noise.gaussian(self.stddev),
                    ideal.z + self.noise.gaussian(self.stddev),
                )
            })
            .collect()
    }
}

/// Drives one producer session against an ingestion server.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulatorConfig,
}

impl Simulator {
    /// Create a simulator.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    /// Connect and run the full session: capacity, `ceil(run_time / interval)`
    /// coordinate batches, `END`, then `!DISCONNECT`.
    ///
    /// Returns the number of batches sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or any write fails.
    pub async fn run(&self) -> Result<u64> {
        let mut client = TelemetryClient::connect(&self.config.server_address()).await?;
        let sent = self.run_on(&mut client).await?;
        client.disconnect().await?;
        Ok(sent)
    }

    /// Send everything up to and including `END` on an open client.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails.
    pub async fn run_on(&self, client: &mut TelemetryClient) -> Result<u64> {
        client
            .send(&Message::LastPointsConfig {
                last_points_number: self.config.last_points_number,
            })
            .await?;

        let mut trajectory = Trajectory::new(
            self.config.drones,
            self.config.noise_limit,
            self.config.seed,
        );
        let batches = self.config.batch_count();
        let mut ticker = tokio::time::interval(self.config.interval());

        for t in 1..=batches {
            ticker.tick().await;
            client
                .send(&Message::Coordinates {
                    coords: trajectory.sample(t),
                })
                .await?;
        }

        client.send(&Message::End).await?;
        info!(
            batches,
            drones = self.config.drones,
            server = %client.peer_addr(),
            "simulation sent"
        );
        Ok(batches)
    }
}
