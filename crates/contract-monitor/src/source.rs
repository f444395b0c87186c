//! Snapshot producers feeding the collection loop.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::error::MonitorResult;
use crate::model::{PerformanceSnapshot, ResourceUsage};

/// Produces one snapshot per collection tick.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn collect(&self) -> MonitorResult<PerformanceSnapshot>;
}

/// Injected slowdown applied after a number of ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegressionInjection {
    /// Ticks produced before the slowdown starts.
    pub after_ticks: u64,
    /// Multiplier applied to latency metrics from then on.
    pub factor: f64,
}

#[derive(Debug)]
struct SimState {
    rng: StdRng,
    ticks: u64,
}

/// Deterministic generator of plausible contract-test metrics.
///
/// The same seed always yields the same value sequence.
#[derive(Debug)]
pub struct SimulatedSource {
    state: Mutex<SimState>,
    injection: Option<RegressionInjection>,
}

impl SimulatedSource {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                ticks: 0,
            }),
            injection: None,
        }
    }

    pub fn with_regression(mut self, after_ticks: u64, factor: f64) -> Self {
        self.injection = Some(RegressionInjection { after_ticks, factor });
        self
    }

    pub async fn ticks(&self) -> u64 {
        self.state.lock().await.ticks
    }
}

#[async_trait]
impl SnapshotSource for SimulatedSource {
    async fn collect(&self) -> MonitorResult<PerformanceSnapshot> {
        let mut state = self.state.lock().await;
        let tick = state.ticks;
        state.ticks += 1;

        let factor = match self.injection {
            Some(inj) if tick >= inj.after_ticks => inj.factor,
            _ => 1.0,
        };

        let rng = &mut state.rng;
        let validation = rng.gen_range(700.0..900.0) * factor;
        let p95 = rng.gen_range(80.0..160.0) * factor;
        let error_rate = rng.gen_range(0.0..0.005);
        let resource = ResourceUsage {
            cpu_percent: rng.gen_range(15.0..45.0),
            memory_mb: rng.gen_range(180.0..260.0),
        };

        Ok(
            PerformanceSnapshot::new(Utc::now(), validation, p95, error_rate, resource)
                .with_tag("source", "simulated")
                .with_tag("tick", tick.to_string()),
        )
    }
}
