//! Evaluation loop
//!
//! Drives fixed-interval evaluation cycles. Cycles never overlap: the next
//! tick is not serviced until the previous cycle, including its executor
//! phase, has finished. Shutdown is observed between cycles, so an
//! in-flight cycle completes before the loop exits.

use super::GuardianEngine;
use crate::health::{components, HealthRegistry};
use crate::observability::{GuardianMetrics, StructuredLogger};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

/// Configuration for the evaluation loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Time between cycle starts (default: 10 seconds)
    pub interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Periodic runner around the engine
pub struct EvaluationLoop {
    engine: GuardianEngine,
    config: LoopConfig,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl EvaluationLoop {
    pub fn new(
        engine: GuardianEngine,
        config: LoopConfig,
        metrics: GuardianMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        Self {
            engine,
            config,
            metrics,
            logger,
            health,
        }
    }

    /// Run cycles until the shutdown signal fires
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting evaluation loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_one().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down evaluation loop");
                    break;
                }
            }
        }
    }

    async fn run_one(&self) {
        let start = Instant::now();

        match self.engine.run_cycle().await {
            Ok(stats) => {
                let elapsed = start.elapsed().as_secs_f64();
                self.metrics.observe_cycle_duration(elapsed);
                self.health.set_healthy(components::ENGINE).await;
                self.logger.log_cycle_complete(&stats, elapsed);
            }
            Err(err) => {
                self.metrics.inc_cycle_errors();
                self.health
                    .set_degraded(components::ENGINE, format!("{err:#}"))
                    .await;
                self.logger.log_cycle_failed(&format!("{err:#}"));
            }
        }
    }
}
