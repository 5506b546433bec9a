//! memguardian - memory guardian for Kubernetes pods
//!
//! Periodically compares container memory usage against thresholds declared
//! through pod annotations and gracefully evicts at most one pod per owning
//! controller per cycle, and only while every sibling pod is ready.

use anyhow::{Context, Result};
use clap::Parser;
use guardian_lib::{
    cluster::{ClusterClient, ClusterSettings, KubeClusterClient},
    health::{components, HealthRegistry},
    observability::{GuardianMetrics, StructuredLogger},
    EvaluationLoop, GuardianEngine, LoopConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const GUARDIAN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Memory Guardian for Kubernetes pods
#[derive(Parser)]
#[command(name = "memguardian")]
#[command(author, version, about = "Memory Guardian for Kubernetes pods", long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to kubeconfig file (inferred configuration if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Restrict evaluation to one namespace
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Run forever instead of a single evaluation cycle
    #[arg(long, short)]
    pub daemon: bool,

    /// Seconds to wait between evaluation cycles
    #[arg(long)]
    pub delay: Option<u64>,

    /// Prometheus exporter port
    #[arg(long)]
    pub prometheus_port: Option<u16>,

    /// Disable the Prometheus exporter
    #[arg(long)]
    pub prometheus_disable: bool,

    /// Log eviction decisions without deleting pods
    #[arg(long)]
    pub dry_run: bool,
}

fn init_tracing(verbosity: u8) {
    let fallback = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::GuardianConfig::load()?.merged_with(&cli);
    let scope = config.namespace.clone().unwrap_or_else(|| "cluster".to_string());
    info!(scope = %scope, delay_secs = config.delay_secs, dry_run = config.dry_run, "Starting memguardian");

    let metrics = GuardianMetrics::new();
    let logger = StructuredLogger::new(&scope);
    logger.log_startup(GUARDIAN_VERSION);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::EXPORTER).await;

    // Missing credentials or an unreachable API server is fatal at startup.
    let client = KubeClusterClient::connect(ClusterSettings {
        kubeconfig: config.kubeconfig.clone(),
        namespace: config.namespace.clone(),
    })
    .await
    .context("connecting to the cluster")?;
    health_registry.register(components::CLUSTER).await;

    let client: Arc<dyn ClusterClient> = Arc::new(client);
    let engine = GuardianEngine::new(client, metrics.clone(), logger.clone(), config.dry_run);

    if !config.prometheus_disable {
        let state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
        let exporter_health = health_registry.clone();
        let port = config.prometheus_port;
        tokio::spawn(async move {
            if let Err(err) = api::serve(port, state).await {
                exporter_health
                    .set_unhealthy(components::EXPORTER, format!("{err:#}"))
                    .await;
            }
        });
    }

    health_registry.set_ready(true).await;

    if !cli.daemon {
        let start = Instant::now();
        let stats = engine.run_cycle().await.context("evaluation cycle failed")?;
        logger.log_cycle_complete(&stats, start.elapsed().as_secs_f64());
        logger.log_shutdown("single evaluation complete");
        return Ok(());
    }

    let eval_loop = EvaluationLoop::new(
        engine,
        LoopConfig {
            interval: Duration::from_secs(config.delay_secs),
        },
        metrics.clone(),
        logger.clone(),
        health_registry.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handle = tokio::spawn(eval_loop.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    let _ = loop_handle.await;

    Ok(())
}
