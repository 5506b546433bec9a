//! Guardian configuration
//!
//! Environment variables (prefix `GUARDIAN_`) supply defaults; CLI flags
//! override them.

use crate::Cli;
use anyhow::Result;
use serde::Deserialize;

/// Guardian configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GuardianConfig {
    /// Restrict evaluation to one namespace; cluster scope when unset
    #[serde(default)]
    pub namespace: Option<String>,

    /// Explicit kubeconfig path; inferred configuration when unset
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// Seconds between evaluation cycles
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Prometheus exporter port
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,

    /// Disable the Prometheus exporter
    #[serde(default)]
    pub prometheus_disable: bool,

    /// Log decisions without deleting pods
    #[serde(default)]
    pub dry_run: bool,
}

fn default_delay_secs() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    8000
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            kubeconfig: None,
            delay_secs: default_delay_secs(),
            prometheus_port: default_prometheus_port(),
            prometheus_disable: false,
            dry_run: false,
        }
    }
}

impl GuardianConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("GUARDIAN"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    /// Apply CLI flags on top of environment configuration
    pub fn merged_with(mut self, cli: &Cli) -> Self {
        if cli.namespace.is_some() {
            self.namespace = cli.namespace.clone();
        }
        if cli.kubeconfig.is_some() {
            self.kubeconfig = cli.kubeconfig.clone();
        }
        if let Some(delay) = cli.delay {
            self.delay_secs = delay;
        }
        if let Some(port) = cli.prometheus_port {
            self.prometheus_port = port;
        }
        if cli.prometheus_disable {
            self.prometheus_disable = true;
        }
        if cli.dry_run {
            self.dry_run = true;
        }
        self
    }
}
