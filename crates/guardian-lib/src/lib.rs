//! Core library for the memguardian eviction engine
//!
//! This crate provides:
//! - Threshold annotation parsing
//! - Per-cycle pod snapshots and controller grouping
//! - Readiness-gated eviction selection (at most one pod per controller
//!   per cycle)
//! - Graceful eviction execution against the cluster
//! - Health checks and observability

pub mod cluster;
pub mod engine;
pub mod executor;
pub mod grouper;
pub mod health;
pub mod models;
pub mod observability;
pub mod selector;
pub mod snapshot;
pub mod threshold;

pub use engine::{CycleStats, EvaluationLoop, GuardianEngine, LoopConfig};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{GuardianMetrics, StructuredLogger};
