//! Aggregated health reporting.
//!
//! The daemon's status is the worst status among its stages:
//!
//! - all Healthy -> Healthy
//! - any Degraded, none Unhealthy -> Degraded(reasons)
//! - any Unhealthy -> Unhealthy(reasons)

use serde::Serialize;

use sbomer_core::pipeline::HealthStatus;

/// Health report for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status of all stages.
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub modules: Vec<ModuleHealth>,
}

/// Health of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// `fetcher` or `processor`.
    pub name: String,
    pub status: HealthStatus,
}

/// Folds per-stage statuses into one. Reasons are prefixed with the stage
/// name and joined with `; `.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for module in modules {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", module.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", module.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        unhealthy.extend(degraded);
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}
