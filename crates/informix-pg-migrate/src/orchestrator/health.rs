//! Connectivity check for both databases.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use super::Orchestrator;
use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::source::{OdbcSource, SourceConnection};
use crate::target::{PgTarget, TargetConnection};

/// Outcome of a health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Connect to each database independently and run a trivial query.
    ///
    /// Connection failures are reported, not returned, so both sides are
    /// always checked.
    pub async fn health_check(config: &Config, credentials: &Credentials) -> HealthReport {
        let start = Instant::now();
        let source = match OdbcSource::connect(&config.source, &credentials.source_password).await {
            Ok(source) => {
                let checked = check_source(&source).await;
                source.close().await;
                checked
            }
            Err(e) => Err(e),
        };
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = match PgTarget::connect(&config.target, &credentials.target_password).await {
            Ok(target) => {
                let checked = check_target(&target).await;
                target.close().await;
                checked
            }
            Err(e) => Err(e),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        HealthReport::from_checks(source, source_latency_ms, target, target_latency_ms)
    }
}

impl HealthReport {
    fn from_checks(source: Result<()>, source_latency_ms: u64, target: Result<()>, target_latency_ms: u64) -> Self {
        let report = Self {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy: false,
        };
        let healthy = report.source_connected && report.target_connected;
        if healthy {
            info!("Health check passed");
        } else {
            warn!("Health check failed");
        }
        Self { healthy, ..report }
    }
}

/// Run a trivial catalog query on the source.
pub async fn check_source(source: &dyn SourceConnection) -> Result<()> {
    source
        .query("SELECT tabid FROM systables WHERE tabid = 1", &[])
        .await
        .map(|_| ())
}

/// Run a trivial query on the target.
pub async fn check_target(target: &dyn TargetConnection) -> Result<()> {
    target.query_i64("SELECT 1::bigint", &[]).await.map(|_| ())
}
