// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `atrium doctor`: open the configured database and run each adapter's
//! health check.

use std::time::{Duration, Instant};

use atrium_config::AtriumConfig;
use atrium_core::{AtriumError, HealthStatus, PluginAdapter};
use atrium_storage::{LoopbackWorker, SqliteBackend};
use colored::Colorize;

/// Outcome of one adapter check.
#[derive(Debug)]
struct CheckResult {
    name: String,
    status: HealthStatus,
    duration: Duration,
}

async fn check(adapter: &dyn PluginAdapter) -> CheckResult {
    let start = Instant::now();
    let status = match adapter.health_check().await {
        Ok(status) => status,
        Err(e) => HealthStatus::Unhealthy(e.to_string()),
    };
    CheckResult {
        name: format!("{} {} v{}", adapter.adapter_type(), adapter.name(), adapter.version()),
        status,
        duration: start.elapsed(),
    }
}

fn line(result: &CheckResult) -> String {
    let ms = result.duration.as_millis();
    match &result.status {
        HealthStatus::Healthy => format!("  {} {:<28} ok ({ms}ms)", "✓".green(), result.name),
        HealthStatus::Degraded(why) => {
            format!("  {} {:<28} {} ({ms}ms)", "!".yellow(), result.name, why.yellow())
        }
        HealthStatus::Unhealthy(why) => {
            format!("  {} {:<28} {} ({ms}ms)", "✗".red(), result.name, why.red())
        }
    }
}

/// Fails if any adapter is unhealthy; degraded adapters only warn.
pub async fn run_doctor(config: &AtriumConfig) -> Result<(), AtriumError> {
    println!("database: {}", config.storage.database_path);
    let backend = SqliteBackend::open(config).await?;
    let worker = LoopbackWorker::new(backend.clone(), config);

    let results = [check(&backend).await, check(&worker).await];
    for result in &results {
        println!("{}", line(result));
    }
    backend.shutdown().await?;

    let unhealthy = results
        .iter()
        .filter(|r| matches!(r.status, HealthStatus::Unhealthy(_)))
        .count();
    if unhealthy > 0 {
        return Err(AtriumError::Internal(format!(
            "{unhealthy} adapter(s) unhealthy"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_database_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AtriumConfig::default();
        config.storage.database_path = dir.path().join("doctor.db").display().to_string();

        run_doctor(&config).await.unwrap();
        assert!(dir.path().join("doctor.db").exists());
    }
}
