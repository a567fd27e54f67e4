// src/health/aggregator.rs
use super::probe::{Probe, ProbeOutcome, ProbeResult};
use super::report::HealthReport;
use crate::config::{load_config, Config};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A probe future ready to be launched, tagged with the name it reports under.
pub struct PendingProbe {
    name: String,
    future: BoxFuture<'static, ProbeOutcome>,
}

impl PendingProbe {
    pub fn new<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = ProbeOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            future: Box::pin(future),
        }
    }
}

/// Runs every enabled probe concurrently and reduces the results to one verdict.
pub struct Aggregator {
    service: String,
    target: String,
    probes: Vec<Probe>,
    critical: Vec<String>,
    probe_timeout: Duration,
    deadline: Duration,
}

impl Aggregator {
    pub fn from_config(config: &Config) -> Result<Self> {
        let health = &config.health;
        let probes = health
            .probes
            .iter()
            .map(|kind| Probe::from_config(*kind, health))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            service: config.service_name.clone(),
            target: health.target(),
            probes,
            critical: health.critical.iter().map(|k| k.to_string()).collect(),
            probe_timeout: health.probe_timeout(),
            deadline: health.deadline(),
        })
    }

    pub async fn run(&self) -> HealthReport {
        info!(
            target_addr = %self.target,
            probes = self.probes.len(),
            "health check starting"
        );

        let pending = self
            .probes
            .iter()
            .cloned()
            .map(|probe| {
                let name = probe.kind().to_string();
                PendingProbe::new(name, async move { probe.run().await })
            })
            .collect();

        let checks = collect(pending, self.probe_timeout, self.deadline).await;

        debug!("reducing probe results");
        let report = HealthReport::reduce(&self.service, Some(self.target.as_str()), &self.critical, checks);
        info!(status = ?report.status, "health check complete");
        report
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("probe panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("probe panicked: {}", msg)
    } else {
        "probe panicked".to_string()
    }
}

/// Launch every probe on its own task, each under `probe_timeout`, then wait
/// for all of them. Nothing is awaited past `deadline`: stragglers are aborted
/// and reported as failures.
pub async fn collect(
    probes: Vec<PendingProbe>,
    probe_timeout: Duration,
    deadline: Duration,
) -> BTreeMap<String, ProbeResult> {
    let started = Instant::now();
    let deadline_at = tokio::time::Instant::now() + deadline;

    let handles: Vec<(String, JoinHandle<ProbeResult>)> = probes
        .into_iter()
        .map(|probe| {
            let name = probe.name.clone();
            let handle = tokio::spawn(async move {
                let start = Instant::now();
                let outcome = match tokio::time::timeout(probe_timeout, probe.future).await {
                    Ok(outcome) => outcome,
                    Err(_) => ProbeOutcome::failure(format!(
                        "timed out after {}ms",
                        probe_timeout.as_millis()
                    )),
                };
                ProbeResult::from_outcome(probe.name, outcome, start.elapsed())
            });
            (name, handle)
        })
        .collect();

    let mut results = BTreeMap::new();
    for (name, mut handle) in handles {
        let result = match tokio::time::timeout_at(deadline_at, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!(probe = %name, "{}", message);
                ProbeResult::failed(&name, message, started.elapsed())
            }
            Ok(Err(e)) => ProbeResult::failed(&name, format!("probe aborted: {}", e), started.elapsed()),
            Err(_) => {
                handle.abort();
                warn!(probe = %name, "aggregator deadline exceeded");
                ProbeResult::failed(&name, "aggregator deadline exceeded", started.elapsed())
            }
        };

        if result.succeeded {
            debug!(probe = %name, latency_ms = result.latency_ms, "probe succeeded");
        } else {
            debug!(probe = %name, error = ?result.error, "probe failed");
        }
        results.insert(name, result);
    }

    results
}

/// Load configuration and run a full check. Configuration faults and a
/// crashing aggregation both yield an `error` report instead of a panic.
pub async fn run_health_check(config_path: Option<&Path>) -> HealthReport {
    let aggregator = match load_config(config_path).and_then(|config| Aggregator::from_config(&config)) {
        Ok(aggregator) => aggregator,
        Err(e) => return HealthReport::crashed(None, format!("{:#}", e)),
    };
    let service = aggregator.service.clone();

    let run = tokio::spawn(async move { aggregator.run().await })
        .await
        .context("health aggregation crashed");

    match run {
        Ok(report) => report,
        Err(e) => HealthReport::crashed(Some(&service), format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ReportStatus;

    fn ok(name: &str) -> PendingProbe {
        PendingProbe::new(name, async { ProbeOutcome::success(&serde_json::json!({"ok": true})) })
    }

    fn failing(name: &str, error: &'static str) -> PendingProbe {
        PendingProbe::new(name, async move { ProbeOutcome::failure(error) })
    }

    fn hung(name: &str) -> PendingProbe {
        PendingProbe::new(name, futures::future::pending())
    }

    async fn explode() -> ProbeOutcome {
        panic!("listing exploded")
    }

    fn critical(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn all_probes_succeeding_is_healthy() {
        let checks = collect(
            vec![ok("liveness"), ok("supervisor"), ok("logs")],
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .await;
        let report = HealthReport::reduce("svc", None, &critical(&["liveness"]), checks);
        assert!(report.overall);
        assert_eq!(report.status, ReportStatus::Healthy);
        assert_eq!(report.checks.len(), 3);
    }

    #[tokio::test]
    async fn failed_liveness_is_unhealthy_regardless_of_others() {
        let checks = collect(
            vec![failing("liveness", "all 3 endpoints failed"), ok("supervisor"), ok("resources")],
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .await;
        let report = HealthReport::reduce("svc", None, &critical(&["liveness"]), checks);
        assert!(!report.overall);
        assert_eq!(report.status, ReportStatus::Unhealthy);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn non_critical_failure_is_reported_but_not_fatal() {
        let checks = collect(
            vec![ok("liveness"), failing("supervisor", "process 'elizaos' not found in supervisor listing")],
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .await;
        let report = HealthReport::reduce("svc", None, &critical(&["liveness"]), checks);
        assert!(report.overall);
        let supervisor = &report.checks["supervisor"];
        assert!(!supervisor.succeeded);
        assert!(supervisor.error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn panicking_probe_does_not_stop_the_others() {
        let checks = collect(
            vec![
                PendingProbe::new("supervisor", explode()),
                ok("liveness"),
                ok("logs"),
            ],
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(checks.len(), 3);
        assert!(checks["liveness"].succeeded);
        assert!(checks["logs"].succeeded);
        assert_eq!(
            checks["supervisor"].error.as_deref(),
            Some("probe panicked: listing exploded")
        );
    }

    #[tokio::test]
    async fn hung_probe_times_out_individually() {
        let start = Instant::now();
        let checks = collect(
            vec![hung("supervisor"), ok("liveness")],
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
        .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(checks["supervisor"].error.as_deref(), Some("timed out after 100ms"));
        assert!(checks["liveness"].succeeded);
    }

    #[tokio::test]
    async fn outer_deadline_bounds_the_whole_run() {
        let start = Instant::now();
        let checks = collect(
            vec![hung("liveness"), hung("supervisor"), ok("logs")],
            Duration::from_secs(60),
            Duration::from_millis(200),
        )
        .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(
            checks["liveness"].error.as_deref(),
            Some("aggregator deadline exceeded")
        );
        assert_eq!(
            checks["supervisor"].error.as_deref(),
            Some("aggregator deadline exceeded")
        );
        assert!(checks["logs"].succeeded);
    }

    #[tokio::test]
    async fn probes_run_concurrently() {
        let slow = |name: &str| {
            PendingProbe::new(name, async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                ProbeOutcome::success(&())
            })
        };
        let start = Instant::now();
        let checks = collect(
            vec![slow("a"), slow("b"), slow("c")],
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await;

        assert!(checks.values().all(|r| r.succeeded));
        assert!(start.elapsed() < Duration::from_millis(800));
    }
}
