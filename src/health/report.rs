// src/health/report.rs
use super::probe::ProbeResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Healthy,
    Unhealthy,
    /// The health check tooling itself failed; says nothing about the service.
    Error,
}

/// One health check run. Built fresh each time and emitted once.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ReportStatus,
    pub overall: bool,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub critical: Vec<String>,
    pub checks: BTreeMap<String, ProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    /// Overall health is the AND over the critical probes. A critical probe
    /// with no result counts as failed; an empty critical set is unhealthy.
    pub fn reduce(
        service: &str,
        target: Option<&str>,
        critical: &[String],
        checks: BTreeMap<String, ProbeResult>,
    ) -> Self {
        let overall = !critical.is_empty()
            && critical
                .iter()
                .all(|name| checks.get(name).map_or(false, |r| r.succeeded));

        Self {
            status: if overall {
                ReportStatus::Healthy
            } else {
                ReportStatus::Unhealthy
            },
            overall,
            timestamp: Utc::now(),
            service: service.to_string(),
            target: target.map(str::to_string),
            critical: critical.to_vec(),
            checks,
            error: None,
        }
    }

    pub fn crashed(service: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            overall: false,
            timestamp: Utc::now(),
            service: service.unwrap_or("unknown").to_string(),
            target: None,
            critical: Vec::new(),
            checks: BTreeMap::new(),
            error: Some(error.into()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            ReportStatus::Healthy => 0,
            ReportStatus::Unhealthy | ReportStatus::Error => 1,
        }
    }

    /// Human-readable rendering for the console.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Health check for {}", self.service);
        if let Some(target) = &self.target {
            let _ = writeln!(out, "   Target: {}", target);
        }
        let _ = writeln!(out, "   Time: {}", self.timestamp.to_rfc3339());

        for (name, result) in &self.checks {
            let critical = if self.critical.contains(name) { " [critical]" } else { "" };
            let verdict = if result.succeeded { "OK" } else { "FAILED" };
            let _ = writeln!(out, "\n{}{}: {} ({}ms)", name, critical, verdict, result.latency_ms);
            if let Some(error) = &result.error {
                let _ = writeln!(out, "   Error: {}", error);
            }
            for line in detail_lines(name, &result.payload) {
                let _ = writeln!(out, "   {}", line);
            }
        }

        match self.status {
            ReportStatus::Healthy => {
                let _ = writeln!(out, "\nOverall Health: HEALTHY");
            }
            ReportStatus::Unhealthy => {
                let _ = writeln!(out, "\nOverall Health: UNHEALTHY");
            }
            ReportStatus::Error => {
                let _ = writeln!(
                    out,
                    "\nHealth check crashed: {}",
                    self.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        out
    }
}

fn detail_lines(name: &str, payload: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    match name {
        "liveness" => {
            if let (Some(endpoint), Some(code)) = (payload["endpoint"].as_str(), payload["status_code"].as_u64()) {
                lines.push(format!("Endpoint: {} ({})", endpoint, code));
            }
            if let Some(attempts) = payload["attempts"].as_array() {
                for attempt in attempts {
                    lines.push(format!(
                        "{}: {}",
                        attempt["endpoint"].as_str().unwrap_or("?"),
                        attempt["error"].as_str().unwrap_or("failed")
                    ));
                }
            }
        }
        "supervisor" => {
            if let Some(status) = payload["status"].as_str() {
                let uptime = payload["uptime_ms"].as_i64().map(|ms| ms / 1000).unwrap_or(0);
                lines.push(format!(
                    "Process: {}, Uptime: {}s, Restarts: {}",
                    status,
                    uptime,
                    payload["restarts"].as_u64().unwrap_or(0)
                ));
                lines.push(format!(
                    "Resources: {}MB RAM, {}% CPU",
                    payload["memory_bytes"].as_u64().unwrap_or(0) / 1024 / 1024,
                    payload["cpu_percent"].as_f64().unwrap_or(0.0)
                ));
            }
        }
        "resources" => {
            if payload.is_object() {
                lines.push(format!(
                    "Memory: {}% used, Load: {:.2} {:.2} {:.2}, Disk: {}% used",
                    payload["memory"]["used_percent"].as_f64().unwrap_or(0.0),
                    payload["load_average"]["one"].as_f64().unwrap_or(0.0),
                    payload["load_average"]["five"].as_f64().unwrap_or(0.0),
                    payload["load_average"]["fifteen"].as_f64().unwrap_or(0.0),
                    payload["disk"]["used_percent"].as_f64().unwrap_or(0.0)
                ));
            }
        }
        "logs" => {
            if let Some(files) = payload["files"].as_object() {
                for (file, info) in files {
                    if info["exists"].as_bool().unwrap_or(false) {
                        let content = if info["has_content"].as_bool().unwrap_or(false) {
                            "[HAS CONTENT]"
                        } else {
                            "[EMPTY]"
                        };
                        lines.push(format!(
                            "{}: {} bytes, {}s ago {}",
                            file,
                            info["size"].as_u64().unwrap_or(0),
                            info["age_secs"].as_u64().unwrap_or(0),
                            content
                        ));
                        // The preview is in file order; the newest line is last.
                        if let Some(latest) = info["preview"].as_str().and_then(|p| p.lines().last()) {
                            let latest: String = latest.chars().take(80).collect();
                            lines.push(format!("  Latest: {}", latest));
                        }
                    } else {
                        lines.push(format!("{}: Missing", file));
                    }
                }
            }
        }
        _ => {}
    }
    lines
}
