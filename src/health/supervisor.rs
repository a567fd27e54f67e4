// src/health/supervisor.rs
use super::probe::ProbeOutcome;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Queries the process supervisor's JSON status listing (`pm2 jlist`) for
/// the upstream process.
#[derive(Debug, Clone)]
pub struct SupervisorProbe {
    command: String,
    args: Vec<String>,
    process_name: String,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervisor query failed: {0}")]
    Query(String),

    #[error("supervisor query timed out after {0:?}")]
    Timeout(Duration),

    #[error("supervisor returned an unparseable listing: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("process '{0}' not found in supervisor listing")]
    NotFound(String),

    #[error("process '{name}' is {}", .status.status)]
    NotRunning { name: String, status: ProcessStatus },
}

#[derive(Debug, Deserialize)]
struct ListedProcess {
    name: String,
    pm2_env: ProcessEnv,
    #[serde(default)]
    monit: Option<Monit>,
}

#[derive(Debug, Deserialize)]
struct ProcessEnv {
    status: String,
    #[serde(default)]
    pm_uptime: Option<i64>,
    #[serde(default)]
    restart_time: u32,
}

#[derive(Debug, Default, Deserialize)]
struct Monit {
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    cpu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<i64>,
    pub restarts: u32,
    pub memory_bytes: u64,
    pub cpu_percent: f64,
}

/// Find `process_name` in a listing and decide whether it is running.
pub fn interpret_listing(
    listing: &[u8],
    process_name: &str,
    now_ms: i64,
) -> Result<ProcessStatus, SupervisorError> {
    let processes: Vec<ListedProcess> = serde_json::from_slice(listing)?;
    let process = processes
        .into_iter()
        .find(|p| p.name == process_name)
        .ok_or_else(|| SupervisorError::NotFound(process_name.to_string()))?;

    let monit = process.monit.unwrap_or_default();
    let status = ProcessStatus {
        uptime_ms: process
            .pm2_env
            .pm_uptime
            .map(|started| now_ms.saturating_sub(started).max(0)),
        restarts: process.pm2_env.restart_time,
        memory_bytes: monit.memory,
        cpu_percent: monit.cpu,
        status: process.pm2_env.status,
    };

    if status.status == "online" {
        Ok(status)
    } else {
        Err(SupervisorError::NotRunning {
            name: process_name.to_string(),
            status,
        })
    }
}

impl SupervisorProbe {
    pub fn new(command: String, args: Vec<String>, process_name: String, timeout: Duration) -> Self {
        Self {
            command,
            args,
            process_name,
            timeout,
        }
    }

    pub async fn run(&self) -> ProbeOutcome {
        let result = match self.query().await {
            Ok(listing) => {
                interpret_listing(&listing, &self.process_name, Utc::now().timestamp_millis())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(status) => {
                debug!(process = %self.process_name, restarts = status.restarts, "supervised process online");
                ProbeOutcome::success(&status)
            }
            Err(SupervisorError::NotRunning { name, status }) => {
                let error = format!("process '{}' is {}", name, status.status);
                ProbeOutcome::failure(error).with_payload(&status)
            }
            Err(e) => ProbeOutcome::failure(e.to_string()),
        }
    }

    async fn query(&self) -> Result<Vec<u8>, SupervisorError> {
        let child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| SupervisorError::Timeout(self.timeout))?
            .map_err(|e| SupervisorError::Query(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SupervisorError::Query(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}
