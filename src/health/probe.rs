// src/health/probe.rs
use super::liveness::LivenessProbe;
use super::logs::LogProbe;
use super::resources::ResourceProbe;
use super::supervisor::SupervisorProbe;
use crate::config::{HealthConfig, ProbeKind};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// What a probe reports before the aggregator stamps it with name and latency.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub succeeded: bool,
    pub payload: Value,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn success<T: Serialize>(payload: &T) -> Self {
        Self {
            succeeded: true,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Attach diagnostic detail to a failure.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl ProbeResult {
    pub fn from_outcome(name: impl Into<String>, outcome: ProbeOutcome, latency: Duration) -> Self {
        Self {
            name: name.into(),
            succeeded: outcome.succeeded,
            payload: outcome.payload,
            error: outcome.error,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>, latency: Duration) -> Self {
        Self::from_outcome(name, ProbeOutcome::failure(error), latency)
    }
}

/// The closed set of subsystems the aggregator knows how to probe.
#[derive(Debug, Clone)]
pub enum Probe {
    Liveness(LivenessProbe),
    Supervisor(SupervisorProbe),
    Resources(ResourceProbe),
    Logs(LogProbe),
}

impl Probe {
    pub fn from_config(kind: ProbeKind, config: &HealthConfig) -> Result<Self> {
        Ok(match kind {
            ProbeKind::Liveness => Probe::Liveness(LivenessProbe::new(
                &config.host,
                config.port,
                config.endpoints.clone(),
                config.endpoint_timeout(),
            )?),
            ProbeKind::Supervisor => Probe::Supervisor(SupervisorProbe::new(
                config.supervisor.command.clone(),
                config.supervisor.args.clone(),
                config.supervisor.process_name.clone(),
                config.probe_timeout(),
            )),
            ProbeKind::Resources => Probe::Resources(ResourceProbe::new(config.data_dir.clone())),
            ProbeKind::Logs => Probe::Logs(LogProbe::new(config.log_files.clone())),
        })
    }

    pub fn kind(&self) -> ProbeKind {
        match self {
            Probe::Liveness(_) => ProbeKind::Liveness,
            Probe::Supervisor(_) => ProbeKind::Supervisor,
            Probe::Resources(_) => ProbeKind::Resources,
            Probe::Logs(_) => ProbeKind::Logs,
        }
    }

    pub async fn run(&self) -> ProbeOutcome {
        match self {
            Probe::Liveness(probe) => probe.run().await,
            Probe::Supervisor(probe) => probe.run().await,
            Probe::Resources(probe) => probe.run().await,
            Probe::Logs(probe) => probe.run().await,
        }
    }
}
