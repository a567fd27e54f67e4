// src/config/models.rs
use super::split_list;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Raw, flat settings as they arrive from files and the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_port: u16,
    pub upstream_scheme: String,
    pub upstream_host: String,
    pub upstream_port: Option<u16>,
    pub elizaos_internal_port: Option<u16>,
    pub upstream_timeout_ms: u64,
    /// Only a case-insensitive `true` enables the UI; anything else keeps it off.
    pub web_ui_enabled: String,
    pub allowed_prefixes: String,
    pub api_documentation: String,
    pub metrics_port: Option<u16>,
    pub host: String,
    pub health_port: Option<u16>,
    pub health_endpoints: String,
    pub health_endpoint_timeout_ms: Option<u64>,
    pub health_probes: String,
    pub critical_probes: String,
    pub probe_timeout_ms: u64,
    pub health_deadline_ms: u64,
    pub supervisor_command: String,
    pub supervisor_args: String,
    pub supervisor_process: String,
    pub data_dir: String,
    pub log_files: String,
    pub service_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_port: 3000,
            upstream_scheme: "http".to_string(),
            upstream_host: "127.0.0.1".to_string(),
            upstream_port: None,
            elizaos_internal_port: None,
            upstream_timeout_ms: 30_000,
            web_ui_enabled: "false".to_string(),
            allowed_prefixes: "/api".to_string(),
            api_documentation: "/api/docs".to_string(),
            metrics_port: None,
            host: "localhost".to_string(),
            health_port: None,
            health_endpoints: "/health,/api/health,/".to_string(),
            health_endpoint_timeout_ms: None,
            health_probes: "liveness,supervisor,logs".to_string(),
            critical_probes: "liveness".to_string(),
            probe_timeout_ms: 5_000,
            health_deadline_ms: 10_000,
            supervisor_command: "/app/node_modules/.bin/pm2".to_string(),
            supervisor_args: "jlist".to_string(),
            supervisor_process: "elizaos".to_string(),
            data_dir: "/app/data".to_string(),
            log_files: "/app/logs/elizaos-out.log,/app/logs/elizaos-error.log,/app/logs/elizaos-combined.log"
                .to_string(),
            service_name: "elizaos".to_string(),
        }
    }
}

/// Immutable configuration shared by the gateway and the health aggregator.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub gateway: GatewayConfig,
    pub metrics: Option<MetricsConfig>,
    pub health: HealthConfig,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_port: u16,
    pub upstream: UpstreamConfig,
    pub allowed_prefixes: Vec<String>,
    pub web_ui_enabled: bool,
    pub api_documentation: String,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    /// `host:port`, used for both the request URI and the rewritten `Host`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub host: String,
    pub port: u16,
    pub endpoints: Vec<String>,
    pub probes: Vec<ProbeKind>,
    pub critical: Vec<ProbeKind>,
    pub probe_timeout_ms: u64,
    /// HTTP timeout for a single liveness endpoint.
    pub endpoint_timeout_ms: u64,
    pub deadline_ms: u64,
    pub supervisor: SupervisorConfig,
    pub data_dir: PathBuf,
    pub log_files: Vec<PathBuf>,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// `host:port` the liveness probe targets.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: String,
    pub args: Vec<String>,
    pub process_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Liveness,
    Supervisor,
    Resources,
    Logs,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Liveness => "liveness",
            ProbeKind::Supervisor => "supervisor",
            ProbeKind::Resources => "resources",
            ProbeKind::Logs => "logs",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "liveness" | "api" => Ok(ProbeKind::Liveness),
            "supervisor" | "pm2" => Ok(ProbeKind::Supervisor),
            "resources" => Ok(ProbeKind::Resources),
            "logs" => Ok(ProbeKind::Logs),
            other => bail!("unknown probe '{}'", other),
        }
    }
}

/// Leave a tenth of the probe budget as headroom and share the rest between
/// the endpoints, so every candidate gets its turn before the probe times out.
fn default_endpoint_timeout_ms(probe_timeout_ms: u64, endpoints: usize) -> u64 {
    let endpoints = endpoints.max(1) as u64;
    (probe_timeout_ms.saturating_mul(9) / 10 / endpoints).max(1)
}

fn parse_probes(raw: &str) -> Result<Vec<ProbeKind>> {
    let mut probes = Vec::new();
    for name in split_list(raw) {
        let kind: ProbeKind = name.parse()?;
        if !probes.contains(&kind) {
            probes.push(kind);
        }
    }
    Ok(probes)
}

impl Config {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let upstream_port = settings
            .upstream_port
            .or(settings.elizaos_internal_port)
            .unwrap_or(3001);
        let endpoints = split_list(&settings.health_endpoints);
        let endpoint_timeout_ms = settings.health_endpoint_timeout_ms.unwrap_or_else(|| {
            default_endpoint_timeout_ms(settings.probe_timeout_ms, endpoints.len())
        });

        Ok(Self {
            service_name: settings.service_name,
            gateway: GatewayConfig {
                listen_port: settings.api_port,
                upstream: UpstreamConfig {
                    scheme: settings.upstream_scheme.to_ascii_lowercase(),
                    host: settings.upstream_host,
                    port: upstream_port,
                    timeout_ms: settings.upstream_timeout_ms,
                },
                allowed_prefixes: split_list(&settings.allowed_prefixes),
                web_ui_enabled: settings.web_ui_enabled.trim().eq_ignore_ascii_case("true"),
                api_documentation: settings.api_documentation,
            },
            metrics: settings.metrics_port.map(|port| MetricsConfig {
                port,
                path: "/metrics".to_string(),
            }),
            health: HealthConfig {
                host: settings.host,
                port: settings.health_port.unwrap_or(settings.api_port),
                endpoints,
                probes: parse_probes(&settings.health_probes)?,
                critical: parse_probes(&settings.critical_probes)?,
                probe_timeout_ms: settings.probe_timeout_ms,
                endpoint_timeout_ms,
                deadline_ms: settings.health_deadline_ms,
                supervisor: SupervisorConfig {
                    command: settings.supervisor_command,
                    args: settings
                        .supervisor_args
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                    process_name: settings.supervisor_process,
                },
                data_dir: PathBuf::from(settings.data_dir),
                log_files: split_list(&settings.log_files)
                    .into_iter()
                    .map(PathBuf::from)
                    .collect(),
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        let gateway = &self.gateway;
        if gateway.allowed_prefixes.is_empty() {
            bail!("At least one allowed prefix must be configured");
        }
        for prefix in &gateway.allowed_prefixes {
            if !prefix.starts_with('/') {
                bail!("Allowed prefix '{}' must start with '/'", prefix);
            }
        }
        if gateway.upstream.scheme != "http" && gateway.upstream.scheme != "https" {
            bail!("Unsupported upstream scheme '{}'", gateway.upstream.scheme);
        }
        if gateway.upstream.host.is_empty() {
            bail!("Upstream host must not be empty");
        }
        if gateway.upstream.timeout_ms == 0 {
            bail!("Upstream timeout must be greater than 0");
        }

        let health = &self.health;
        if health.probe_timeout_ms == 0 || health.deadline_ms == 0 {
            bail!("Health check timeouts must be greater than 0");
        }
        if health.critical.is_empty() {
            bail!("At least one critical probe must be configured");
        }
        for kind in &health.critical {
            if !health.probes.contains(kind) {
                bail!("Critical probe '{}' is not enabled", kind);
            }
        }
        if health.probes.contains(&ProbeKind::Liveness) {
            if health.endpoints.is_empty() {
                bail!("Liveness probe requires at least one endpoint");
            }
            let needed = health
                .endpoint_timeout_ms
                .saturating_mul(health.endpoints.len() as u64);
            if health.endpoint_timeout_ms == 0 || needed >= health.probe_timeout_ms {
                bail!(
                    "Liveness endpoint timeout {}ms x {} endpoints must fit within the {}ms probe timeout",
                    health.endpoint_timeout_ms,
                    health.endpoints.len(),
                    health.probe_timeout_ms
                );
            }
        }
        if health.probes.contains(&ProbeKind::Supervisor) && health.supervisor.command.is_empty() {
            bail!("Supervisor probe requires a command");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        // Defaults are known-good; parsing them cannot fail.
        match Self::from_settings(Settings::default()) {
            Ok(config) => config,
            Err(e) => unreachable!("default settings are invalid: {}", e),
        }
    }
}
