// src/health/liveness.rs
use super::probe::ProbeOutcome;
use anyhow::{Context, Result};
use reqwest::{redirect, Client};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP GET against an ordered list of candidate endpoints; the first
/// 2xx/3xx answer wins and the rest are skipped. Each endpoint has its own
/// timeout, so a hung candidate still leaves time for the next one.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    client: Client,
    base: Url,
    endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointAttempt {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessStatus {
    pub endpoint: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<EndpointAttempt>,
}

#[derive(Debug, Clone, Serialize)]
struct LivenessFailure {
    attempts: Vec<EndpointAttempt>,
}

impl LivenessProbe {
    pub fn new(
        host: &str,
        port: u16,
        endpoints: Vec<String>,
        endpoint_timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(&format!("http://{}:{}/", host, port))
            .with_context(|| format!("Invalid health check target {}:{}", host, port))?;
        let client = Client::builder()
            .timeout(endpoint_timeout)
            .redirect(redirect::Policy::none())
            .user_agent(concat!("agent-gateway-healthcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base,
            endpoints,
        })
    }

    pub async fn run(&self) -> ProbeOutcome {
        let mut failed_attempts = Vec::new();

        for endpoint in &self.endpoints {
            let attempt = self.check_endpoint(endpoint).await;
            match (attempt.error.is_none(), attempt.status_code) {
                (true, Some(status_code)) => {
                    debug!(endpoint = %endpoint, status_code, "liveness endpoint healthy");
                    return ProbeOutcome::success(&LivenessStatus {
                        endpoint: attempt.endpoint,
                        status_code,
                        failed_attempts,
                    });
                }
                _ => {
                    debug!(endpoint = %endpoint, error = ?attempt.error, "liveness endpoint failed");
                    failed_attempts.push(attempt);
                }
            }
        }

        ProbeOutcome::failure(format!("all {} endpoints failed", failed_attempts.len()))
            .with_payload(&LivenessFailure {
                attempts: failed_attempts,
            })
    }

    async fn check_endpoint(&self, endpoint: &str) -> EndpointAttempt {
        let mut attempt = EndpointAttempt {
            endpoint: endpoint.to_string(),
            status_code: None,
            error: None,
        };

        let url = match self.base.join(endpoint) {
            Ok(url) => url,
            Err(e) => {
                attempt.error = Some(format!("invalid endpoint: {}", e));
                return attempt;
            }
        };

        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                attempt.status_code = Some(status.as_u16());
                if !(status.is_success() || status.is_redirection()) {
                    attempt.error = Some(format!("HTTP {}", status.as_u16()));
                }
            }
            Err(e) if e.is_timeout() => attempt.error = Some("timed out".to_string()),
            Err(e) => attempt.error = Some(e.to_string()),
        }

        attempt
    }
}
