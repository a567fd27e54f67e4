// ────────────────────────────────
// src/proxy/proxy.rs
// Applies the access policy and forwards allowed requests upstream
// ────────────────────────────────

use super::headers::{self, X_REQUEST_ID};
use super::policy::{AccessPolicy, RoutingDecision};
use super::upgrade;
use super::upstream::Upstream;
use crate::config::GatewayConfig;
use crate::metrics::{MetricsCollector, Timer};
use anyhow::Result;
use hyper::header::HeaderValue;
use hyper::{Body, Request, Response, StatusCode, Version};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub struct Proxy {
    policy: AccessPolicy,
    upstream: Upstream,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(config: &GatewayConfig, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        Ok(Self {
            policy: AccessPolicy::from_config(config),
            upstream: Upstream::new(&config.upstream)?,
            metrics,
        })
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Handle one request. Never fails: denials and upstream faults both
    /// become responses.
    pub async fn handle(&self, req: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let request_id = req
            .headers()
            .get(X_REQUEST_ID)
            .cloned()
            .unwrap_or_else(|| {
                HeaderValue::from_str(&Uuid::new_v4().to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
            });
        let decision = self.policy.decide(req.uri().path());

        let span = info_span!(
            "request",
            request_id = request_id.to_str().unwrap_or("-"),
            method = %req.method(),
            path = %req.uri().path(),
            decision = decision.label(),
        );

        async move {
            if let Some(metrics) = &self.metrics {
                metrics.record_decision(decision.label());
            }

            match decision {
                RoutingDecision::Deny(body) => {
                    debug!("request denied by access policy");
                    body.into_response()
                }
                RoutingDecision::Forward(_) => {
                    match self.forward(req, client_addr, &request_id).await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!(error = %e, "upstream request failed");
                            e.into()
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn forward(
        &self,
        mut req: Request<Body>,
        client_addr: Option<SocketAddr>,
        request_id: &HeaderValue,
    ) -> Result<Response<Body>, ProxyError> {
        let is_upgrade = headers::is_upgrade_request(req.headers());
        let client_upgrade = is_upgrade.then(|| hyper::upgrade::on(&mut req));

        let (mut parts, body) = req.into_parts();
        parts.uri = self.upstream.target_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        headers::prepare_upstream_request(
            &mut parts.headers,
            self.upstream.host_header(),
            client_addr,
            request_id,
            is_upgrade,
        );

        let timer = Timer::new();
        let result = self.upstream.send(Request::from_parts(parts, body)).await;
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(ProxyError::Timeout(_)) => "timeout",
                Err(_) => "error",
            };
            metrics.record_upstream(outcome, timer.elapsed());
        }
        let mut response = result?;

        if let Some(client_upgrade) = client_upgrade {
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                let upstream_upgrade = hyper::upgrade::on(&mut response);
                upgrade::spawn_tunnel(client_upgrade, upstream_upgrade, self.metrics.clone());
                return Ok(response);
            }
            debug!(status = %response.status(), "upstream declined upgrade");
        }

        headers::strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

// Custom error type for proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream unreachable: {0}")]
    Unreachable(#[from] hyper::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("could not build upstream request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        let message = match err {
            ProxyError::Unreachable(_) => "Upstream service is unreachable",
            ProxyError::Timeout(_) => "Upstream service timed out",
            ProxyError::InvalidRequest(_) => "Request could not be forwarded",
        };

        super::json_response(
            status,
            &json!({
                "error": status.canonical_reason().unwrap_or("Bad Gateway"),
                "message": message,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn connection_faults_map_to_gateway_statuses() {
        assert_eq!(
            ProxyError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        let response: Response<Body> = ProxyError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn denied_request_gets_structured_403() {
        let config = Config::default();
        let proxy = Proxy::new(&config.gateway, None).unwrap();
        let req = Request::get("/agents/list").body(Body::empty()).unwrap();

        let response = proxy.handle(req, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "api_only_mode");
        assert_eq!(json["error"], "Web UI is disabled");
    }
}
