// src/proxy/upstream.rs
use super::ProxyError;
use crate::config::UpstreamConfig;
use anyhow::{Context, Result};
use hyper::client::HttpConnector;
use hyper::header::HeaderValue;
use hyper::http::uri::{Authority, Scheme};
use hyper::{Body, Client, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::time::Duration;

/// The single upstream every forwarded request goes to.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
    timeout: Duration,
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let authority: Authority = config
            .authority()
            .parse()
            .with_context(|| format!("Invalid upstream address '{}'", config.authority()))?;
        let scheme: Scheme = config
            .scheme
            .parse()
            .with_context(|| format!("Invalid upstream scheme '{}'", config.scheme))?;
        let host_header = HeaderValue::from_str(authority.as_str())
            .context("Upstream address is not a valid Host header")?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.timeout()));
        let https = HttpsConnector::new_with_connector(http);
        let client = Client::builder().build::<_, Body>(https);

        Ok(Self {
            scheme,
            authority,
            host_header,
            timeout: config.timeout(),
            client,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }

    /// Re-target the client's URI at the upstream, keeping path and query untouched.
    pub fn target_uri(&self, original: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = original
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }

    /// Send a request and wait for the response head. The bound covers
    /// connect and head only; bodies and upgraded streams are never timed out.
    pub async fn send(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProxyError::Timeout(self.timeout)),
        }
    }
}
