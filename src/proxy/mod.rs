//
// src/proxy/mod.rs
//
mod headers;
mod policy;
mod proxy;
mod upgrade;
mod upstream;

pub use headers::{is_upgrade_request, strip_hop_by_hop, X_REQUEST_ID};
pub use policy::{AccessPolicy, DenialBody, Route, RoutingDecision};
pub use proxy::{Proxy, ProxyError};
pub use upstream::Upstream;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
