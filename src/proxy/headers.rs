// src/proxy/headers.rs
// Header rewriting between client and upstream.
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST, UPGRADE};
use std::net::SocketAddr;

pub const X_REQUEST_ID: &str = "x-request-id";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// `Connection: upgrade` together with an `Upgrade` header.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE) && connection_tokens(headers).iter().any(|t| t == "upgrade")
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for token in connection_tokens(headers) {
        if let Ok(name) = HeaderName::from_bytes(token.as_bytes()) {
            headers.remove(name);
        }
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Rewrite request headers so the upstream sees the request as addressed to itself.
pub fn prepare_upstream_request(
    headers: &mut HeaderMap,
    upstream_authority: &HeaderValue,
    client_addr: Option<SocketAddr>,
    request_id: &HeaderValue,
    upgrade: bool,
) {
    let upgrade_protocol = headers.get(UPGRADE).cloned();
    let original_host = headers.get(HOST).cloned();

    strip_hop_by_hop(headers);

    if upgrade {
        if let Some(protocol) = upgrade_protocol {
            headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(UPGRADE, protocol);
        }
    }

    headers.insert(HOST, upstream_authority.clone());

    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_REQUEST_ID) {
        headers.insert(X_REQUEST_ID, request_id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn detects_upgrade_requests() {
        assert!(is_upgrade_request(&headers(&[
            ("connection", "keep-alive, Upgrade"),
            ("upgrade", "websocket"),
        ])));
        assert!(!is_upgrade_request(&headers(&[("upgrade", "websocket")])));
        assert!(!is_upgrade_request(&headers(&[("connection", "upgrade")])));
    }

    #[test]
    fn strips_connection_listed_headers() {
        let mut map = headers(&[
            ("connection", "x-internal"),
            ("x-internal", "1"),
            ("keep-alive", "timeout=5"),
            ("accept", "*/*"),
        ]);
        strip_hop_by_hop(&mut map);
        assert!(!map.contains_key("x-internal"));
        assert!(!map.contains_key("keep-alive"));
        assert!(!map.contains_key("connection"));
        assert!(map.contains_key("accept"));
    }

    #[test]
    fn rewrites_host_and_appends_forwarding_headers() {
        let mut map = headers(&[("host", "gateway.example"), ("x-forwarded-for", "10.0.0.1")]);
        let addr: SocketAddr = "192.168.1.5:5555".parse().unwrap();
        prepare_upstream_request(
            &mut map,
            &HeaderValue::from_static("127.0.0.1:3001"),
            Some(addr),
            &HeaderValue::from_static("req-1"),
            false,
        );
        assert_eq!(map["host"], "127.0.0.1:3001");
        assert_eq!(map["x-forwarded-host"], "gateway.example");
        assert_eq!(map["x-forwarded-for"], "10.0.0.1, 192.168.1.5");
        assert_eq!(map["x-request-id"], "req-1");
    }

    #[test]
    fn keeps_upgrade_headers_for_upgrades() {
        let mut map = headers(&[("connection", "Upgrade"), ("upgrade", "websocket")]);
        prepare_upstream_request(
            &mut map,
            &HeaderValue::from_static("127.0.0.1:3001"),
            None,
            &HeaderValue::from_static("req-2"),
            true,
        );
        assert_eq!(map["connection"], "upgrade");
        assert_eq!(map["upgrade"], "websocket");
    }

    #[test]
    fn client_request_id_is_preserved() {
        let mut map = headers(&[("x-request-id", "from-client")]);
        prepare_upstream_request(
            &mut map,
            &HeaderValue::from_static("127.0.0.1:3001"),
            None,
            &HeaderValue::from_static("generated"),
            false,
        );
        assert_eq!(map["x-request-id"], "from-client");
    }
}
