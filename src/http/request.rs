//! Request inspection.
//!
//! # Responsibilities
//! - Resolve the client identity used to bucket rate limit counters
//! - Name the request ID header set on every request
//!
//! # Design Decisions
//! - The peer address comes from axum's `ConnectInfo`; requests without it
//!   (in-process calls, tests) share the `"unknown"` bucket
//! - `X-Forwarded-For` is only honored when explicitly trusted

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Client key for requests whose address cannot be resolved.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Identity string used to bucket rate limit counters for `req`.
pub fn client_key(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Request ID set by the request-id layer, or `"unknown"`.
pub fn request_id(req: &Request<Body>) -> String {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(peer: Option<&str>, forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/transactions");
        if let Some(value) = forwarded {
            builder = builder.header(X_FORWARDED_FOR, value);
        }
        let mut req = builder.body(Body::default()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req
    }

    #[test]
    fn test_peer_address() {
        assert_eq!(
            client_key(&request(Some("192.168.1.7:41000"), None), false),
            "192.168.1.7"
        );
        assert_eq!(client_key(&request(Some("[::1]:8080"), None), false), "::1");
    }

    #[test]
    fn test_unknown_without_peer() {
        assert_eq!(client_key(&request(None, None), false), UNKNOWN_CLIENT);
        assert_eq!(client_key(&request(None, Some("")), true), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let req = request(Some("10.0.0.1:1"), Some(" 203.0.113.9 , 10.0.0.1"));
        assert_eq!(client_key(&req, true), "203.0.113.9");
        assert_eq!(client_key(&req, false), "10.0.0.1");
    }

    #[test]
    fn test_request_id() {
        let req = Request::builder()
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::default())
            .unwrap();
        assert_eq!(request_id(&req), "abc-123");
        assert_eq!(request_id(&request(None, None)), "unknown");
    }
}
