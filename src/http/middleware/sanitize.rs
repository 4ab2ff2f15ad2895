//! Sanitization of path params, query and JSON body.
//!
//! Each of the three fields is sanitized independently and only replaced when
//! the rewrite changed something, so clean requests reach the upstream
//! byte-for-byte.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
        uri::PathAndQuery,
        HeaderMap, HeaderValue, Request, StatusCode, Uri,
    },
    middleware::Next,
    response::Response,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::http::response;
use crate::observability::metrics;
use crate::security::Sanitizer;

/// Characters escaped when a rewritten path segment is put back in the URI.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// State for [`sanitize_middleware`].
#[derive(Debug, Clone)]
pub struct SanitizeState {
    pub sanitizer: Sanitizer,
    /// Largest JSON body buffered for sanitization.
    pub max_body_size: usize,
}

pub async fn sanitize_middleware(
    State(state): State<Arc<SanitizeState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    if let Some(uri) = sanitize_uri(&state.sanitizer, &parts.uri) {
        tracing::debug!(from = %parts.uri, to = %uri, "Sanitized request URI");
        parts.uri = uri;
    }

    let body = if is_json(&parts.headers) {
        let declared = declared_length(&parts.headers);
        if declared.is_some_and(|len| len > state.max_body_size) {
            return too_large();
        }
        let bytes = match axum::body::to_bytes(body, state.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to buffer JSON body");
                return too_large();
            }
        };
        match sanitize_body(&state.sanitizer, &bytes) {
            Some(rewritten) => {
                metrics::record_sanitized("body");
                parts.headers.remove(TRANSFER_ENCODING);
                parts
                    .headers
                    .insert(CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
                Body::from(rewritten)
            }
            None => Body::from(bytes),
        }
    } else {
        body
    };

    next.run(Request::from_parts(parts, body)).await
}

fn too_large() -> Response {
    response::error(
        StatusCode::PAYLOAD_TOO_LARGE,
        "PAYLOAD_TOO_LARGE",
        "Request body too large",
    )
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Sanitized JSON body, or `None` when the body is not JSON or nothing changed.
fn sanitize_body(sanitizer: &Sanitizer, bytes: &Bytes) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let sanitized = sanitizer.sanitize(value.clone());
    if sanitized == value {
        return None;
    }
    serde_json::to_vec(&sanitized).ok()
}

/// URI with sanitized path params and query, or `None` when nothing changed.
fn sanitize_uri(sanitizer: &Sanitizer, uri: &Uri) -> Option<Uri> {
    let path = sanitize_path(sanitizer, uri.path());
    let query = uri.query().and_then(|q| sanitize_query(sanitizer, q));
    if path.is_none() && query.is_none() {
        return None;
    }
    if path.is_some() {
        metrics::record_sanitized("params");
    }
    if query.is_some() {
        metrics::record_sanitized("query");
    }

    let path = path.unwrap_or_else(|| uri.path().to_string());
    let path_and_query = match query.as_deref().or(uri.query()) {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse::<PathAndQuery>().ok()?);
    Uri::from_parts(parts).ok()
}

fn sanitize_path(sanitizer: &Sanitizer, path: &str) -> Option<String> {
    let mut changed = false;
    let segments: Vec<String> = path
        .split('/')
        .map(|segment| {
            let Ok(decoded) = percent_decode_str(segment).decode_utf8() else {
                return segment.to_string();
            };
            match sanitizer.sanitize_string(&decoded) {
                std::borrow::Cow::Owned(rewritten) => {
                    changed = true;
                    utf8_percent_encode(&rewritten, PATH_SEGMENT).to_string()
                }
                std::borrow::Cow::Borrowed(_) => segment.to_string(),
            }
        })
        .collect();

    changed.then(|| segments.join("/"))
}

fn sanitize_query(sanitizer: &Sanitizer, query: &str) -> Option<String> {
    let value = query_to_value(query);
    let sanitized = sanitizer.sanitize(value.clone());
    if sanitized == value {
        return None;
    }
    Some(value_to_query(&sanitized))
}

/// Decode a query string into an object. Repeated keys become arrays.
fn query_to_value(query: &str) -> Value {
    let mut map = Map::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

fn value_to_query(value: &Value) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    if let Value::Object(map) = value {
        for (key, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        serializer.append_pair(key, &scalar_to_string(item));
                    }
                }
                other => {
                    serializer.append_pair(key, &scalar_to_string(other));
                }
            }
        }
    }
    serializer.finish()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_roundtrip_with_repeated_keys() {
        let value = query_to_value("tag=food&tag=rent&limit=5");
        assert_eq!(value, json!({"tag": ["food", "rent"], "limit": "5"}));
        assert_eq!(value_to_query(&value), "limit=5&tag=food&tag=rent");
    }

    #[test]
    fn test_sanitize_query() {
        let sanitizer = Sanitizer::default();
        assert_eq!(sanitize_query(&sanitizer, "q=groceries&page=2"), None);

        let rewritten = sanitize_query(&sanitizer, "q=%24%7Bprocess.env%7D&page=2").unwrap();
        let decoded = query_to_value(&rewritten);
        assert_eq!(decoded, json!({"q": "[TEMPLATE_LITERAL_REMOVED]", "page": "2"}));
    }

    #[test]
    fn test_sanitize_path_segments() {
        let sanitizer = Sanitizer::default();
        assert_eq!(sanitize_path(&sanitizer, "/api/categories/42"), None);

        let rewritten =
            sanitize_path(&sanitizer, "/api/categories/%3Cscript%3Ex%3C%2Fscript%3E").unwrap();
        assert_eq!(rewritten, "/api/categories/%5BSCRIPT_REMOVED%5D");
        assert_eq!(
            percent_decode_str(rewritten.rsplit('/').next().unwrap())
                .decode_utf8()
                .unwrap(),
            "[SCRIPT_REMOVED]"
        );
    }

    #[test]
    fn test_sanitize_uri_keeps_clean_parts() {
        let sanitizer = Sanitizer::default();
        let uri: Uri = "/api/notes/onclick%3Dalert(1)?sort=asc".parse().unwrap();

        let rewritten = sanitize_uri(&sanitizer, &uri).unwrap();
        assert_eq!(rewritten.path(), "/api/notes/alert(1)");
        assert_eq!(rewritten.query(), Some("sort=asc"));

        let clean: Uri = "/api/notes?sort=asc".parse().unwrap();
        assert!(sanitize_uri(&sanitizer, &clean).is_none());
    }

    #[test]
    fn test_sanitize_body() {
        let sanitizer = Sanitizer::default();
        let clean = Bytes::from_static(br#"{"amount": 12, "note": "rent"}"#);
        assert_eq!(sanitize_body(&sanitizer, &clean), None);

        let not_json = Bytes::from_static(b"{not json");
        assert_eq!(sanitize_body(&sanitizer, &not_json), None);

        let dirty = Bytes::from_static(br#"{"amount": 12, "note": "<script>x</script>"}"#);
        let rewritten = sanitize_body(&sanitizer, &dirty).unwrap();
        let rewritten: Value = serde_json::from_slice(&rewritten).unwrap();
        assert_eq!(rewritten, json!({"amount": 12, "note": "[SCRIPT_REMOVED]"}));
    }

    #[test]
    fn test_sanitize_body_keeps_numbers_exact() {
        let sanitizer = Sanitizer::default();
        let dirty = Bytes::from_static(
            br#"{"amount": 12345678901234567890123, "rate": 0.10000000000000000555,
                "fee": 19.90, "note": "${x}"}"#,
        );

        let rewritten = String::from_utf8(sanitize_body(&sanitizer, &dirty).unwrap()).unwrap();
        assert!(rewritten.contains(r#""amount":12345678901234567890123"#));
        assert!(rewritten.contains(r#""rate":0.10000000000000000555"#));
        assert!(rewritten.contains(r#""fee":19.90"#));
        assert!(rewritten.contains(r#""note":"[TEMPLATE_LITERAL_REMOVED]""#));
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/merge-patch+json"));
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));
    }
}
