//! HTTP transport shared by all adapters.
//!
//! One blocking client per process, with browser-like headers (providers
//! answer bare clients with 403s). Adapters talk to the [`Transport`] trait so
//! tests can serve canned responses without a network.

use super::circuit_breaker::CircuitBreaker;
use super::provider::AdapterError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;

/// Browser User-Agent sent by default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

/// Status, optional `Retry-After` seconds, and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
            body: Vec::new(),
        }
    }
}

/// Blocking GET. Only transport-level failures are `Err`; status handling
/// belongs to the caller.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, AdapterError>;
}

/// `reqwest` blocking client with a browser-like session.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| AdapterError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, AdapterError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = resp
            .bytes()
            .map_err(|e| AdapterError::Network(format!("reading body: {e}")))?
            .to_vec();

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Markup prefixes that mean "error or consent page", not data.
const MARKUP_PREFIXES: &[&str] = &["<!doctype html", "<html", "<head", "<body"];

/// Content sniffing: does the body start like an HTML document?
pub fn looks_like_error_page(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let head: Vec<u8> = body[start..]
        .iter()
        .take(16)
        .map(u8::to_ascii_lowercase)
        .collect();
    MARKUP_PREFIXES
        .iter()
        .any(|p| head.starts_with(p.as_bytes()))
}

/// Outcome of status and content checks on one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checked {
    Body(Vec<u8>),
    /// 404 on an endpoint addressed per key.
    Missing,
}

/// Apply status and content checks, feeding the source's circuit breaker.
///
/// 403 trips the breaker outright; 429 and other failures count toward the
/// threshold. With `missing_is_not_found`, a 404 means "no such key".
pub fn check_response(
    resp: HttpResponse,
    breaker: &CircuitBreaker,
    missing_is_not_found: bool,
) -> Result<Checked, AdapterError> {
    match resp.status {
        200..=299 => {}
        404 if missing_is_not_found => {
            breaker.record_success();
            return Ok(Checked::Missing);
        }
        403 => {
            breaker.trip();
            return Err(AdapterError::HttpStatus { status: 403 });
        }
        429 => {
            breaker.record_failure();
            return Err(AdapterError::RateLimited {
                retry_after_secs: resp.retry_after.unwrap_or(60),
            });
        }
        status => {
            breaker.record_failure();
            return Err(AdapterError::HttpStatus { status });
        }
    }

    if looks_like_error_page(&resp.body) {
        breaker.record_failure();
        return Err(AdapterError::ErrorPage);
    }

    breaker.record_success();
    Ok(Checked::Body(resp.body))
}

/// Decode a body as text, replacing invalid UTF-8.
pub fn body_text(body: Vec<u8>) -> String {
    match String::from_utf8(body) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(Duration::from_secs(60), 3)
    }

    #[test]
    fn sniffs_markup() {
        assert!(looks_like_error_page(b"<!DOCTYPE html><html>"));
        assert!(looks_like_error_page(b"\n  <HTML><body>Rate limited</body>"));
        assert!(looks_like_error_page(b"\xEF\xBB\xBF<html>"));
        assert!(!looks_like_error_page(b"Date,Close\n2024-05-01,1\n"));
        assert!(!looks_like_error_page(b"{\"chart\":{}}"));
        assert!(!looks_like_error_page(b""));
    }

    #[test]
    fn success_passes_body_through() {
        let checked = check_response(HttpResponse::ok("a,b"), &breaker(), false).unwrap();
        assert_eq!(checked, Checked::Body(b"a,b".to_vec()));
    }

    #[test]
    fn html_with_200_is_an_error() {
        let err = check_response(HttpResponse::ok("<html>oops</html>"), &breaker(), false)
            .unwrap_err();
        assert_eq!(err, AdapterError::ErrorPage);
    }

    #[test]
    fn not_found_only_when_keyed() {
        assert_eq!(
            check_response(HttpResponse::status(404), &breaker(), true).unwrap(),
            Checked::Missing
        );
        assert_eq!(
            check_response(HttpResponse::status(404), &breaker(), false).unwrap_err(),
            AdapterError::HttpStatus { status: 404 }
        );
    }

    #[test]
    fn forbidden_trips_breaker() {
        let cb = breaker();
        let err = check_response(HttpResponse::status(403), &cb, false).unwrap_err();
        assert_eq!(err, AdapterError::HttpStatus { status: 403 });
        assert!(!cb.is_allowed());
    }

    #[test]
    fn rate_limit_reads_retry_after() {
        let resp = HttpResponse {
            status: 429,
            retry_after: Some(5),
            body: Vec::new(),
        };
        let err = check_response(resp, &breaker(), false).unwrap_err();
        assert_eq!(err, AdapterError::RateLimited { retry_after_secs: 5 });
    }

    #[test]
    fn repeated_server_errors_open_breaker() {
        let cb = breaker();
        for _ in 0..3 {
            let _ = check_response(HttpResponse::status(503), &cb, false);
        }
        assert!(!cb.is_allowed());
    }

    #[test]
    fn lossy_text_decoding() {
        assert_eq!(body_text(b"ok".to_vec()), "ok");
        assert_eq!(body_text(vec![b'a', 0xFF]), "a\u{FFFD}");
    }
}
