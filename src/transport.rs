//! HTTP transport used by the session: one blocking POST per protocol step.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};

/// Error type surfaced by transports, passed through the session untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Request timeout for [`ReqwestTransport::new`].
///
/// Must outlast the default BOSH `wait` of 60 seconds, otherwise a connection
/// manager legitimately holding the request open would look like a failure.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(75);

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response body, expected to be a UTF-8 XML document.
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a POST and returns the response.
///
/// Implementations own the mechanics (TLS, pooling, timeouts, headers); the
/// session only ever hands over a serialized document.
pub trait HttpTransport {
    fn post(&self, endpoint: &str, body: &str) -> Result<HttpResponse, BoxError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &T {
    fn post(&self, endpoint: &str, body: &str) -> Result<HttpResponse, BoxError> {
        (**self).post(endpoint, body)
    }
}

impl<T: HttpTransport + ?Sized> HttpTransport for Box<T> {
    fn post(&self, endpoint: &str, body: &str) -> Result<HttpResponse, BoxError> {
        (**self).post(endpoint, body)
    }
}

/// A blocking [`reqwest`]-backed [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bosh-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured client (proxies, custom roots, ...).
    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, endpoint: &str, body: &str) -> Result<HttpResponse, BoxError> {
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header(ACCEPT, "text/xml")
            .body(body.to_owned())
            .send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::with_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_unreachable_endpoint_is_error() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 on loopback (discard) is closed on any sane test machine
        assert!(transport.post("http://127.0.0.1:9/http-bind", "<body/>").is_err());
    }
}
