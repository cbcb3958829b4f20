//! HTTP Client Abstraction
//!
//! One request in, one response out. Transports build signed requests and
//! interpret the status themselves; retries belong to the engine, so an
//! implementation performs exactly one attempt per call.
//!
//! Media bodies are never held in memory by a real client:
//! [`HttpClient::execute_streaming`] hands the response body back unread and
//! [`HttpClient::upload_stream`] sends a request body straight from a reader.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::error::{BridgeError, Result};
use crate::source::ByteReader;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
///
/// Header names are lowercase.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_lowercase(), value.into());
        self
    }

    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// `Content-Length` header, when present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// HTTP response whose body has not been read yet
pub struct StreamingResponse {
    pub status: u16,
    /// Lowercase header names
    pub headers: HashMap<String, String>,
    pub body: ByteReader,
}

impl StreamingResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Async HTTP client trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod};
///
/// async fn fetch(client: &dyn HttpClient) -> Result<Bytes> {
///     let request = HttpRequest::new(HttpMethod::Get, "https://cdn.example.com/a.mp4");
///     Ok(client.execute(request).await?.body)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    ///
    /// Any status code is a successful execution. Only failures to obtain a
    /// response (connect, TLS, timeout, broken body) are errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a request and return before reading the response body
    ///
    /// The default buffers the body through [`execute`](Self::execute).
    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        let response = self.execute(request).await?;
        Ok(StreamingResponse {
            status: response.status,
            headers: response.headers,
            body: Box::pin(std::io::Cursor::new(response.body)),
        })
    }

    /// Execute a request whose body is read from `body`
    ///
    /// Any body already set on `request` is replaced. The default reads
    /// `body` to the end and delegates to [`execute`](Self::execute).
    async fn upload_stream(&self, request: HttpRequest, mut body: ByteReader) -> Result<HttpResponse> {
        let mut buffer = Vec::new();
        body.read_to_end(&mut buffer).await?;
        self.execute(request.body(Bytes::from(buffer))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Post, "https://vod.example.com")
            .header("X-TC-Action", "ApplyUpload")
            .timeout(Duration::from_secs(30))
            .json(&serde_json::json!({"SubAppId": 1}))
            .unwrap();

        assert_eq!(request.url, "https://vod.example.com");
        assert_eq!(
            request.headers.get("X-TC-Action"),
            Some(&"ApplyUpload".to_string())
        );
        assert_eq!(request.body.unwrap(), Bytes::from_static(b"{\"SubAppId\":1}"));
    }

    struct EchoClient;

    #[async_trait]
    impl HttpClient for EchoClient {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            let body = request.body.unwrap_or_default();
            Ok(HttpResponse::new(200, body.clone()).with_header("Content-Length", body.len().to_string()))
        }
    }

    #[tokio::test]
    async fn test_default_streaming_methods_delegate_to_execute() {
        let request = HttpRequest::new(HttpMethod::Put, "https://bucket.example.com/a.mp4");
        let reader: ByteReader = Box::pin(std::io::Cursor::new(b"0123456789".to_vec()));
        let echoed = EchoClient.upload_stream(request, reader).await.unwrap();
        assert_eq!(echoed.body, Bytes::from_static(b"0123456789"));

        let request = HttpRequest::new(HttpMethod::Post, "https://cdn.example.com/a.mp4")
            .body(Bytes::from_static(b"abc"));
        let mut response = EchoClient.execute_streaming(request).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.content_length(), Some(3));
        let mut body = String::new();
        response.body.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "abc");
    }

    #[test]
    fn test_http_response_helpers() {
        let response = HttpResponse::new(200, "test").with_header("Content-Length", "42");

        assert!(response.is_success());
        assert!(!response.is_server_error());
        assert_eq!(response.header("CONTENT-LENGTH"), Some("42"));
        assert_eq!(response.content_length(), Some(42));
        assert!(HttpResponse::new(503, "").is_server_error());
    }
}
