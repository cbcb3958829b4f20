//! HTTP Client Implementation using Reqwest
//!
//! Bodies of streaming calls are piped through `tokio-util` adapters, so a
//! media file or download is never buffered whole.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, StreamingResponse},
    ByteReader,
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use crate::error::VodError;

/// Reqwest-based [`HttpClient`]
///
/// Connections are pooled per host. Each `execute` is one attempt.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Client with a 30 second default request timeout
    pub fn new() -> std::result::Result<Self, VodError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> std::result::Result<Self, VodError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(16)
            .user_agent(concat!("vod-migrate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VodError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    async fn send(req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        req.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::OperationFailed("Request timed out".to_string())
            } else if e.is_connect() {
                BridgeError::OperationFailed(format!("Connection failed: {}", e))
            } else {
                BridgeError::OperationFailed(e.to_string())
            }
        })
    }

    fn headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.as_str().to_lowercase(), s.to_string())))
            .collect()
    }

    async fn collect(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers = Self::headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Reading response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "Executing HTTP request");
        let response = Self::send(self.build_request(request)).await?;
        Self::collect(response).await
    }

    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "Opening HTTP stream");
        let response = Self::send(self.build_request(request)).await?;

        let status = response.status().as_u16();
        let headers = Self::headers(&response);
        let stream = response.bytes_stream().map_err(std::io::Error::other);

        Ok(StreamingResponse {
            status,
            headers,
            body: Box::pin(StreamReader::new(stream)),
        })
    }

    async fn upload_stream(&self, request: HttpRequest, body: ByteReader) -> Result<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "Streaming request body");
        let req = self
            .build_request(request)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(body)));
        let response = Self::send(req).await?;
        Self::collect(response).await
    }
}
