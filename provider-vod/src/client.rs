//! Signed JSON API client
//!
//! Every action is a `POST /` with a JSON body and `X-TC-*` headers. The
//! response is always wrapped as `{"Response": {...}}` and carries a
//! `RequestId`. Failures are reported inside the envelope as
//! `Response.Error { Code, Message }`, regardless of HTTP status.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, VodError};
use crate::signer::{tc3_authorization, Credentials, JSON_CONTENT_TYPE};

pub const DEFAULT_ENDPOINT: &str = "vod.tencentcloudapi.com";
pub const API_VERSION: &str = "2018-07-17";
const SERVICE: &str = "vod";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Successful action response
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub request_id: String,
}

/// Destination platform API client
pub struct VodClient {
    http: Arc<dyn HttpClient>,
    credentials: Credentials,
    region: String,
    endpoint: String,
}

impl VodClient {
    pub fn new(http: Arc<dyn HttpClient>, credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            http,
            credentials,
            region: region.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Override the API host, e.g. a regional endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    fn build_request(&self, action: &str, payload: Vec<u8>, timestamp: i64) -> Result<HttpRequest> {
        let authorization =
            tc3_authorization(&self.credentials, SERVICE, &self.endpoint, &payload, timestamp)?;

        let mut request = HttpRequest::new(HttpMethod::Post, format!("https://{}/", self.endpoint))
            .header("Authorization", authorization)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("Host", self.endpoint.clone())
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Region", self.region.clone())
            .timeout(REQUEST_TIMEOUT)
            .body(payload.into());
        if let Some(token) = &self.credentials.token {
            request = request.header("X-TC-Token", token.clone());
        }
        Ok(request)
    }

    /// Invoke `action` with `params` and decode the response body
    #[instrument(skip(self, params), fields(region = %self.region))]
    pub async fn call<P, T>(&self, action: &str, params: &P) -> Result<ApiResponse<T>>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(params)
            .map_err(|e| VodError::invalid_source("PARAM_ERROR", e.to_string()))?;
        let request = self.build_request(action, payload, chrono::Utc::now().timestamp())?;

        let response = self.http.execute(request).await?;
        let result = parse_response(&response);
        match &result {
            Ok(ok) => debug!(request_id = %ok.request_id, "API call succeeded"),
            Err(error) => warn!(error = %error, "API call failed"),
        }
        result
    }
}

fn parse_response<T: DeserializeOwned>(response: &HttpResponse) -> Result<ApiResponse<T>> {
    let envelope: Envelope = serde_json::from_slice(&response.body).map_err(|e| {
        VodError::invalid_response(format!(
            "HTTP {} with undecodable body: {}",
            response.status, e
        ))
    })?;

    let request_id = envelope
        .response
        .get("RequestId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    // An empty id means the service never identified the call
    let acknowledged = || Some(request_id.clone()).filter(|id| !id.is_empty());

    if let Some(error) = envelope.response.get("Error") {
        let error: ApiErrorBody =
            serde_json::from_value(error.clone()).map_err(|e| VodError::InvalidResponse {
                message: format!("Malformed error body: {}", e),
                request_id: acknowledged(),
            })?;
        return Err(VodError::Api {
            code: error.code,
            message: error.message,
            request_id,
        });
    }

    let data =
        serde_json::from_value(envelope.response).map_err(|e| VodError::InvalidResponse {
            message: e.to_string(),
            request_id: acknowledged(),
        })?;
    Ok(ApiResponse { data, request_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::BridgeError;
    use mockall::mock;
    use serde_json::json;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    #[derive(Debug, Deserialize)]
    struct Apply {
        #[serde(rename = "VodSessionKey")]
        session_key: String,
    }

    fn client(http: MockHttpClient) -> VodClient {
        VodClient::new(
            Arc::new(http),
            Credentials::new("id", "key").with_token("tok"),
            "ap-guangzhou",
        )
    }

    #[tokio::test]
    async fn test_call_signs_and_decodes() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "https://vod.tencentcloudapi.com/"
                    && request.headers["X-TC-Action"] == "ApplyUpload"
                    && request.headers["X-TC-Region"] == "ap-guangzhou"
                    && request.headers["X-TC-Token"] == "tok"
                    && request.headers["Authorization"].starts_with("TC3-HMAC-SHA256 Credential=id/")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    json!({"Response": {"VodSessionKey": "sk", "RequestId": "req-1"}}).to_string(),
                ))
            });

        let response: ApiResponse<Apply> = client(http)
            .call("ApplyUpload", &json!({"MediaType": "mp4"}))
            .await
            .unwrap();

        assert_eq!(response.data.session_key, "sk");
        assert_eq!(response.request_id, "req-1");
    }

    #[tokio::test]
    async fn test_api_error_envelope() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(HttpResponse::new(
                200,
                json!({"Response": {
                    "Error": {"Code": "InvalidParameterValue.SubAppId", "Message": "bad app"},
                    "RequestId": "req-2"
                }})
                .to_string(),
            ))
        });

        let error = client(http)
            .call::<_, serde_json::Value>("CommitUpload", &json!({}))
            .await
            .unwrap_err();

        match error {
            VodError::Api {
                code, request_id, ..
            } => {
                assert_eq!(code, "InvalidParameterValue.SubAppId");
                assert_eq!(request_id, "req-2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_request_id() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("Request timed out".to_string())));

        let error = client(http)
            .call::<_, serde_json::Value>("ApplyUpload", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(error, VodError::Network(_)));
        assert!(!bridge_traits::TransferError::from(error).reached_remote());
    }

    #[tokio::test]
    async fn test_gateway_error_page() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(502, "<html>Bad Gateway</html>")));

        let error = client(http)
            .call::<_, serde_json::Value>("ApplyUpload", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            VodError::InvalidResponse {
                request_id: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_undecodable_payload_keeps_request_id() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| {
            Ok(HttpResponse::new(
                200,
                json!({"Response": {"RequestId": "req-acked"}}).to_string(),
            ))
        });

        let error = client(http)
            .call::<_, Apply>("ApplyUpload", &json!({}))
            .await
            .unwrap_err();

        match error {
            VodError::InvalidResponse { request_id, .. } => {
                assert_eq!(request_id.as_deref(), Some("req-acked"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
