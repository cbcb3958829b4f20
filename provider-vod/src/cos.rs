//! Object storage client for the upload bucket
//!
//! Only what the two-phase upload needs: a single streamed `PUT` of the media
//! body and a `HEAD` to read back the stored size.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::SourceBody;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{Result, VodError};
use crate::signer::{cos_authorization, Credentials};

const SIGNATURE_TTL_SECS: i64 = 3600;
const PUT_TIMEOUT: Duration = Duration::from_secs(3600);

/// One object in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosObject {
    pub bucket: String,
    pub region: String,
    /// Decoded object path starting with `/`
    pub path: String,
}

impl CosObject {
    pub fn host(&self) -> String {
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    /// Object URL with every path segment percent-encoded
    pub fn url(&self) -> String {
        let encoded: Vec<_> = self
            .path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("https://{}{}", self.host(), encoded.join("/"))
    }
}

pub struct CosClient {
    http: Arc<dyn HttpClient>,
}

impl CosClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn signed(&self, method: HttpMethod, object: &CosObject, credentials: &Credentials) -> Result<HttpRequest> {
        let host = object.host();
        let authorization = cos_authorization(
            credentials,
            method.as_str(),
            &object.path,
            &host,
            chrono::Utc::now().timestamp(),
            SIGNATURE_TTL_SECS,
        )?;

        let mut request = HttpRequest::new(method, object.url())
            .header("Host", host)
            .header("Authorization", authorization);
        if let Some(token) = &credentials.token {
            request = request.header("x-cos-security-token", token.clone());
        }
        Ok(request)
    }

    fn check(operation: &'static str, response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }
        Err(VodError::Storage {
            operation,
            status: response.status,
            request_id: response.header("x-cos-request-id").map(str::to_string),
        })
    }

    /// Stream `body` into the object
    ///
    /// Without a known size the body is sent with chunked transfer encoding.
    #[instrument(skip(self, body, credentials), fields(path = %object.path, size = ?body.size))]
    pub async fn put_object(&self, object: &CosObject, body: SourceBody, credentials: &Credentials) -> Result<()> {
        let mut request = self
            .signed(HttpMethod::Put, object, credentials)?
            .timeout(PUT_TIMEOUT);
        if let Some(size) = body.size {
            request = request.header("Content-Length", size.to_string());
        }

        Self::check("put", self.http.upload_stream(request, body.reader).await?)?;
        debug!("Object stored");
        Ok(())
    }

    /// Stored size of the object
    pub async fn object_size(&self, object: &CosObject, credentials: &Credentials) -> Result<u64> {
        let request = self.signed(HttpMethod::Head, object, credentials)?;
        let response = Self::check("head", self.http.execute(request).await?)?;
        response
            .content_length()
            .ok_or_else(|| VodError::invalid_response("HEAD response without Content-Length"))
    }
}
