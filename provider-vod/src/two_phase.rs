//! Two-phase upload transport
//!
//! ```text
//! ApplyUpload ──→ PUT object (temporary credentials) ──→ HEAD size ──→ CommitUpload
//! ```
//!
//! The media body is streamed into the put: local files through `tokio::fs`,
//! URL sources from a GET that must answer 2xx, bucket objects through the
//! configured [`ObjectReader`].

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::{
    ObjectReader, SourceBody, SourceRef, StoredObject, TempCredentials, TransferOutcome,
    TransferResult, TwoPhaseTransport, UploadSession,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::client::VodClient;
use crate::cos::{CosClient, CosObject};
use crate::error::{Result, VodError};
use crate::signer::Credentials;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TempCertificate {
    secret_id: String,
    secret_key: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApplyUploadResponse {
    storage_bucket: String,
    storage_region: String,
    vod_session_key: String,
    #[serde(default)]
    media_storage_path: String,
    temp_certificate: Option<TempCertificate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommitUploadResponse {
    file_id: String,
    #[serde(default)]
    media_url: Option<String>,
}

/// File name of a source: the last path segment, without query or fragment
fn source_file_name(source: &SourceRef) -> Result<String> {
    let name = match source {
        SourceRef::LocalFile(path) => path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string(),
        SourceRef::Url(url) => url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .unwrap_or_default()
            .to_string(),
        SourceRef::Object { key } => key.rsplit('/').next().unwrap_or_default().to_string(),
        other => {
            return Err(VodError::invalid_source(
                "UNSUPPORTED_SOURCE",
                format!("{} cannot be uploaded in two phases", other.display_key()),
            ))
        }
    };
    if name.is_empty() {
        return Err(VodError::invalid_source(
            "INVALID_MEDIA_TYPE",
            format!("lack media path: {}", source.display_key()),
        ));
    }
    Ok(name)
}

/// `(MediaType, MediaName)` for the apply request
fn media_type_and_name(file_name: &str) -> Result<(String, String)> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => {
            let name = if stem.is_empty() { file_name } else { stem };
            Ok((ext.to_lowercase(), name.to_string()))
        }
        _ => Err(VodError::invalid_source(
            "INVALID_MEDIA_TYPE",
            format!("lack media type: {}", file_name),
        )),
    }
}

/// [`TwoPhaseTransport`] against the destination media platform
pub struct VodTransport {
    client: VodClient,
    cos: CosClient,
    /// Used for the put when the apply phase returns no temporary credentials
    credentials: Credentials,
    sub_app_id: u64,
    objects: Option<Arc<dyn ObjectReader>>,
}

impl VodTransport {
    pub fn new(client: VodClient, credentials: Credentials, sub_app_id: u64) -> Self {
        let cos = CosClient::new(client.http().clone());
        Self {
            client,
            cos,
            credentials,
            sub_app_id,
            objects: None,
        }
    }

    /// Read [`SourceRef::Object`] sources through `reader`
    pub fn with_object_reader(mut self, reader: Arc<dyn ObjectReader>) -> Self {
        self.objects = Some(reader);
        self
    }

    fn base_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if self.sub_app_id != 0 {
            params.insert("SubAppId".to_string(), json!(self.sub_app_id));
        }
        params
    }

    /// Open the source body without reading it
    async fn open_body(&self, source: &SourceRef) -> Result<SourceBody> {
        match source {
            SourceRef::LocalFile(path) => open_local(path).await,
            SourceRef::Url(url) => {
                let request = HttpRequest::new(HttpMethod::Get, url.clone()).timeout(DOWNLOAD_TIMEOUT);
                let response = self.client.http().execute_streaming(request).await?;
                if !response.is_success() {
                    return Err(VodError::Download {
                        url: url.clone(),
                        status: response.status,
                    });
                }
                Ok(SourceBody {
                    size: response.content_length(),
                    reader: response.body,
                })
            }
            SourceRef::Object { key } => {
                let reader = self.objects.as_ref().ok_or_else(|| {
                    VodError::invalid_source(
                        "UNSUPPORTED_SOURCE",
                        format!("no bucket reader configured for {}", key),
                    )
                })?;
                reader
                    .open_object(key)
                    .await
                    .map_err(|source| VodError::ObjectRead {
                        key: key.clone(),
                        source,
                    })
            }
            other => Err(VodError::invalid_source(
                "UNSUPPORTED_SOURCE",
                format!("{} cannot be uploaded in two phases", other.display_key()),
            )),
        }
    }
}

async fn open_local(path: &Path) -> Result<SourceBody> {
    let read_error = |source| VodError::SourceRead {
        path: path.to_path_buf(),
        source,
    };
    let file = tokio::fs::File::open(path).await.map_err(read_error)?;
    let size = file.metadata().await.map_err(read_error)?.len();
    Ok(SourceBody {
        reader: Box::pin(file),
        size: Some(size),
    })
}

#[async_trait]
impl TwoPhaseTransport for VodTransport {
    #[instrument(skip(self, source), fields(key = %source.display_key()))]
    async fn apply(&self, source: &SourceRef) -> TransferResult<UploadSession> {
        let (media_type, media_name) = media_type_and_name(&source_file_name(source)?)?;

        let mut params = self.base_params();
        params.insert("MediaType".to_string(), json!(media_type));
        params.insert("MediaName".to_string(), json!(media_name));

        let response = self
            .client
            .call::<_, ApplyUploadResponse>("ApplyUpload", &params)
            .await?;
        info!(
            request_id = %response.request_id,
            bucket = %response.data.storage_bucket,
            path = %response.data.media_storage_path,
            "ApplyUpload succeeded"
        );

        let data = response.data;
        Ok(UploadSession {
            session_key: data.vod_session_key,
            storage_bucket: data.storage_bucket,
            storage_region: data.storage_region,
            media_storage_path: data.media_storage_path,
            credentials: data.temp_certificate.map(|cert| TempCredentials {
                secret_id: cert.secret_id,
                secret_key: cert.secret_key,
                token: cert.token,
            }),
        })
    }

    #[instrument(skip(self, session, source), fields(key = %source.display_key()))]
    async fn put_media(
        &self,
        session: &UploadSession,
        source: &SourceRef,
    ) -> TransferResult<StoredObject> {
        if session.media_storage_path.is_empty() {
            return Err(
                VodError::invalid_response("ApplyUpload returned no media storage path").into(),
            );
        }

        let credentials = match &session.credentials {
            Some(temp) => Credentials::new(&temp.secret_id, &temp.secret_key).with_token(&temp.token),
            None => self.credentials.clone(),
        };
        let object = CosObject {
            bucket: session.storage_bucket.clone(),
            region: session.storage_region.clone(),
            path: session.media_storage_path.clone(),
        };

        let body = self.open_body(source).await?;
        let source_size = body.size;
        self.cos.put_object(&object, body, &credentials).await?;
        let object_size = self.cos.object_size(&object, &credentials).await?;
        debug!(?source_size, object_size, "Object size checked");

        Ok(StoredObject {
            source_size,
            object_size,
        })
    }

    async fn commit(&self, session: &UploadSession) -> TransferResult<TransferOutcome> {
        let mut params = self.base_params();
        params.insert("VodSessionKey".to_string(), json!(session.session_key));

        let response = self
            .client
            .call::<_, CommitUploadResponse>("CommitUpload", &params)
            .await?;
        info!(
            request_id = %response.request_id,
            file_id = %response.data.file_id,
            "CommitUpload succeeded"
        );

        Ok(TransferOutcome {
            destination_id: response.data.file_id,
            destination_url: response.data.media_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::http::HttpResponse;
    use bridge_traits::TransferErrorKind;
    use mockall::mock;
    use std::path::PathBuf;
    use std::sync::Arc;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn transport(http: MockHttpClient) -> VodTransport {
        let credentials = Credentials::new("id", "key");
        let client = VodClient::new(Arc::new(http), credentials.clone(), "ap-guangzhou");
        VodTransport::new(client, credentials, 1500000001)
    }

    fn api(body: Value) -> bridge_traits::error::Result<HttpResponse> {
        Ok(HttpResponse::new(200, json!({ "Response": body }).to_string()))
    }

    fn session() -> UploadSession {
        UploadSession {
            session_key: "sk".to_string(),
            storage_bucket: "vod-125".to_string(),
            storage_region: "ap-guangzhou".to_string(),
            media_storage_path: "/1500000001/media/a.mp4".to_string(),
            credentials: Some(TempCredentials {
                secret_id: "tmp-id".to_string(),
                secret_key: "tmp-key".to_string(),
                token: "tmp-token".to_string(),
            }),
        }
    }

    #[test]
    fn test_media_type_and_name() {
        assert_eq!(
            media_type_and_name("Clip.Final.MP4").unwrap(),
            ("mp4".to_string(), "Clip.Final".to_string())
        );
        assert!(media_type_and_name("README").is_err());
        assert_eq!(
            source_file_name(&SourceRef::Url("https://cdn.example.com/v/a.mp4?sig=1".to_string()))
                .unwrap(),
            "a.mp4"
        );
    }

    #[tokio::test]
    async fn test_apply_sends_type_and_name() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                request.headers["X-TC-Action"] == "ApplyUpload"
                    && body["MediaType"] == "mp4"
                    && body["MediaName"] == "movie"
                    && body["SubAppId"] == 1500000001u64
            })
            .returning(|_| {
                api(json!({
                    "StorageBucket": "vod-125",
                    "StorageRegion": "ap-guangzhou",
                    "VodSessionKey": "sk",
                    "MediaStoragePath": "/1500000001/media/movie.mp4",
                    "TempCertificate": {"SecretId": "t-id", "SecretKey": "t-key", "Token": "t-tok", "ExpiredTime": 1},
                    "RequestId": "req-apply"
                }))
            });

        let session = transport(http)
            .apply(&SourceRef::LocalFile(PathBuf::from("/data/movie.mp4")))
            .await
            .unwrap();

        assert_eq!(session.session_key, "sk");
        assert_eq!(session.credentials.unwrap().token, "t-tok");
    }

    #[tokio::test]
    async fn test_apply_rejects_missing_extension_without_calling() {
        let http = MockHttpClient::new();
        let error = transport(http)
            .apply(&SourceRef::LocalFile(PathBuf::from("/data/README")))
            .await
            .unwrap_err();
        assert_eq!(error.kind, TransferErrorKind::InvalidInput);
        assert_eq!(error.code, "INVALID_MEDIA_TYPE");
    }

    #[tokio::test]
    async fn test_put_reports_sizes() {
        let path = std::env::temp_dir().join(format!("vod-put-{}.mp4", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"0123456789").unwrap();

        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Put
                    && request.headers["x-cos-security-token"] == "tmp-token"
                    && request.headers["Authorization"].contains("q-ak=tmp-id")
                    && request.body.as_ref().map(|b| b.len()) == Some(10)
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "")));
        http.expect_execute()
            .withf(|request| request.method == HttpMethod::Head)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "").with_header("Content-Length", "7")));

        let stored = transport(http)
            .put_media(&session(), &SourceRef::LocalFile(path))
            .await
            .unwrap();

        assert_eq!(stored.source_size, Some(10));
        assert_eq!(stored.object_size, 7);
        assert!(!stored.is_complete());
    }

    #[tokio::test]
    async fn test_failed_download_is_not_uploaded() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| request.method == HttpMethod::Get)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(404, "not found")));

        let error = transport(http)
            .put_media(
                &session(),
                &SourceRef::Url("https://cdn.example.com/a.mp4".to_string()),
            )
            .await
            .unwrap_err();

        assert_eq!(error.code, "DOWNLOAD_FAILED");
        assert_eq!(error.kind, TransferErrorKind::Permanent);
    }

    struct FixedObject;

    #[async_trait]
    impl ObjectReader for FixedObject {
        async fn open_object(&self, key: &str) -> bridge_traits::error::Result<SourceBody> {
            if key != "media/clip.mp4" {
                return Err(bridge_traits::BridgeError::NotAvailable(key.to_string()));
            }
            Ok(SourceBody {
                reader: Box::pin(std::io::Cursor::new(b"data".to_vec())),
                size: Some(4),
            })
        }
    }

    #[tokio::test]
    async fn test_bucket_object_is_streamed_into_put() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Put
                    && request.headers["Content-Length"] == "4"
                    && request.body.as_deref() == Some(&b"data"[..])
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "")));
        http.expect_execute()
            .withf(|request| request.method == HttpMethod::Head)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "").with_header("Content-Length", "4")));

        let stored = transport(http)
            .with_object_reader(Arc::new(FixedObject))
            .put_media(
                &session(),
                &SourceRef::Object {
                    key: "media/clip.mp4".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(stored.source_size, Some(4));
        assert!(stored.is_complete());
        assert_eq!(
            source_file_name(&SourceRef::Object {
                key: "media/clip.mp4".to_string()
            })
            .unwrap(),
            "clip.mp4"
        );
    }

    #[tokio::test]
    async fn test_missing_bucket_object_fails_permanently() {
        let error = transport(MockHttpClient::new())
            .with_object_reader(Arc::new(FixedObject))
            .put_media(
                &session(),
                &SourceRef::Object {
                    key: "media/gone.mp4".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind, TransferErrorKind::Permanent);
        assert_eq!(error.code, "SOURCE_READ_ERROR");

        let unconfigured = transport(MockHttpClient::new())
            .put_media(
                &session(),
                &SourceRef::Object {
                    key: "media/clip.mp4".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(unconfigured.code, "UNSUPPORTED_SOURCE");
    }

    #[tokio::test]
    async fn test_commit_returns_file_id() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                request.headers["X-TC-Action"] == "CommitUpload" && body["VodSessionKey"] == "sk"
            })
            .returning(|_| {
                api(json!({
                    "FileId": "5285890781763144364",
                    "MediaUrl": "https://125.vod2.myqcloud.com/a.mp4",
                    "RequestId": "req-commit"
                }))
            });

        let outcome = transport(http).commit(&session()).await.unwrap();
        assert_eq!(outcome.destination_id, "5285890781763144364");
        assert_eq!(
            outcome.destination_url.as_deref(),
            Some("https://125.vod2.myqcloud.com/a.mp4")
        );
    }
}
