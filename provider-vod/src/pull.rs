//! Direct-pull uploader
//!
//! The platform fetches the media itself. A single `PullUpload` call either
//! creates a pull task, whose id becomes the destination id, or fails.

use async_trait::async_trait;
use bridge_traits::{
    SourceAttributes, SourceRef, TransferError, TransferOutcome, TransferResult, Uploader,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::VodClient;

/// Options applied to every pull request of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOptions {
    pub sub_app_id: u64,
    pub tasks_priority: Option<i64>,
    pub procedure: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
struct PullUploadRequest<'a> {
    media_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_storage_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub_app_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks_priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    procedure: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PullUploadResponse {
    task_id: String,
}

/// [`Uploader`] issuing one `PullUpload` call per attempt
pub struct PullUploader {
    client: VodClient,
    options: PullOptions,
}

impl PullUploader {
    pub fn new(client: VodClient, options: PullOptions) -> Self {
        Self { client, options }
    }

    fn request<'a>(&'a self, url: &'a str, attributes: &'a SourceAttributes) -> PullUploadRequest<'a> {
        PullUploadRequest {
            media_url: url,
            media_name: attributes.media_name.as_deref(),
            class_id: attributes.class_id,
            media_storage_path: attributes.storage_path.as_deref(),
            sub_app_id: (self.options.sub_app_id != 0).then_some(self.options.sub_app_id),
            tasks_priority: self.options.tasks_priority,
            procedure: self.options.procedure.as_deref(),
        }
    }
}

#[async_trait]
impl Uploader for PullUploader {
    #[instrument(skip(self, source), fields(url = %source.display_key()))]
    async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome> {
        let default_attributes = SourceAttributes::default();
        let (url, attributes) = match source {
            SourceRef::Pull { url, attributes } => (url.as_str(), attributes),
            SourceRef::Url(url) => (url.as_str(), &default_attributes),
            other => {
                return Err(TransferError::invalid_input(
                    "PARAM_ERROR",
                    format!("{} cannot be pulled", other.display_key()),
                ))
            }
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TransferError::invalid_input(
                "INVALID_URL",
                format!("invalid media url: {}", url),
            ));
        }

        let response = self
            .client
            .call::<_, PullUploadResponse>("PullUpload", &self.request(url, attributes))
            .await?;
        info!(
            request_id = %response.request_id,
            task_id = %response.data.task_id,
            "PullUpload task created"
        );

        Ok(TransferOutcome {
            destination_id: response.data.task_id,
            destination_url: None,
        })
    }
}
