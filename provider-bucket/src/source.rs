//! S3-protocol listing and object reads

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::list_objects::ListObjectsOutput;
use aws_sdk_s3::Client;
use bridge_traits::{ListPage, ObjectReader, SourceBody, SourceEnumerator, SourceItem};
use tracing::{debug, instrument};

use crate::endpoint::BucketEndpoint;
use crate::error::BucketError;

/// Largest page ListObjects returns
const PAGE_SIZE: i32 = 1000;

/// Lists and reads one bucket
#[derive(Debug, Clone)]
pub struct BucketSource {
    client: Client,
    bucket: String,
}

impl BucketSource {
    pub fn new(
        endpoint: &BucketEndpoint,
        bucket: impl Into<String>,
        access_key_id: &str,
        access_key_secret: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key_id, access_key_secret, None, None, "vod-migrate");
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(endpoint.region.clone()))
            .credentials_provider(credentials);
        builder.set_endpoint_url(endpoint.endpoint_url.clone());
        let config = builder.build();

        Self {
            client: Client::from_conf(config),
            bucket: bucket.into(),
        }
    }
}

/// Translate one ListObjects response into a page.
///
/// A truncated response without `NextMarker` continues after its last key,
/// which is how services that only return `NextMarker` for delimited listings
/// page.
fn page_from_listing(output: &ListObjectsOutput) -> ListPage {
    let items: Vec<SourceItem> = output
        .contents()
        .iter()
        .filter_map(|object| {
            let key = object.key()?;
            Some(
                SourceItem::new(key)
                    .with_size(object.size().unwrap_or_default().max(0) as u64)
                    .with_modified_time(object.last_modified().map_or(0, |time| time.secs()))
                    .with_etag(object.e_tag().unwrap_or_default().trim_matches('"')),
            )
        })
        .collect();

    let next_marker = if output.is_truncated().unwrap_or(false) {
        output
            .next_marker()
            .filter(|marker| !marker.is_empty())
            .map(str::to_string)
            .or_else(|| items.last().map(|item| item.key.clone()))
    } else {
        None
    };

    ListPage {
        is_done: next_marker.is_none(),
        items,
        next_marker,
    }
}

#[async_trait]
impl SourceEnumerator for BucketSource {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list_items(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> bridge_traits::error::Result<ListPage> {
        let output = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .set_prefix(Some(prefix.to_string()).filter(|prefix| !prefix.is_empty()))
            .set_marker(marker.map(str::to_string))
            .max_keys(PAGE_SIZE)
            .send()
            .await
            .map_err(|error| BucketError::List {
                bucket: self.bucket.clone(),
                message: DisplayErrorContext(&error).to_string(),
            })?;

        let page = page_from_listing(&output);
        debug!(items = page.items.len(), done = page.is_done, "Bucket page listed");
        Ok(page)
    }
}

#[async_trait]
impl ObjectReader for BucketSource {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn open_object(&self, key: &str) -> bridge_traits::error::Result<SourceBody> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| BucketError::Read {
                key: key.to_string(),
                not_found: error
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key()),
                message: DisplayErrorContext(&error).to_string(),
            })?;

        let size = output
            .content_length()
            .and_then(|length| u64::try_from(length).ok());
        Ok(SourceBody {
            reader: Box::pin(output.body.into_async_read()),
            size,
        })
    }
}
