//! Two-phase uploader.
//!
//! Drives apply, object put and commit through a [`TwoPhaseTransport`],
//! applying the request-id retry rule to the apply and commit calls.

use crate::retry::TwoPhaseRetry;
use async_trait::async_trait;
use bridge_traits::{
    SourceRef, TransferError, TransferOutcome, TransferResult, TwoPhaseTransport, Uploader,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error code of a put whose stored size differs from the source size
pub const INCOMPLETE_UPLOAD: &str = "INCOMPLETE_UPLOAD";

/// [`Uploader`] over a two-phase (apply / commit) transport
pub struct TwoPhaseUploader {
    transport: Arc<dyn TwoPhaseTransport>,
    retry: TwoPhaseRetry,
}

impl TwoPhaseUploader {
    pub fn new(transport: Arc<dyn TwoPhaseTransport>) -> Self {
        Self {
            transport,
            retry: TwoPhaseRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: TwoPhaseRetry) -> Self {
        self.retry = retry;
        self
    }

    async fn call_with_retry<T, F, Fut>(&self, phase: &str, mut call: F) -> TransferResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = TransferResult<T>> + Send,
        T: Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if self.retry.should_retry(&error, attempts) => {
                    warn!(phase, attempts, error = %error, "Call did not reach the service, retrying");
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl Uploader for TwoPhaseUploader {
    async fn transfer(&self, source: &SourceRef) -> TransferResult<TransferOutcome> {
        let session = self
            .call_with_retry("apply", || self.transport.apply(source))
            .await?;
        debug!(
            key = source.display_key(),
            bucket = %session.storage_bucket,
            path = %session.media_storage_path,
            "Upload applied"
        );

        let stored = self.transport.put_media(&session, source).await?;
        if !stored.is_complete() {
            return Err(TransferError::transient(
                INCOMPLETE_UPLOAD,
                format!(
                    "incomplete upload: source {} bytes, stored {} bytes",
                    stored.source_size.unwrap_or_default(),
                    stored.object_size
                ),
            ));
        }

        self.call_with_retry("commit", || self.transport.commit(&session))
            .await
    }
}
