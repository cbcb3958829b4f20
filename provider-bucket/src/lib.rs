//! # Bucket Sources
//!
//! Listing and object reads for object-storage buckets: Tencent COS, AWS S3,
//! Alibaba OSS and Qiniu Kodo. All four speak the S3 protocol, so a single
//! [`BucketSource`] built on `aws-sdk-s3` serves every one of them; only the
//! endpoint and signing region differ (see [`BucketEndpoint`]).
//!
//! Listing uses marker paging with up to 1000 keys per page. Re-requesting a
//! marker returns the same page, which is what the engine's listing retry
//! relies on.

pub mod endpoint;
pub mod error;
pub mod source;

pub use endpoint::BucketEndpoint;
pub use error::{BucketError, Result};
pub use source::BucketSource;
