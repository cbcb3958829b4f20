//! # Host Bridge Traits
//!
//! Contracts between the migration engine and the collaborators it drives.
//!
//! ## Overview
//!
//! The engine never talks to a filesystem, a bucket, or the destination media
//! platform directly. Each of those capabilities is expressed as a trait here and
//! implemented by a `provider-*` crate:
//!
//! - [`SourceEnumerator`](source::SourceEnumerator) - Paginated listing of source items
//! - [`Uploader`](upload::Uploader) - One complete transfer of a resolved source item
//! - [`TwoPhaseTransport`](upload::TwoPhaseTransport) - The apply / put / commit calls
//!   behind a two-phase upload
//! - [`ObjectReader`](source::ObjectReader) - Streaming reads of bucket objects
//! - [`HttpClient`](http::HttpClient) - Single-attempt HTTP execution used by the
//!   destination transports
//!
//! ## Error Handling
//!
//! Listing failures use [`BridgeError`](error::BridgeError). Transfer failures use
//! [`TransferError`](upload::TransferError), a classified value that records whether
//! the remote side observed the request. Retry decisions are made from that value
//! alone.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so a single instance can be shared by every
//! worker task through an `Arc`.

pub mod error;
pub mod http;
pub mod source;
pub mod upload;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, StreamingResponse};

pub use source::{
    ByteReader, ListPage, MigrateType, ObjectReader, SourceAttributes, SourceBody,
    SourceEnumerator, SourceItem, SourceRef,
};
pub use upload::{
    StoredObject, TempCredentials, TransferError, TransferErrorKind, TransferOutcome,
    TransferResult, TwoPhaseTransport, UploadSession, Uploader,
};
