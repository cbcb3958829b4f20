//! # Destination Platform Transports
//!
//! Uploads to the destination media platform over HTTPS.
//!
//! ## Overview
//!
//! - [`VodClient`] signs and sends JSON API actions (TC3-HMAC-SHA256)
//! - [`VodTransport`] implements the two-phase upload:
//!   `ApplyUpload`, an object put with the returned temporary credentials,
//!   a size check, then `CommitUpload`
//! - [`PullUploader`] asks the platform to fetch a URL itself (`PullUpload`)
//! - [`ReqwestHttpClient`] is the production [`HttpClient`](bridge_traits::HttpClient)
//!
//! ## Errors
//!
//! Everything fails with [`VodError`], which converts into a classified
//! [`TransferError`](bridge_traits::TransferError). API errors keep the
//! service's request id; transport failures never have one.
//!
//! ## Usage
//!
//! ```ignore
//! let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
//! let credentials = Credentials::new(secret_id, secret_key);
//! let client = VodClient::new(http, credentials.clone(), "ap-guangzhou");
//! let transport = VodTransport::new(client, credentials, sub_app_id);
//! ```

pub mod client;
pub mod cos;
pub mod error;
pub mod http;
pub mod pull;
pub mod signer;
pub mod two_phase;

pub use client::VodClient;
pub use error::{Result, VodError};
pub use http::ReqwestHttpClient;
pub use pull::{PullOptions, PullUploader};
pub use signer::Credentials;
pub use two_phase::VodTransport;
