//! Request signing
//!
//! Two schemes are needed: TC3-HMAC-SHA256 for the JSON API and the
//! HMAC-SHA1 `q-sign` scheme for object storage requests made with the
//! temporary credentials returned by the apply phase.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Result, VodError};

pub const TC3_ALGORITHM: &str = "TC3-HMAC-SHA256";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// API or storage credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
    /// Session token of temporary credentials
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"***")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn hmac_sha256(key: &[u8], message: &str) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| VodError::invalid_source("SIGNATURE_ERROR", e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha1_hex(key: &[u8], message: &str) -> Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|e| VodError::invalid_source("SIGNATURE_ERROR", e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// `Authorization` header for a TC3 signed JSON POST to `/`
///
/// Only `content-type` and `host` are signed.
pub fn tc3_authorization(
    credentials: &Credentials,
    service: &str,
    host: &str,
    payload: &[u8],
    timestamp: i64,
) -> Result<String> {
    let date = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| VodError::invalid_source("SIGNATURE_ERROR", "timestamp out of range"))?
        .format("%Y-%m-%d")
        .to_string();

    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\ncontent-type;host\n{}",
        JSON_CONTENT_TYPE,
        host,
        hex::encode(Sha256::digest(payload))
    );
    let scope = format!("{}/{}/tc3_request", date, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        TC3_ALGORITHM,
        timestamp,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let secret_date = hmac_sha256(format!("TC3{}", credentials.secret_key).as_bytes(), &date)?;
    let secret_service = hmac_sha256(&secret_date, service)?;
    let secret_signing = hmac_sha256(&secret_service, "tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders=content-type;host, Signature={}",
        TC3_ALGORITHM, credentials.secret_id, scope, signature
    ))
}

/// `Authorization` header for an object storage request
///
/// `path` is the decoded object path starting with `/`. Only `host` is
/// signed and no query parameters are used. The signature is valid from
/// `start` for `ttl_secs`.
pub fn cos_authorization(
    credentials: &Credentials,
    method: &str,
    path: &str,
    host: &str,
    start: i64,
    ttl_secs: i64,
) -> Result<String> {
    let key_time = format!("{};{}", start, start + ttl_secs);
    let sign_key = hmac_sha1_hex(credentials.secret_key.as_bytes(), &key_time)?;

    let http_string = format!(
        "{}\n{}\n\nhost={}\n",
        method.to_lowercase(),
        path,
        urlencoding::encode(host)
    );
    let string_to_sign = format!(
        "sha1\n{}\n{}\n",
        key_time,
        hex::encode(Sha1::digest(http_string.as_bytes()))
    );
    let signature = hmac_sha1_hex(sign_key.as_bytes(), &string_to_sign)?;

    Ok(format!(
        "q-sign-algorithm=sha1&q-ak={}&q-sign-time={kt}&q-key-time={kt}&q-header-list=host&q-url-param-list=&q-signature={}",
        credentials.secret_id,
        signature,
        kt = key_time
    ))
}
