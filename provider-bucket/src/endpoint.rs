//! Endpoint and signing region per bucket provider

use bridge_traits::MigrateType;

use crate::error::{BucketError, Result};

/// Signing region used when neither the configuration nor the host names one
const FALLBACK_REGION: &str = "us-east-1";

/// Where the S3 client sends requests and which region it signs for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEndpoint {
    pub region: String,
    /// `None` keeps the SDK's regional AWS endpoint
    pub endpoint_url: Option<String>,
}

impl BucketEndpoint {
    /// Resolve the endpoint for a bucket source type.
    ///
    /// - COS: `https://cos.<region>.myqcloud.com`
    /// - AWS: the SDK default for `region`
    /// - Ali, Qiniu: the configured endpoint, `https` unless a scheme is given.
    ///   The region is taken from `region` when set, otherwise from the host
    ///   (`oss-cn-hangzhou.aliyuncs.com` signs for `oss-cn-hangzhou`,
    ///   `s3-cn-east-1.qiniucs.com` for `cn-east-1`).
    pub fn resolve(
        migrate_type: MigrateType,
        region: Option<&str>,
        end_point: Option<&str>,
    ) -> Result<Self> {
        let region = region.map(str::trim).filter(|region| !region.is_empty());
        let end_point = end_point.map(str::trim).filter(|end_point| !end_point.is_empty());

        match migrate_type {
            MigrateType::Cos => {
                let region = region.ok_or_else(|| missing(migrate_type, "region"))?;
                Ok(Self {
                    region: region.to_string(),
                    endpoint_url: Some(format!("https://cos.{region}.myqcloud.com")),
                })
            }
            MigrateType::Aws => Ok(Self {
                region: region
                    .ok_or_else(|| missing(migrate_type, "region"))?
                    .to_string(),
                endpoint_url: end_point.map(with_scheme),
            }),
            MigrateType::Ali | MigrateType::Qiniu => {
                let end_point = end_point.ok_or_else(|| missing(migrate_type, "endPoint"))?;
                let endpoint_url = with_scheme(end_point);
                let region = match region {
                    Some(region) => region.to_string(),
                    None => region_from_host(&endpoint_url),
                };
                Ok(Self {
                    region,
                    endpoint_url: Some(endpoint_url),
                })
            }
            other => Err(BucketError::Config(format!("{other} is not a bucket source"))),
        }
    }
}

fn missing(migrate_type: MigrateType, key: &str) -> BucketError {
    BucketError::Config(format!("{migrate_type} needs `{key}`"))
}

fn with_scheme(end_point: &str) -> String {
    let end_point = end_point.trim_end_matches('/');
    if end_point.contains("://") {
        end_point.to_string()
    } else {
        format!("https://{end_point}")
    }
}

fn region_from_host(url: &str) -> String {
    let host = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    let mut labels = host.split('.').filter(|label| !label.is_empty());

    let region = match labels.next() {
        Some("s3") => labels.next(),
        Some(label) => Some(label.strip_prefix("s3-").unwrap_or(label)),
        None => None,
    };
    region.unwrap_or(FALLBACK_REGION).to_string()
}
