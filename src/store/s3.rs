//! S3 object downloader.

use crate::error::SubsetError;
use crate::s3_client::{self, S3Client};
use crate::store::remote::ObjectDownloader;
use crate::store::StoreOptions;

use async_trait::async_trait;
use bytes::Bytes;

/// S3 object downloader.
///
/// Implements [ObjectDownloader] for objects under a prefix of an S3 bucket.
#[derive(Debug)]
pub struct S3Downloader {
    client: S3Client,
    bucket: String,
    /// Key prefix of the store root. Empty, or ending with `/`.
    prefix: String,
}

impl S3Downloader {
    /// Create a new S3 downloader.
    ///
    /// # Arguments
    ///
    /// * `bucket`: Name of the bucket
    /// * `prefix`: Key prefix of the store root
    /// * `options`: Endpoint, region and credentials
    pub async fn new(bucket: &str, prefix: &str, options: &StoreOptions) -> Self {
        let client = S3Client::new(
            options.s3_endpoint.as_ref(),
            &options.aws_region,
            options.credentials.clone(),
        )
        .await;
        S3Downloader {
            client,
            bucket: bucket.to_string(),
            prefix: normalise_prefix(prefix),
        }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn normalise_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}/", prefix)
    }
}

#[async_trait]
impl ObjectDownloader for S3Downloader {
    fn backend(&self) -> &'static str {
        "s3"
    }

    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    async fn download(&self, key: &str, range: Option<(u64, u64)>) -> Result<Bytes, SubsetError> {
        // Convert the byte range to an HTTP range header value for the S3 request
        let range = range.and_then(|(offset, size)| s3_client::get_range(Some(offset), Some(size)));
        self.client
            .download_object(&self.bucket, &self.object_key(key), range)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!("", normalise_prefix(""));
        assert_eq!("", normalise_prefix("/"));
        assert_eq!("atl03/granule/", normalise_prefix("atl03/granule"));
        assert_eq!("atl03/granule/", normalise_prefix("/atl03/granule/"));
    }

    #[tokio::test]
    async fn describe() {
        let downloader = S3Downloader::new("bucket", "atl03/", &StoreOptions::default()).await;
        assert_eq!("s3", downloader.backend());
        assert_eq!(
            "s3://bucket/atl03/gt1l/.group.json",
            downloader.describe("gt1l/.group.json")
        );
    }
}
