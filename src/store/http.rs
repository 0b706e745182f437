//! HTTP object downloader.

use crate::error::SubsetError;
use crate::s3_client::get_range;
use crate::store::remote::ObjectDownloader;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

/// HTTP object downloader.
///
/// Implements [ObjectDownloader] for objects served under a base URL, using HTTP range requests
/// for partial reads.
#[derive(Debug)]
pub struct HttpDownloader {
    reqwest_client: reqwest::Client,
    /// Base URL of the store root. The path always ends with `/`.
    base: Url,
}

impl HttpDownloader {
    /// Create a new HTTP downloader.
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            reqwest_client: reqwest::Client::new(),
            base,
        }
    }

    fn object_url(&self, key: &str) -> Result<Url, SubsetError> {
        Ok(self.base.join(key)?)
    }
}

#[async_trait]
impl ObjectDownloader for HttpDownloader {
    fn backend(&self) -> &'static str {
        "http"
    }

    fn describe(&self, key: &str) -> String {
        self.object_url(key)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base, key))
    }

    #[tracing::instrument(level = "DEBUG", skip(self))]
    async fn download(&self, key: &str, range: Option<(u64, u64)>) -> Result<Bytes, SubsetError> {
        let url = self.object_url(key)?;
        let request = self.reqwest_client.get(url.as_str());
        // Append range header if offset and size are specified
        let request = match range.and_then(|(offset, size)| get_range(Some(offset), Some(size))) {
            Some(range_header_value) => request.header(reqwest::header::RANGE, range_header_value),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        let bytes = match status {
            reqwest::StatusCode::OK | reqwest::StatusCode::PARTIAL_CONTENT => {
                response.bytes().await?
            }
            reqwest::StatusCode::NOT_FOUND => {
                return Err(SubsetError::NotFound {
                    path: url.to_string(),
                })
            }
            _ => {
                return Err(SubsetError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
        };
        // Servers that ignore the range header return the whole object.
        match (status, range) {
            (reqwest::StatusCode::OK, Some((offset, size))) => {
                let end = std::cmp::min(usize::try_from(offset + size)?, bytes.len());
                let start = std::cmp::min(usize::try_from(offset)?, end);
                Ok(bytes.slice(start..end))
            }
            _ => Ok(bytes),
        }
    }
}
