//! Anonymous raw-file retrieval.
//!
//! Files are served verbatim at `{raw_base_url}/{owner}/{repo}/{branch}/{path}`.

use super::{check_status, transport_error, Retriever};
use crate::config::RemoteConfig;
use crate::fs::paths;
use crate::transfer::progress_stream::{collect_with_progress, noop_progress, ProgressCallback};
use crate::utils::errors::{Result, UpdaterError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use tracing::debug;

pub struct PublicRetriever {
    client: Client,
    base: Url,
    manifest_path: String,
}

impl PublicRetriever {
    pub fn new(client: Client, remote: &RemoteConfig) -> Result<Self> {
        let mut base = Url::parse(&remote.raw_base_url).map_err(|e| {
            UpdaterError::Config(format!("invalid raw_base_url '{}': {}", remote.raw_base_url, e))
        })?;
        base.path_segments_mut()
            .map_err(|_| {
                UpdaterError::Config(format!("raw_base_url '{}' cannot be a base", remote.raw_base_url))
            })?
            .pop_if_empty()
            .extend([remote.owner.as_str(), remote.repo.as_str(), remote.branch.as_str()]);

        Ok(Self {
            client,
            base,
            manifest_path: paths::normalize_key(&remote.manifest_path)?,
        })
    }

    /// URL of a repository file; each path segment is percent-encoded.
    pub fn file_url(&self, relative_path: &str) -> Result<Url> {
        let key = paths::normalize_key(relative_path)?;
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(key.split('/'));
        }
        Ok(url)
    }

    async fn fetch(&self, relative_path: &str, progress: ProgressCallback) -> Result<Bytes> {
        let url = self.file_url(relative_path)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(relative_path, e))?;
        let response = check_status(response, relative_path).await?;

        let expected_len = response.content_length();
        collect_with_progress(response.bytes_stream(), expected_len, &progress)
            .await
            .map_err(|e| transport_error(relative_path, e))
    }
}

#[async_trait]
impl Retriever for PublicRetriever {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    async fn get_manifest(&self) -> Result<Bytes> {
        self.fetch(&self.manifest_path, noop_progress()).await
    }

    async fn get_file(&self, relative_path: &str, progress: ProgressCallback) -> Result<Bytes> {
        self.fetch(relative_path, progress).await
    }
}
