//! Authenticated retrieval through the repository contents API.
//!
//! Every request carries the bearer token. File bodies come back wrapped in a
//! JSON envelope whose `content` field is base64; anything else is rejected.

use super::{check_status, transport_error, Retriever};
use crate::config::RemoteConfig;
use crate::fs::paths;
use crate::transfer::progress_stream::{noop_progress, ProgressCallback};
use crate::utils::errors::{Result, UpdaterError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use tracing::{debug, info};

const API_VERSION: &str = "2022-11-28";

/// Contents API response for a single file
#[derive(Debug, Deserialize)]
struct ContentsEnvelope {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

pub struct GithubRetriever {
    client: Client,
    repo_url: Url,
    branch: String,
    manifest_path: String,
    token: String,
}

impl GithubRetriever {
    pub fn new(client: Client, remote: &RemoteConfig, token: String) -> Result<Self> {
        let mut repo_url = Url::parse(&remote.api_base_url).map_err(|e| {
            UpdaterError::Config(format!("invalid api_base_url '{}': {}", remote.api_base_url, e))
        })?;
        repo_url
            .path_segments_mut()
            .map_err(|_| {
                UpdaterError::Config(format!("api_base_url '{}' cannot be a base", remote.api_base_url))
            })?
            .pop_if_empty()
            .extend(["repos", remote.owner.as_str(), remote.repo.as_str()]);

        Ok(Self {
            client,
            repo_url,
            branch: remote.branch.clone(),
            manifest_path: paths::normalize_key(&remote.manifest_path)?,
            token,
        })
    }

    /// `{api}/repos/{owner}/{repo}/contents/{path}?ref={branch}`
    pub fn contents_url(&self, relative_path: &str) -> Result<Url> {
        let key = paths::normalize_key(relative_path)?;
        let mut url = self.repo_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("contents").extend(key.split('/'));
        }
        url.query_pairs_mut().append_pair("ref", &self.branch);
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        self.client.get(url).headers(headers).bearer_auth(&self.token)
    }

    async fn fetch(&self, relative_path: &str, progress: ProgressCallback) -> Result<Bytes> {
        let url = self.contents_url(relative_path)?;
        debug!("GET {}", url);

        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(relative_path, e))?;
        let response = check_status(response, relative_path).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(relative_path, e))?;

        let data = decode_envelope(relative_path, &body)?;
        progress(data.len() as u64);
        Ok(data)
    }
}

/// Extract raw file bytes from a contents API envelope.
pub fn decode_envelope(relative_path: &str, body: &[u8]) -> Result<Bytes> {
    let envelope: ContentsEnvelope = serde_json::from_slice(body).map_err(|e| {
        UpdaterError::retrieval(relative_path, format!("unexpected contents response: {}", e))
    })?;

    let encoding = envelope.encoding.unwrap_or_else(|| "none".to_string());
    if !encoding.eq_ignore_ascii_case("base64") {
        return Err(UpdaterError::UnsupportedEncoding {
            path: relative_path.to_string(),
            encoding,
        });
    }

    let compact: String = envelope
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let data = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        UpdaterError::retrieval(relative_path, format!("invalid base64 payload: {}", e))
    })?;

    Ok(Bytes::from(data))
}

#[async_trait]
impl Retriever for GithubRetriever {
    fn describe(&self) -> String {
        format!("{} (ref {})", self.repo_url, self.branch)
    }

    async fn probe(&self) -> Result<()> {
        let target = self.repo_url.to_string();
        let response = self
            .get(self.repo_url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&target, e))?;
        check_status(response, &target).await?;
        info!("Repository {} is reachable", target);
        Ok(())
    }

    async fn get_manifest(&self) -> Result<Bytes> {
        self.fetch(&self.manifest_path, noop_progress()).await
    }

    async fn get_file(&self, relative_path: &str, progress: ProgressCallback) -> Result<Bytes> {
        self.fetch(relative_path, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn retriever() -> GithubRetriever {
        let mut config = Config::default();
        config.remote.owner = "acme".to_string();
        config.remote.repo = "private-builds".to_string();
        config.remote.branch = "release".to_string();
        GithubRetriever::new(Client::new(), &config.remote, "token".to_string()).unwrap()
    }

    #[test]
    fn test_contents_url() {
        let r = retriever();
        assert_eq!(
            r.contents_url("bin/App Core.dll").unwrap().as_str(),
            "https://api.github.com/repos/acme/private-builds/contents/bin/App%20Core.dll?ref=release"
        );
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        // "hello world" split the way the API wraps long payloads
        let body = br#"{"name":"a.txt","encoding":"base64","content":"aGVsbG8g\nd29y\r\nbGQ=\n","sha":"x"}"#;
        let data = decode_envelope("a.txt", body).unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[test]
    fn test_decode_rejects_other_encodings() {
        let body = br#"{"encoding":"none","content":""}"#;
        match decode_envelope("big.bin", body) {
            Err(UpdaterError::UnsupportedEncoding { path, encoding }) => {
                assert_eq!(path, "big.bin");
                assert_eq!(encoding, "none");
            }
            other => panic!("expected UnsupportedEncoding, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_directory_listing() {
        let body = br#"[{"name":"a.txt"},{"name":"b.txt"}]"#;
        assert!(matches!(
            decode_envelope("lib", body),
            Err(UpdaterError::Retrieval { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let body = br#"{"encoding":"base64","content":"@@@"}"#;
        assert!(matches!(
            decode_envelope("a.txt", body),
            Err(UpdaterError::Retrieval { .. })
        ));
    }
}
