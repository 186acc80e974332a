//! Remote retrieval.
//!
//! The engine needs two things from the remote side: the manifest document
//! and the raw bytes of a file by relative path. [`Retriever`] is that
//! capability; [`public::PublicRetriever`] and [`github::GithubRetriever`]
//! are the two transports, chosen once from configuration.

pub mod github;
pub mod public;

use crate::config::{Config, RemoteMode};
use crate::transfer::progress_stream::ProgressCallback;
use crate::utils::errors::{Result, UpdaterError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;

/// Source of remote manifest and file bytes
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Human-readable description of the remote (for logs)
    fn describe(&self) -> String;

    /// Verify the remote is reachable and credentials are accepted.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    /// Raw bytes of the manifest document.
    async fn get_manifest(&self) -> Result<Bytes>;

    /// Raw content bytes of `relative_path`, reporting cumulative received
    /// bytes through `progress`.
    async fn get_file(&self, relative_path: &str, progress: ProgressCallback) -> Result<Bytes>;
}

/// Build the retriever selected by `config.remote.mode`.
pub fn build_retriever(config: &Config) -> Result<Arc<dyn Retriever>> {
    config.validate()?;

    let client = Client::builder()
        .user_agent(config.network.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .build()?;

    let retriever: Arc<dyn Retriever> = match config.remote.mode {
        RemoteMode::Public => Arc::new(public::PublicRetriever::new(client, &config.remote)?),
        RemoteMode::Authenticated => {
            let token = config.remote.token.clone().ok_or_else(|| {
                UpdaterError::Config("authenticated mode requires a token".to_string())
            })?;
            Arc::new(github::GithubRetriever::new(client, &config.remote, token)?)
        }
    };

    Ok(retriever)
}

/// Map a non-success response to an error naming `target`.
pub(crate) async fn check_status(response: Response, target: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.trim().chars().take(200).collect()
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(UpdaterError::Authentication(format!(
            "{} (HTTP {}): {}",
            target,
            status.as_u16(),
            message
        )));
    }

    Err(UpdaterError::Retrieval {
        target: target.to_string(),
        status: Some(status.as_u16()),
        message,
    })
}

/// Wrap a transport error with the path it was fetching.
pub(crate) fn transport_error(target: &str, error: reqwest::Error) -> UpdaterError {
    let message = if error.is_timeout() {
        format!("timed out: {}", error)
    } else {
        error.to_string()
    };
    UpdaterError::retrieval(target, message)
}
