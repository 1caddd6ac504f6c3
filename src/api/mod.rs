//! Resource API client
//!
//! Thin request/response plumbing for the read-only routes (`samples`,
//! `analyses`, `references`) and the streamed file download helper. The
//! upload pipeline lives in [`crate::upload`].

use crate::auth::Credentials;
use crate::config::{ClientConfig, ConfigError};
use futures::StreamExt;
use reqwest::{StatusCode, Url};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Resource API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("authentication failed (HTTP 401)")]
    AuthenticationFailed,

    #[error("request failed (HTTP {status})")]
    RequestFailed { status: u16 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authenticated client for the simple request/response routes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Credentials,
}

impl ApiClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("seqport/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    /// List a collection route, e.g. `samples`.
    #[tracing::instrument(name = "api.list", skip(self), err)]
    pub async fn list(&self, route: &str) -> Result<serde_json::Value, ApiError> {
        self.fetch(self.config.endpoint(route)?).await
    }

    /// Fetch a single record by UUID, with an optional route supplement such
    /// as `/table`.
    #[tracing::instrument(name = "api.get", skip(self), err)]
    pub async fn get(
        &self,
        route: &str,
        uuid: &str,
        supplement: &str,
    ) -> Result<serde_json::Value, ApiError> {
        self.fetch(self.config.endpoint(&format!("{route}/{uuid}{supplement}"))?)
            .await
    }

    async fn fetch(&self, url: Url) -> Result<serde_json::Value, ApiError> {
        let response = self.credentials.apply(self.http.get(url)).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(ApiError::AuthenticationFailed),
            status if !status.is_success() => Err(ApiError::RequestFailed {
                status: status.as_u16(),
            }),
            _ => Ok(response.json().await?),
        }
    }

    /// Stream a GET response to disk. When `dest` is a directory the filename
    /// is taken from the final response URL (after redirects). Returns the
    /// path written.
    #[tracing::instrument(name = "api.download", skip(self), err)]
    pub async fn download_file(&self, url: Url, dest: &Path) -> Result<PathBuf, ApiError> {
        let response = self.credentials.apply(self.http.get(url)).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(ApiError::AuthenticationFailed),
            status if !status.is_success() => {
                return Err(ApiError::RequestFailed {
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        let remote_name = response
            .url()
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
            .to_string();

        let target = if dest.is_dir() {
            dest.join(&remote_name)
        } else {
            dest.to_path_buf()
        };

        let mut file = tokio::fs::File::create(&target).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        tracing::info!(file = %remote_name, target = %target.display(), "downloaded");
        Ok(target)
    }
}

/// Render a JSON value for terminal output.
pub fn render_json(value: &serde_json::Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}
