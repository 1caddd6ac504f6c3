//! Upload credential negotiation
//!
//! One authenticated request to the presign route resolves the storage
//! endpoint plus the per-file signing and callback endpoints. The session is
//! created once per invocation and shared read-only by every file upload.

use super::UploadError;
use crate::auth::Credentials;
use crate::config::ClientConfig;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PresignResponse {
    url: String,
    signing_url: String,
    callback_url: String,
}

/// Endpoints for one upload invocation, never mutated after negotiation.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub storage_endpoint: Url,
    pub signing_endpoint: Url,
    pub callback_endpoint: Url,
}

/// Negotiate upload credentials.
///
/// `signing_url` and `callback_url` come back relative to the service origin;
/// `url` is the absolute storage endpoint. A 401 means bad credentials, any
/// other non-200 aborts the whole upload. No retries.
#[tracing::instrument(name = "upload.negotiate", skip_all, err)]
pub async fn negotiate(
    http: &reqwest::Client,
    config: &ClientConfig,
    credentials: &Credentials,
) -> Result<UploadSession, UploadError> {
    let endpoint = config
        .endpoint("presign_upload")
        .map_err(|e| UploadError::InvalidEndpoint(e.to_string()))?;

    let response = credentials.apply(http.get(endpoint)).send().await?;
    match response.status() {
        StatusCode::OK => {}
        StatusCode::UNAUTHORIZED => return Err(UploadError::AuthenticationFailed),
        status => {
            return Err(UploadError::NegotiationFailed {
                status: status.as_u16(),
            })
        }
    }

    let presign: PresignResponse = response.json().await?;

    let storage_endpoint = Url::parse(&presign.url)
        .map_err(|e| UploadError::InvalidEndpoint(format!("{}: {e}", presign.url)))?;
    let signing_endpoint = config
        .resolve(&presign.signing_url)
        .map_err(|e| UploadError::InvalidEndpoint(e.to_string()))?;
    let callback_endpoint = config
        .resolve(&presign.callback_url)
        .map_err(|e| UploadError::InvalidEndpoint(e.to_string()))?;

    tracing::debug!(
        storage = %storage_endpoint,
        signing = %signing_endpoint,
        callback = %callback_endpoint,
        "negotiated upload session"
    );

    Ok(UploadSession {
        storage_endpoint,
        signing_endpoint,
        callback_endpoint,
    })
}
