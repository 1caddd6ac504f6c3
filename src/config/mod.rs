//! Client configuration
//!
//! Resolves the API base URL from the environment with a production default,
//! and derives the service origin used to resolve the relative endpoint
//! templates returned by the upload negotiation step.

use reqwest::Url;
use thiserror::Error;

/// Environment variable overriding the API base URL.
pub const API_BASE_ENV: &str = "SEQPORT_API_BASE";

/// Production API base.
pub const DEFAULT_API_BASE: &str = "https://app.seqport.bio/api/v0/";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme '{0}': must be http or https")]
    UnsupportedScheme(String),
}

/// Resolved client configuration.
///
/// `api_base` is the versioned API root every route is joined onto.
/// `origin` is the same URL with its path reset to `/`, used to resolve the
/// relative `signing_url` and `callback_url` templates the presign step
/// returns.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    api_base: Url,
    origin: Url,
}

impl ClientConfig {
    /// Build a configuration from an explicit base URL.
    pub fn new(base: &str) -> Result<Self, ConfigError> {
        // Routes are joined relative to the base, so it must end with '/'.
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };

        let api_base = Url::parse(&normalized)
            .map_err(|e| ConfigError::InvalidUrl(format!("{base}: {e}")))?;

        match api_base.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        let mut origin = api_base.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        Ok(Self { api_base, origin })
    }

    /// Build a configuration from `SEQPORT_API_BASE`, falling back to the
    /// production base.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(API_BASE_ENV) {
            Ok(base) if !base.is_empty() => {
                tracing::info!(base = %base, "all requests going through overridden API base");
                Self::new(&base)
            }
            _ => Self::new(DEFAULT_API_BASE),
        }
    }

    /// The versioned API root.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// The service origin (scheme + authority, path `/`).
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Join a route onto the API base, e.g. `samples` or `analyses/{uuid}`.
    pub fn endpoint(&self, route: &str) -> Result<Url, ConfigError> {
        self.api_base
            .join(route)
            .map_err(|e| ConfigError::InvalidUrl(format!("{route}: {e}")))
    }

    /// Resolve a path relative to the service origin, e.g. `/s3_sign`.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin
            .join(path)
            .map_err(|e| ConfigError::InvalidUrl(format!("{path}: {e}")))
    }
}
