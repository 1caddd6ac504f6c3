//! Authentication
//!
//! API-key credentials and the on-disk credential store used by the `login`
//! and `logout` commands. Every authenticated request carries the key as the
//! HTTP Basic username with an empty password.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable overriding the stored API key.
pub const API_KEY_ENV: &str = "SEQPORT_API_KEY";

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("not logged in: run `seqport login` or set {API_KEY_ENV}")]
    NotLoggedIn,

    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("malformed credentials file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opaque API key, shared read-only across all concurrent requests.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Attach the credentials to an outgoing request.
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.api_key, Some(""))
    }
}

// Keep the key out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Path of the credentials file written by `seqport login`.
pub fn credentials_path() -> Result<PathBuf, AuthError> {
    dirs::home_dir()
        .map(|home| home.join(".seqport").join("credentials.json"))
        .ok_or(AuthError::NoHomeDir)
}

/// Load credentials, preferring `SEQPORT_API_KEY` over the credentials file.
pub fn load() -> Result<Credentials, AuthError> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.is_empty() {
            return Ok(Credentials::new(key));
        }
    }

    let path = credentials_path()?;
    let contents = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AuthError::NotLoggedIn
        } else {
            AuthError::Io(e)
        }
    })?;

    Ok(serde_json::from_str(&contents)?)
}

/// Persist an API key for later invocations. Returns the file written.
pub fn store(api_key: &str) -> Result<PathBuf, AuthError> {
    let path = credentials_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let credentials = Credentials::new(api_key);
    std::fs::write(&path, serde_json::to_string_pretty(&credentials)?)?;
    Ok(path)
}

/// Remove stored credentials. Returns whether a file existed.
pub fn clear() -> Result<bool, AuthError> {
    let path = credentials_path()?;
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AuthError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let credentials = Credentials::new("secret-key");
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_credentials_roundtrip() {
        let credentials = Credentials::new("abc123");
        let json = serde_json::to_string(&credentials).unwrap();
        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_key(), "abc123");
    }
}
