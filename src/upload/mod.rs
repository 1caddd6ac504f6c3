//! Multi-file concurrent upload pipeline
//!
//! Orchestrates the three-step remote protocol: one presign negotiation per
//! invocation, then per file a signing request, a streamed multipart POST to
//! object storage, and a finalize callback. Fan-out is bounded by a counting
//! semaphore; per-file progress feeds a shared [`progress::ProgressTracker`].

use crate::auth::Credentials;
use crate::config::ClientConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub mod coordinator;
pub mod progress;
pub mod session;
pub mod single;

pub use coordinator::{UploadCoordinator, DEFAULT_CONCURRENCY};
pub use progress::ProgressTracker;
pub use session::{negotiate, UploadSession};
pub use single::HttpFileUploader;

/// Upload errors
///
/// Every variant is fatal for the file (or, before fan-out, for the whole
/// invocation): there is no retry within the pipeline.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("authentication failed (HTTP 401)")]
    AuthenticationFailed,

    #[error("failed to get upload signing credentials (HTTP {status})")]
    NegotiationFailed { status: u16 },

    #[error("failed to sign upload of {filename} (HTTP {status})")]
    SigningFailed { filename: String, status: u16 },

    #[error("storage upload of {filename} failed (HTTP {status})")]
    StorageUploadFailed { filename: String, status: u16 },

    #[error("failed to finalize upload of {filename} (HTTP {status})")]
    CallbackFailed { filename: String, status: u16 },

    #[error("storage response for {filename} missing Location header")]
    MissingLocation { filename: String },

    #[error("duplicate input path: {0}")]
    DuplicateInput(PathBuf),

    #[error("invalid file path: {0}")]
    InvalidPath(PathBuf),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One input file entering the pipeline. Owned by its uploader; the path
/// doubles as the progress-tracking key.
#[derive(Debug, Clone)]
pub struct FileUploadTask {
    path: PathBuf,
    filename: String,
    size_bytes: u64,
}

impl FileUploadTask {
    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| UploadError::InvalidPath(path.to_path_buf()))?;
        let size_bytes = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            filename,
            size_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name sent to the signing and storage endpoints.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[cfg(test)]
    pub(crate) fn for_test(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();
        Self {
            path,
            filename,
            size_bytes,
        }
    }
}

/// Aggregate outcome of one invocation.
///
/// Files that finished their callback before a sibling failed stay in
/// `completed`; the server keeps them recorded and nothing is rolled back.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub completed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, UploadError)>,
    pub cancelled: Vec<PathBuf>,
}

impl UploadReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

/// Seam between the coordinator and the per-file HTTP pipeline.
#[async_trait::async_trait]
pub trait FileUploader: Send + Sync {
    /// Drive one file through sign, storage upload, and finalize callback.
    async fn upload(
        &self,
        task: &FileUploadTask,
        session: &UploadSession,
    ) -> Result<(), UploadError>;
}

/// Fan-out options for [`upload_files`].
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub concurrency_limit: usize,
    pub enable_concurrency: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY,
            enable_concurrency: true,
        }
    }
}

/// Upload a set of local files end to end.
///
/// Negotiates upload credentials once, then fans the files out to the
/// per-file pipeline. Negotiation-level failures (including bad credentials)
/// return `Err` before any per-file network call; per-file outcomes are
/// reported in the [`UploadReport`].
pub async fn upload_files(
    config: &ClientConfig,
    credentials: &Credentials,
    paths: &[PathBuf],
    options: UploadOptions,
) -> Result<UploadReport, UploadError> {
    if paths.is_empty() {
        return Ok(UploadReport::default());
    }

    // Progress is keyed by path, so the same file twice is rejected up front.
    let mut seen = std::collections::HashSet::new();
    for path in paths {
        if !seen.insert(path.as_path()) {
            return Err(UploadError::DuplicateInput(path.clone()));
        }
    }

    let tasks = paths
        .iter()
        .map(|path| FileUploadTask::from_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("seqport/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let session = negotiate(&http, config, credentials).await?;
    let tracker = Arc::new(ProgressTracker::new(&tasks));
    let uploader = Arc::new(HttpFileUploader::new(
        http,
        credentials.clone(),
        tracker.clone(),
    ));

    let coordinator = UploadCoordinator::new(uploader)
        .concurrency_limit(options.concurrency_limit)
        .enable_concurrency(options.enable_concurrency);

    let report = coordinator.upload_all(tasks, &session).await;
    tracker.finish();
    Ok(report)
}
