//! Upload fan-out
//!
//! Fans a list of files out to per-file uploads, bounding the number of
//! simultaneous network-bound phases with a counting semaphore. The first
//! fatal failure cancels the remaining work via a shared cancellation token;
//! the caller receives an aggregate report rather than a process exit.

use super::session::UploadSession;
use super::{FileUploadTask, FileUploader, UploadError, UploadReport};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Default bound on simultaneous in-flight uploads.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Coordinates the upload of many files through one [`FileUploader`].
pub struct UploadCoordinator {
    uploader: Arc<dyn FileUploader>,
    concurrency_limit: usize,
    enable_concurrency: bool,
}

impl UploadCoordinator {
    pub fn new(uploader: Arc<dyn FileUploader>) -> Self {
        Self {
            uploader,
            concurrency_limit: DEFAULT_CONCURRENCY,
            enable_concurrency: true,
        }
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn enable_concurrency(mut self, enabled: bool) -> Self {
        self.enable_concurrency = enabled;
        self
    }

    /// Upload every file, joining all work before returning.
    ///
    /// Sequential mode processes files strictly in input order and stops at
    /// the first fatal failure. Concurrent mode starts one task per file and
    /// admits at most `concurrency_limit` of them into the network phase at
    /// once; completion order across files is unspecified. Either way, files
    /// that already finalized stay completed when a later file fails.
    #[tracing::instrument(name = "upload.all", skip_all, fields(files = tasks.len()))]
    pub async fn upload_all(
        &self,
        tasks: Vec<FileUploadTask>,
        session: &UploadSession,
    ) -> UploadReport {
        if self.enable_concurrency {
            self.upload_concurrent(tasks, session).await
        } else {
            self.upload_sequential(tasks, session).await
        }
    }

    async fn upload_sequential(
        &self,
        tasks: Vec<FileUploadTask>,
        session: &UploadSession,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        let mut tasks = tasks.into_iter();

        for task in tasks.by_ref() {
            let path = task.path().to_path_buf();
            match self.uploader.upload(&task, session).await {
                Ok(()) => report.completed.push(path),
                Err(e) => {
                    tracing::error!(file = %task.filename(), error = %e, "upload failed");
                    report.failed.push((path, e));
                    break;
                }
            }
        }

        // Files after the first failure are never attempted.
        report
            .cancelled
            .extend(tasks.map(|task| task.path().to_path_buf()));
        report
    }

    async fn upload_concurrent(
        &self,
        tasks: Vec<FileUploadTask>,
        session: &UploadSession,
    ) -> UploadReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let uploader = self.uploader.clone();
            let session = session.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let path = task.path().to_path_buf();

            let handle = tokio::spawn(async move {
                // The gate admits into the network phase; waiting for a slot
                // is interruptible so cancelled files never start.
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(UploadError::Cancelled),
                    },
                };

                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(UploadError::Cancelled),
                    result = uploader.upload(&task, &session) => result,
                };

                if let Err(e) = &result {
                    if !matches!(e, UploadError::Cancelled) {
                        tracing::error!(file = %task.filename(), error = %e, "upload failed");
                        cancel.cancel();
                    }
                }
                result
            });
            handles.push((path, handle));
        }

        let mut report = UploadReport::default();
        for (path, handle) in handles {
            match handle.await {
                Ok(Ok(())) => report.completed.push(path),
                Ok(Err(UploadError::Cancelled)) => report.cancelled.push(path),
                Ok(Err(e)) => report.failed.push((path, e)),
                Err(join_error) => report
                    .failed
                    .push((path, UploadError::Io(std::io::Error::other(join_error)))),
            }
        }
        report
    }
}
