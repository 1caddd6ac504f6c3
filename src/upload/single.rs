//! Per-file upload pipeline
//!
//! Drives one file through sign, streamed multipart storage upload, and the
//! finalize callback. Each step is fatal on failure; there is no retry. The
//! file handle is held only around the streaming step.

use super::progress::ProgressTracker;
use super::session::UploadSession;
use super::{FileUploadTask, FileUploader, UploadError};
use crate::auth::Credentials;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::LOCATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Content type of the trailing file part. The storage service accepts raw
/// sequence data as text.
const FILE_CONTENT_TYPE: &str = "text/plain";

/// HTTP implementation of the per-file pipeline.
pub struct HttpFileUploader {
    http: reqwest::Client,
    credentials: Credentials,
    tracker: Arc<ProgressTracker>,
}

impl HttpFileUploader {
    pub fn new(
        http: reqwest::Client,
        credentials: Credentials,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            http,
            credentials,
            tracker,
        }
    }

    /// Fetch the multipart form fields authorizing a direct storage upload.
    ///
    /// The response's field order is significant: the storage service
    /// verifies a signature computed over the exact field sequence, so the
    /// fields are kept in an order-preserving map.
    #[tracing::instrument(name = "upload.sign", skip(self, session), fields(file = %task.filename()), err)]
    async fn sign(
        &self,
        task: &FileUploadTask,
        session: &UploadSession,
    ) -> Result<serde_json::Map<String, serde_json::Value>, UploadError> {
        let response = self
            .credentials
            .apply(self.http.post(session.signing_endpoint.clone()))
            .form(&[("filename", task.filename()), ("via_api", "true")])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(UploadError::AuthenticationFailed),
            status => Err(UploadError::SigningFailed {
                filename: task.filename().to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Stream the multipart body to storage, reporting cumulative bytes on
    /// every chunk boundary. Success is strictly HTTP 201; the returned value
    /// is the storage object's `Location` header.
    #[tracing::instrument(name = "upload.storage", skip(self, session, fields), fields(file = %task.filename(), bytes = task.size_bytes()), err)]
    async fn stream_to_storage(
        &self,
        task: &FileUploadTask,
        session: &UploadSession,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, UploadError> {
        // Signing fields first, in the order the server supplied them, file
        // content strictly last.
        let mut form = Form::new();
        for (key, value) in fields {
            form = form.text(key, field_text(&value));
        }

        let file = tokio::fs::File::open(task.path()).await?;
        let stream = progress_stream(
            ReaderStream::new(file),
            self.tracker.clone(),
            task.path().to_path_buf(),
        );
        let part = Part::stream_with_length(Body::wrap_stream(stream), task.size_bytes())
            .file_name(task.filename().to_string())
            .mime_str(FILE_CONTENT_TYPE)?;
        form = form.part("file", part);

        let response = self
            .http
            .post(session.storage_endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::UNAUTHORIZED => return Err(UploadError::AuthenticationFailed),
            status => {
                return Err(UploadError::StorageUploadFailed {
                    filename: task.filename().to_string(),
                    status: status.as_u16(),
                })
            }
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::MissingLocation {
                filename: task.filename().to_string(),
            })
    }

    /// Record the uploaded object's location and size server-side.
    #[tracing::instrument(name = "upload.finalize", skip(self, session, location), fields(file = %task.filename()), err)]
    async fn finalize(
        &self,
        task: &FileUploadTask,
        session: &UploadSession,
        location: &str,
    ) -> Result<(), UploadError> {
        let response = self
            .credentials
            .apply(self.http.post(session.callback_endpoint.clone()))
            .form(&[
                ("location", location),
                ("size", &task.size_bytes().to_string()),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(UploadError::AuthenticationFailed),
            status => Err(UploadError::CallbackFailed {
                filename: task.filename().to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl FileUploader for HttpFileUploader {
    async fn upload(
        &self,
        task: &FileUploadTask,
        session: &UploadSession,
    ) -> Result<(), UploadError> {
        let fields = self.sign(task, session).await?;
        let location = self.stream_to_storage(task, session, fields).await?;
        self.finalize(task, session, &location).await?;
        tracing::debug!(file = %task.filename(), "upload finalized");
        Ok(())
    }
}

/// Signing fields arrive as JSON values but are embedded as form text, so
/// non-string values are rendered without quoting.
fn field_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wrap a file's chunk stream so each chunk reports cumulative bytes sent.
fn progress_stream<S>(
    stream: S,
    tracker: Arc<ProgressTracker>,
    path: PathBuf,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    let mut sent: u64 = 0;
    stream.inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            sent += chunk.len() as u64;
            tracker.update(&path, sent);
        }
    })
}
