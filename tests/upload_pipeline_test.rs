//! Upload Pipeline Integration Tests
//!
//! Exercises the presign / sign / storage / callback protocol against a mock
//! server, including the failure scenarios that must abort or cancel work.

use seqport::config::ClientConfig;
use seqport::upload::{upload_files, UploadError, UploadOptions};
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client configuration pointing at the mock server, with the mock server's
/// root as the service origin.
fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(&format!("{}/api/v0/", server.uri())).unwrap()
}

fn credentials() -> seqport::Credentials {
    seqport::Credentials::new("test-api-key")
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

async fn mount_presign(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v0/presign_upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/storage", server.uri()),
            "signing_url": "/s3_sign",
            "callback_url": "/s3_confirm"
        })))
        .mount(server)
        .await;
}

async fn mount_signing(server: &MockServer) {
    // Field order in this body is what the storage signature covers.
    Mock::given(method("POST"))
        .and(path("/s3_sign"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"policy":"cG9saWN5","AWSAccessKeyId":"AKIATEST","signature":"c2lnbmF0dXJl","key":"uploads/reads","acl":"private"}"#,
            "application/json",
        ))
        .mount(server)
        .await;
}

async fn mount_storage(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/storage"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "https://storage.test/uploads/reads"),
        )
        .mount(server)
        .await;
}

async fn mount_callback(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/s3_confirm"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn byte_position(haystack: &[u8], needle: &str) -> usize {
    haystack
        .windows(needle.len())
        .position(|window| window == needle.as_bytes())
        .unwrap_or_else(|| panic!("{needle} not found in body"))
}

#[tokio::test]
async fn test_presign_401_aborts_before_any_per_file_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v0/presign_upload"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    // No signing request may ever be issued.
    Mock::given(method("POST"))
        .and(path("/s3_sign"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "reads.fastq", b"ACGTACGTACGT");

    let result = upload_files(
        &config_for(&server),
        &credentials(),
        &[file],
        UploadOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(UploadError::AuthenticationFailed)));
}

#[tokio::test]
async fn test_presign_non_200_is_negotiation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v0/presign_upload"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "reads.fastq", b"ACGT");

    let result = upload_files(
        &config_for(&server),
        &credentials(),
        &[file],
        UploadOptions::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(UploadError::NegotiationFailed { status: 503 })
    ));
}

#[tokio::test]
async fn test_single_file_upload_preserves_signing_field_order() {
    let server = MockServer::start().await;
    mount_presign(&server).await;
    mount_signing(&server).await;
    mount_storage(&server).await;
    mount_callback(&server).await;

    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "reads.fastq", b"ACGTACGTACG");

    let report = upload_files(
        &config_for(&server),
        &credentials(),
        &[file.clone()],
        UploadOptions::default(),
    )
    .await
    .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.completed, vec![file]);

    let requests = server.received_requests().await.unwrap();
    let storage_body = &requests
        .iter()
        .find(|r| r.url.path() == "/storage")
        .expect("storage request")
        .body;

    // Multipart parts must appear exactly in the signing response's order,
    // with the file part strictly last.
    let positions = [
        byte_position(storage_body, "name=\"policy\""),
        byte_position(storage_body, "name=\"AWSAccessKeyId\""),
        byte_position(storage_body, "name=\"signature\""),
        byte_position(storage_body, "name=\"key\""),
        byte_position(storage_body, "name=\"acl\""),
        byte_position(storage_body, "name=\"file\""),
    ];
    assert!(
        positions.windows(2).all(|pair| pair[0] < pair[1]),
        "multipart field order was not preserved: {positions:?}"
    );

    // The file part carries the base filename and the fixed content type.
    let file_part = byte_position(storage_body, "name=\"file\"");
    assert!(byte_position(storage_body, "filename=\"reads.fastq\"") > file_part);
    assert!(byte_position(storage_body, "text/plain") > file_part);

    // The callback carries the storage location and the file's byte size.
    let callback_body = &requests
        .iter()
        .find(|r| r.url.path() == "/s3_confirm")
        .expect("callback request")
        .body;
    let callback_text = String::from_utf8_lossy(callback_body);
    assert!(callback_text.contains("location="));
    assert!(callback_text.contains("size=11"));
}

#[tokio::test]
async fn test_three_files_two_slots_all_receive_callbacks() {
    let server = MockServer::start().await;
    mount_presign(&server).await;
    mount_signing(&server).await;
    mount_storage(&server).await;

    Mock::given(method("POST"))
        .and(path("/s3_confirm"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let files = vec![
        write_file(&dir, "a.fastq", b"AAAA"),
        write_file(&dir, "b.fastq", b"CCCC"),
        write_file(&dir, "c.fastq", b"GGGG"),
    ];

    let report = upload_files(
        &config_for(&server),
        &credentials(),
        &files,
        UploadOptions {
            concurrency_limit: 2,
            enable_concurrency: true,
        },
    )
    .await
    .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.completed.len(), 3);
}

#[tokio::test]
async fn test_storage_500_fails_that_file_and_keeps_earlier_completions() {
    let server = MockServer::start().await;
    mount_presign(&server).await;
    mount_signing(&server).await;
    mount_callback(&server).await;

    // The second file's storage POST fails; the others succeed.
    Mock::given(method("POST"))
        .and(path("/storage"))
        .and(body_string_contains("bad.fastq"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/storage"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "https://storage.test/uploads/ok"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let good = write_file(&dir, "a.fastq", b"AAAA");
    let bad = write_file(&dir, "bad.fastq", b"CCCC");
    let never = write_file(&dir, "c.fastq", b"GGGG");

    let report = upload_files(
        &config_for(&server),
        &credentials(),
        &[good.clone(), bad.clone(), never.clone()],
        UploadOptions {
            concurrency_limit: 1,
            enable_concurrency: false,
        },
    )
    .await
    .unwrap();

    // File 1 already finalized and is not rolled back.
    assert_eq!(report.completed, vec![good]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, bad);
    assert!(matches!(
        report.failed[0].1,
        UploadError::StorageUploadFailed { status: 500, .. }
    ));
    assert_eq!(report.cancelled, vec![never]);
}

#[tokio::test]
async fn test_signing_401_surfaces_as_authentication_failure() {
    let server = MockServer::start().await;
    mount_presign(&server).await;

    Mock::given(method("POST"))
        .and(path("/s3_sign"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "reads.fastq", b"ACGT");

    let report = upload_files(
        &config_for(&server),
        &credentials(),
        &[file.clone()],
        UploadOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, file);
    assert!(matches!(
        report.failed[0].1,
        UploadError::AuthenticationFailed
    ));
}

#[tokio::test]
async fn test_callback_non_200_is_callback_failure() {
    let server = MockServer::start().await;
    mount_presign(&server).await;
    mount_signing(&server).await;
    mount_storage(&server).await;

    Mock::given(method("POST"))
        .and(path("/s3_confirm"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "reads.fastq", b"ACGT");

    let report = upload_files(
        &config_for(&server),
        &credentials(),
        &[file.clone()],
        UploadOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        UploadError::CallbackFailed { status: 502, .. }
    ));
}

#[tokio::test]
async fn test_storage_missing_location_header_is_an_error() {
    let server = MockServer::start().await;
    mount_presign(&server).await;
    mount_signing(&server).await;
    mount_callback(&server).await;

    Mock::given(method("POST"))
        .and(path("/storage"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_file(&dir, "reads.fastq", b"ACGT");

    let report = upload_files(
        &config_for(&server),
        &credentials(),
        &[file],
        UploadOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        UploadError::MissingLocation { .. }
    ));
}
