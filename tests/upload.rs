//! HTTP integration tests for the upload endpoint.
//!
//! The router runs in-process (`tower::ServiceExt::oneshot`) against a canned
//! model, so these tests need no network and no API key.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use edgequake_llm::ImageData;
use invoice_vision::{router, AppState, ExtractError, InvoiceModel, ServiceConfig};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

const BOUNDARY: &str = "----invoice-vision-test-boundary";

const JPEG: [u8; 11] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

/// Model that always gives the same reply and counts its calls.
struct CannedModel {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl CannedModel {
    fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceModel for CannedModel {
    async fn generate(&self, _prompt: &str, image: ImageData) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!image.data.is_empty(), "model received an empty image");
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(ExtractError::ModelApi {
                message: message.clone(),
            }),
        }
    }
}

/// Model that swaps every saved upload for a directory of the same name, so
/// the post-extraction delete cannot succeed.
struct UndeletableUploadModel {
    upload_dir: PathBuf,
}

#[async_trait]
impl InvoiceModel for UndeletableUploadModel {
    async fn generate(&self, _prompt: &str, _image: ImageData) -> Result<String, ExtractError> {
        for entry in std::fs::read_dir(&self.upload_dir)? {
            let path = entry?.path();
            std::fs::remove_file(&path)?;
            std::fs::create_dir(&path)?;
        }
        Ok(r#"{"invoice_total": 40}"#.to_string())
    }
}

async fn app_with(model: Arc<CannedModel>, upload_dir: &Path) -> Router {
    let config = ServiceConfig::builder()
        .upload_dir(upload_dir)
        .delete_retry_delay_ms(1)
        .build()
        .expect("valid config");
    let state = AppState::new(config, model).await.expect("state");
    router(state)
}

/// Build a multipart body with one part per `(name, filename, bytes)`.
fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

// ── Successful extraction ────────────────────────────────────────────────────

#[tokio::test]
async fn upload_jpg_repairs_total_and_adds_vat() {
    let dir = TempDir::new().unwrap();
    let model =
        CannedModel::answering(r#"{"items":[{"TOTAL":"100"},{"TOTAL":"50"}],"invoice_total":null}"#);
    let app = app_with(model.clone(), dir.path()).await;

    let body = multipart_body(&[("file", Some("invoice.jpg"), &JPEG[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["data"]["invoice_total"], json!(150.0));
    assert_eq!(json["data"]["vat_rate"], json!(15));
    assert_eq!(json["data"]["vat_amount"], json!(22.5));
    assert_eq!(json["data"]["total_with_vat"], json!(172.5));
    assert_eq!(model.calls(), 1);
    assert!(dir_is_empty(dir.path()), "upload was not cleaned up");
}

#[tokio::test]
async fn reply_wrapped_in_prose_and_fences_is_parsed() {
    let dir = TempDir::new().unwrap();
    let reply = "Here is the extracted invoice:\n```json\n{\n  \"items\": [{\"ITEM_REFERENCE\": \"Milk\", \"QUANTITY\": 2, \"UNIT_PRICE\": 6.5, \"TOTAL\": 13}],\n  \"invoice_total\": 13,\n  \"invoice_number\": \"A-1009\",\n  \"seller_name\": \"Fresh Dairy Co.\"\n}\n```";
    let app = app_with(CannedModel::answering(reply), dir.path()).await;

    let body = multipart_body(&[("file", Some("Receipt.PNG"), &JPEG[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["data"]["items"][0]["ITEM_REFERENCE"], json!("Milk"));
    assert_eq!(json["data"]["invoice_number"], json!("A-1009"));
    assert_eq!(json["data"]["vat_amount"], json!(1.95));
    assert_eq!(json["data"]["total_with_vat"], json!(14.95));
}

#[tokio::test]
async fn other_form_fields_are_ignored() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering(r#"{"invoice_total": 10}"#), dir.path()).await;

    let body = multipart_body(&[
        ("note", None, &b"from the scanner"[..]),
        ("file", Some("scan.jpeg"), &JPEG[..]),
    ]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_with_vat"], json!(11.5));
}

// ── Extraction failures still answer 200 ─────────────────────────────────────

#[tokio::test]
async fn unparseable_reply_is_200_with_raw_text() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("I cannot read this image."), dir.path()).await;

    let body = multipart_body(&[("file", Some("invoice.jpg"), &JPEG[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "success": false,
            "error": "Failed to parse extracted data",
            "raw_text": "I cannot read this image."
        })
    );
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn model_error_is_200_with_message() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::failing("429 quota exhausted"), dir.path()).await;

    let body = multipart_body(&[("file", Some("invoice.pdf"), &b"%PDF-1.4\n%fake"[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": false, "error": "429 quota exhausted"}));
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn mislabelled_text_file_never_reaches_model() {
    let dir = TempDir::new().unwrap();
    let model = CannedModel::answering("{}");
    let app = app_with(model.clone(), dir.path()).await;

    let body = multipart_body(&[("file", Some("invoice.png"), &b"plain text, not a png"[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], json!(false));
    assert_eq!(model.calls(), 0);
    assert!(dir_is_empty(dir.path()));
}

// ── Client errors ────────────────────────────────────────────────────────────

#[tokio::test]
async fn disallowed_extension_is_400() {
    let dir = TempDir::new().unwrap();
    let model = CannedModel::answering("{}");
    let app = app_with(model.clone(), dir.path()).await;

    let body = multipart_body(&[("file", Some("invoice.txt"), &b"hello"[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "File type not allowed"}));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn missing_file_field_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("{}"), dir.path()).await;

    let body = multipart_body(&[("document", Some("invoice.jpg"), &JPEG[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "No file part"}));
}

#[tokio::test]
async fn file_field_without_filename_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("{}"), dir.path()).await;

    let body = multipart_body(&[("file", None, &b"not a file part"[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "No file part"}));
}

#[tokio::test]
async fn non_multipart_request_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("{}"), dir.path()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "No file part"}));
}

#[tokio::test]
async fn empty_filename_is_400() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("{}"), dir.path()).await;

    let body = multipart_body(&[("file", Some(""), &b""[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "No selected file"}));
}

#[tokio::test]
async fn oversized_body_is_413() {
    let dir = TempDir::new().unwrap();
    let config = ServiceConfig::builder()
        .upload_dir(dir.path())
        .max_upload_bytes(1024)
        .build()
        .unwrap();
    let model = CannedModel::answering("{}");
    let app = router(AppState::new(config, model.clone()).await.unwrap());

    let big = vec![0xFFu8; 4096];
    let body = multipart_body(&[("file", Some("invoice.jpg"), &big[..])]);
    let (status, _) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(model.calls(), 0);
    assert!(dir_is_empty(dir.path()));
}

#[tokio::test]
async fn save_failure_is_500_with_error_body() {
    let root = TempDir::new().unwrap();
    let upload_dir = root.path().join("uploads");
    let model = CannedModel::answering("{}");
    let app = app_with(model.clone(), &upload_dir).await;
    std::fs::remove_dir(&upload_dir).unwrap();

    let body = multipart_body(&[("file", Some("invoice.jpg"), &JPEG[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = json["error"].as_str().expect("error message");
    assert!(!message.is_empty());
    assert!(json.get("success").is_none());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn failed_cleanup_does_not_change_response() {
    let dir = TempDir::new().unwrap();
    let config = ServiceConfig::builder()
        .upload_dir(dir.path())
        .delete_attempts(2)
        .delete_retry_delay_ms(1)
        .build()
        .unwrap();
    let model = Arc::new(UndeletableUploadModel {
        upload_dir: dir.path().to_path_buf(),
    });
    let app = router(AppState::new(config, model).await.unwrap());

    let body = multipart_body(&[("file", Some("invoice.jpg"), &JPEG[..])]);
    let (status, json) = send(app, upload_request(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["data"]["total_with_vat"], json!(46.0));
    assert!(!dir_is_empty(dir.path()), "the swapped-in directory should remain");
}

// ── Other routes and start-up ────────────────────────────────────────────────

#[tokio::test]
async fn index_serves_upload_page() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("{}"), dir.path()).await;

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("upload-form"));
}

#[tokio::test]
async fn health_check_is_ok() {
    let dir = TempDir::new().unwrap();
    let app = app_with(CannedModel::answering("{}"), dir.path()).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn startup_creates_dir_and_sweeps_leftovers() {
    let root = TempDir::new().unwrap();
    let upload_dir = root.path().join("uploads");
    std::fs::create_dir(&upload_dir).unwrap();
    std::fs::write(upload_dir.join("invoice-leftover.jpg"), JPEG).unwrap();
    std::fs::write(upload_dir.join("README"), b"keep me").unwrap();

    let config = ServiceConfig::builder().upload_dir(&upload_dir).build().unwrap();
    AppState::new(config, CannedModel::answering("{}")).await.unwrap();

    assert!(!upload_dir.join("invoice-leftover.jpg").exists());
    assert!(upload_dir.join("README").exists());

    let fresh = root.path().join("fresh");
    let config = ServiceConfig::builder().upload_dir(&fresh).build().unwrap();
    AppState::new(config, CannedModel::answering("{}")).await.unwrap();
    assert!(fresh.is_dir());
}

#[tokio::test]
async fn concurrent_same_name_uploads_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let model = CannedModel::answering(r#"{"invoice_total": 20}"#);
    let app = app_with(model.clone(), dir.path()).await;

    let requests = (0..8).map(|_| {
        let app = app.clone();
        tokio::spawn(async move {
            let body = multipart_body(&[("file", Some("invoice.jpg"), &JPEG[..])]);
            send(app, upload_request(body)).await
        })
    });

    for handle in requests.collect::<Vec<_>>() {
        let (status, json) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total_with_vat"], json!(23.0));
    }
    assert_eq!(model.calls(), 8);
    assert!(dir_is_empty(dir.path()));
}
