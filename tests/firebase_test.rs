use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use lesson_admin::config::FirebaseConfig;
use lesson_admin::firebase::FirebaseBackend;
use lesson_admin::transcript::parse_transcript_str;
use lesson_admin::{
    single_email, AuthError, DocumentStore, LessonForm, LessonUploader, MediaFile, SessionError,
    SessionGuard, SessionState, StoreError, UploadError,
};

const API_KEY: &str = "test-api-key";
const ID_TOKEN: &str = "test-id-token";
const BUCKET: &str = "demo.appspot.com";
const ADMIN: &str = "admin@example.com";

/// Shared state for the fake Firebase services
#[derive(Default)]
struct MockFirebase {
    documents: Mutex<HashMap<String, Value>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_content_writes: AtomicBool,
}

type Shared = Arc<MockFirebase>;

fn api_error(status: StatusCode, message: &str, code: &str) -> axum::response::Response {
    (
        status,
        Json(json!({ "error": { "code": status.as_u16(), "message": message, "status": code } })),
    )
        .into_response()
}

fn has_token(headers: &HeaderMap, scheme: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("{} {}", scheme, ID_TOKEN))
        .unwrap_or(false)
}

async fn sign_in_handler(
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if params.get("key").map(String::as_str) != Some(API_KEY) {
        return api_error(StatusCode::BAD_REQUEST, "API_KEY_INVALID", "INVALID_ARGUMENT");
    }

    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    let known = [ADMIN, "editor@example.com"];

    if !known.contains(&email) {
        return api_error(StatusCode::BAD_REQUEST, "EMAIL_NOT_FOUND", "INVALID_ARGUMENT");
    }
    if password != "pw" {
        return api_error(StatusCode::BAD_REQUEST, "INVALID_PASSWORD", "INVALID_ARGUMENT");
    }

    Json(json!({
        "kind": "identitytoolkit#VerifyPasswordResponse",
        "localId": format!("uid-{}", email.len()),
        "email": email,
        "idToken": ID_TOKEN,
        "refreshToken": "refresh",
        "expiresIn": "3600",
        "registered": true
    }))
    .into_response()
}

async fn get_document_handler(
    State(state): State<Shared>,
    Path((_project, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !has_token(&headers, "Bearer") {
        return api_error(StatusCode::UNAUTHORIZED, "Missing token", "UNAUTHENTICATED");
    }
    match state.documents.lock().unwrap().get(&path) {
        Some(doc) => Json(doc.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Document not found", "NOT_FOUND"),
    }
}

async fn patch_document_handler(
    State(state): State<Shared>,
    Path((_project, path)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !has_token(&headers, "Bearer") {
        return api_error(StatusCode::UNAUTHORIZED, "Missing token", "UNAUTHENTICATED");
    }
    if path.contains("/contentList/") && state.fail_content_writes.load(Ordering::SeqCst) {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable", "INTERNAL");
    }

    let mut documents = state.documents.lock().unwrap();
    let must_be_new = params.get("currentDocument.exists").map(String::as_str) == Some("false");
    if must_be_new && documents.contains_key(&path) {
        return api_error(StatusCode::CONFLICT, "Document already exists", "ALREADY_EXISTS");
    }

    documents.insert(path.clone(), body.clone());
    let mut resource = body;
    resource["name"] = json!(format!("projects/demo/databases/(default)/documents/{}", path));
    Json(resource).into_response()
}

async fn upload_object_handler(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !has_token(&headers, "Firebase") {
        return api_error(StatusCode::UNAUTHORIZED, "Missing token", "UNAUTHENTICATED");
    }
    let Some(name) = params.get("name").cloned() else {
        return api_error(StatusCode::BAD_REQUEST, "missing name", "INVALID_ARGUMENT");
    };

    let size = body.len();
    state.objects.lock().unwrap().insert(name.clone(), body.to_vec());
    Json(json!({
        "name": name,
        "bucket": bucket,
        "size": size.to_string(),
        "contentType": headers.get("content-type").and_then(|v| v.to_str().ok()),
        "downloadTokens": "tok-1,tok-2"
    }))
    .into_response()
}

async fn get_object_handler(
    State(state): State<Shared>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !has_token(&headers, "Firebase") {
        return api_error(StatusCode::UNAUTHORIZED, "Missing token", "UNAUTHENTICATED");
    }
    match state.objects.lock().unwrap().get(&object) {
        Some(data) => Json(json!({
            "name": object,
            "bucket": bucket,
            "size": data.len().to_string(),
            "downloadTokens": "tok-1,tok-2"
        }))
        .into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Not Found", "NOT_FOUND"),
    }
}

/// Start a fake Firebase server
async fn start_mock_firebase(state: Shared) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/v1/accounts:signInWithPassword", post(sign_in_handler))
        .route(
            "/v1/projects/{project}/databases/(default)/documents/{*path}",
            get(get_document_handler).patch(patch_document_handler),
        )
        .route("/v0/b/{bucket}/o", post(upload_object_handler))
        .route("/v0/b/{bucket}/o/{object}", get(get_object_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    (url, handle)
}

fn firebase_config(url: &str) -> FirebaseConfig {
    FirebaseConfig {
        project_id: "demo".to_string(),
        storage_bucket: BUCKET.to_string(),
        credential_profile: "test".to_string(),
        auth_endpoint: url.to_string(),
        firestore_endpoint: format!("{}/", url),
        storage_endpoint: url.to_string(),
    }
}

fn spanish_submission_form() -> LessonForm {
    LessonForm {
        language: "Spanish".to_string(),
        content_number: "1".to_string(),
        title: "T".to_string(),
        description: "D".to_string(),
        ..LessonForm::default()
    }
}

const TRANSCRIPT: &str =
    "targetLanguage,nativeLanguage,startTime,endTime\nHola,Hello,00:00:01,00:00:02\n";

#[tokio::test]
async fn test_sign_in_and_upload_lesson() {
    let state = Shared::default();
    let (server_url, _handle) = start_mock_firebase(state.clone()).await;

    let url = server_url.clone();
    let record = tokio::task::spawn_blocking(move || {
        let backend = Arc::new(FirebaseBackend::new(&firebase_config(&url), API_KEY.to_string()).unwrap());
        let guard = SessionGuard::new(backend.clone(), single_email(ADMIN));
        assert_eq!(guard.state(), SessionState::Unauthenticated);

        guard.sign_in(ADMIN, "pw").unwrap();
        guard.authorize().unwrap();

        let submission = spanish_submission_form()
            .validate(
                parse_transcript_str(TRANSCRIPT).unwrap(),
                Some(MediaFile::from_bytes("lesson.mp4", vec![5u8; 300_000])),
            )
            .unwrap();

        let mut progress = Vec::new();
        let record = LessonUploader::new(backend.as_ref(), backend.as_ref())
            .submit(submission, &mut |p| progress.push(p))
            .unwrap();

        assert_eq!(progress.last().copied(), Some(100.0));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        // read back through the store
        let doc = backend
            .get("lessons/spanish/contentList/spanish1")
            .unwrap()
            .unwrap();
        assert_eq!(doc["contentNumber"].as_integer(), Some(1));
        assert_eq!(doc["transcript"].as_array().unwrap().len(), 1);
        assert!(backend.exists("lessons/spanish").unwrap());
        assert!(!backend.exists("lessons/french").unwrap());

        record
    })
    .await
    .unwrap();

    assert_eq!(
        record.media_reference,
        format!(
            "{}/v0/b/{}/o/videos%2Fspanish%2Fspanish1%2Flesson.mp4?alt=media&token=tok-1",
            server_url, BUCKET
        )
    );

    let documents = state.documents.lock().unwrap();
    let content = &documents["lessons/spanish/contentList/spanish1"];
    assert_eq!(content["fields"]["language"], json!({ "stringValue": "spanish" }));
    assert_eq!(content["fields"]["contentNumber"], json!({ "integerValue": "1" }));
    assert!(content["fields"]["createdAt"]["timestampValue"].is_string());
    assert_eq!(
        content["fields"]["transcript"]["arrayValue"]["values"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
    assert!(documents["lessons/spanish"]["fields"]["createdAt"]["timestampValue"].is_string());

    let objects = state.objects.lock().unwrap();
    assert_eq!(objects["videos/spanish/spanish1/lesson.mp4"].len(), 300_000);
}

#[tokio::test]
async fn test_unauthorized_identity_is_signed_out() {
    let state = Shared::default();
    let (server_url, _handle) = start_mock_firebase(state.clone()).await;

    tokio::task::spawn_blocking(move || {
        let backend = Arc::new(
            FirebaseBackend::new(&firebase_config(&server_url), API_KEY.to_string()).unwrap(),
        );
        let guard = SessionGuard::new(backend.clone(), single_email(ADMIN));

        let err = guard.sign_in("editor@example.com", "pw").unwrap_err();
        assert!(matches!(err, SessionError::UnauthorizedIdentity { .. }));
        assert_eq!(guard.state(), SessionState::Unauthenticated);

        // the ID token was dropped with the session
        assert!(matches!(
            backend.get("lessons/spanish"),
            Err(StoreError::NotSignedIn)
        ));
    })
    .await
    .unwrap();

    assert!(state.documents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_credentials() {
    let state = Shared::default();
    let (server_url, _handle) = start_mock_firebase(state).await;

    tokio::task::spawn_blocking(move || {
        let backend = Arc::new(
            FirebaseBackend::new(&firebase_config(&server_url), API_KEY.to_string()).unwrap(),
        );
        let guard = SessionGuard::new(backend.clone(), single_email(ADMIN));

        match guard.sign_in(ADMIN, "nope").unwrap_err() {
            SessionError::Auth(AuthError::InvalidCredentials(message)) => {
                assert!(message.contains("Incorrect password"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match guard.sign_in("ghost@example.com", "pw").unwrap_err() {
            SessionError::Auth(AuthError::InvalidCredentials(message)) => {
                assert!(message.contains("No user found"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let wrong_key =
            FirebaseBackend::new(&firebase_config(&server_url), "bad-key".to_string()).unwrap();
        let guard = SessionGuard::new(Arc::new(wrong_key), single_email(ADMIN));
        assert!(guard.sign_in(ADMIN, "pw").is_err());
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_section_create_is_conditional() {
    let state = Shared::default();
    let (server_url, _handle) = start_mock_firebase(state.clone()).await;

    tokio::task::spawn_blocking(move || {
        let backend = Arc::new(
            FirebaseBackend::new(&firebase_config(&server_url), API_KEY.to_string()).unwrap(),
        );
        let guard = SessionGuard::new(backend.clone(), single_email(ADMIN));
        guard.sign_in(ADMIN, "pw").unwrap();

        let uploader = LessonUploader::new(backend.as_ref(), backend.as_ref());
        assert!(uploader.ensure_section("Spanish").unwrap());
        assert!(!uploader.ensure_section("spanish").unwrap());
    })
    .await
    .unwrap();

    assert_eq!(state.documents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_document_write_failure_leaves_media() {
    let state = Shared::default();
    state.fail_content_writes.store(true, Ordering::SeqCst);
    let (server_url, _handle) = start_mock_firebase(state.clone()).await;

    tokio::task::spawn_blocking(move || {
        let backend = Arc::new(
            FirebaseBackend::new(&firebase_config(&server_url), API_KEY.to_string()).unwrap(),
        );
        let guard = SessionGuard::new(backend.clone(), single_email(ADMIN));
        guard.sign_in(ADMIN, "pw").unwrap();

        let submission = spanish_submission_form()
            .validate(
                parse_transcript_str(TRANSCRIPT).unwrap(),
                Some(MediaFile::from_bytes("lesson.mp4", vec![1u8; 1024])),
            )
            .unwrap();

        let err = LessonUploader::new(backend.as_ref(), backend.as_ref())
            .submit(submission, &mut |_| {})
            .unwrap_err();

        match err {
            UploadError::DocumentWrite { source, .. } => {
                assert!(matches!(source, StoreError::Rejected { status: 500, .. }))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    })
    .await
    .unwrap();

    assert!(state
        .objects
        .lock()
        .unwrap()
        .contains_key("videos/spanish/spanish1/lesson.mp4"));
    assert!(!state
        .documents
        .lock()
        .unwrap()
        .contains_key("lessons/spanish/contentList/spanish1"));
}
