//! Router-level tests for the No Pass server.
//!
//! Requests are driven through the full router (middleware included) with
//! `tower::ServiceExt::oneshot`; no socket is bound.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use nopass_core::directory::{CustomClaims, IdentityDirectory, UserRecord};
use nopass_core::{
    ClerkSessionVerifier, DirectoryError, IdentityBridge, LocalDirectory, ServiceAccount,
    SubjectId, TokenSigner,
};
use nopass_server::routes;
use nopass_server::state::AppState;
use nopass_storage::MemoryBackend;

const CLERK_PRIVATE: &str = include_str!("../../nopass-core/testdata/clerk_private.pem");
const CLERK_PUBLIC: &str = include_str!("../../nopass-core/testdata/clerk_public.pem");
const SERVICE_PRIVATE: &str = include_str!("../../nopass-core/testdata/service_account_private.pem");
const SERVICE_PUBLIC: &str = include_str!("../../nopass-core/testdata/service_account_public.pem");

struct UnavailableDirectory;

fn unavailable() -> DirectoryError {
    DirectoryError::Remote {
        reason: "identity service unavailable".to_owned(),
    }
}

#[async_trait]
impl IdentityDirectory for UnavailableDirectory {
    async fn create_custom_token(&self, _uid: &SubjectId) -> Result<String, DirectoryError> {
        Err(unavailable())
    }

    async fn set_custom_user_claims(
        &self,
        _uid: &SubjectId,
        _claims: CustomClaims,
    ) -> Result<(), DirectoryError> {
        Err(unavailable())
    }

    async fn get_user(&self, _uid: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        Err(unavailable())
    }
}

fn session_token(sub: &str) -> String {
    let now = i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs(),
    )
    .unwrap();
    let key = EncodingKey::from_rsa_pem(CLERK_PRIVATE.as_bytes()).unwrap();
    encode(
        &Header::new(Algorithm::RS256),
        &json!({ "sub": sub, "sid": "sess_1", "iat": now, "exp": now + 60 }),
        &key,
    )
    .unwrap()
}

fn signer() -> Arc<TokenSigner> {
    let account = ServiceAccount::new(
        "nopass-test",
        "firebase-adminsdk@nopass-test.iam.gserviceaccount.com",
        SERVICE_PRIVATE,
    );
    Arc::new(
        TokenSigner::new(account)
            .unwrap()
            .with_public_key(SERVICE_PUBLIC)
            .unwrap(),
    )
}

fn verifier() -> Arc<ClerkSessionVerifier> {
    Arc::new(ClerkSessionVerifier::from_pem(CLERK_PUBLIC).unwrap())
}

fn local_app() -> (Router, Arc<LocalDirectory>) {
    let local = Arc::new(LocalDirectory::new(Arc::new(MemoryBackend::new()), signer()).unwrap());
    let state = AppState {
        bridge: IdentityBridge::new(verifier(), local.clone()),
        local_directory: Some(local.clone()),
    };
    (routes::router(Arc::new(state)), local)
}

fn unavailable_app() -> Router {
    let state = AppState {
        bridge: IdentityBridge::new(verifier(), Arc::new(UnavailableDirectory)),
        local_directory: None,
    };
    routes::router(Arc::new(state))
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(uri)
}

fn with_session(builder: axum::http::request::Builder, sub: &str) -> axum::http::request::Builder {
    builder.header(header::COOKIE, format!("__session={}", session_token(sub)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

#[tokio::test]
async fn health_is_open_and_hardened() {
    let (app, _) = local_app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn bridge_routes_reject_missing_session_for_any_body() {
    let (app, local) = local_app();
    let bodies = [
        Body::empty(),
        json_body(&json!({})),
        json_body(&json!({ "userId": "user_123", "clerkId": "user_123" })),
        Body::from("not json"),
    ];

    for uri in ["/api/firebase-token", "/api/setFirebaseCustomClaims"] {
        for body in [Body::empty(), Body::from("{\"uid\":\"user_123\"}")] {
            let (status, response) = send(&app, post(uri).body(body).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(response, json!({ "error": "Unauthorized" }));
        }
    }
    for body in bodies {
        let (status, _) = send(
            &app,
            post("/api/firebase-token")
                .header(header::COOKIE, "__session=forged")
                .body(body)
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let subject = SubjectId::new("user_123").unwrap();
    assert!(local.get_user(&subject).await.unwrap().is_none());
}

#[tokio::test]
async fn signed_in_subject_bridges_end_to_end() {
    let (app, local) = local_app();

    let (status, minted) = send(
        &app,
        with_session(post("/api/firebase-token"), "user_123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(minted["firebaseUid"], "user_123");
    let custom_token = minted["firebaseToken"].as_str().unwrap();
    assert_eq!(custom_token.split('.').count(), 3);

    let (status, session) = send(
        &app,
        post("/identity/v1/accounts:signInWithCustomToken")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&json!({ "token": custom_token })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["localId"], "user_123");
    assert_eq!(session["expiresIn"], "3600");

    let (status, ack) = send(
        &app,
        with_session(post("/api/setFirebaseCustomClaims"), "user_123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "success": true }));

    let user = local
        .get_user(&SubjectId::new("user_123").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.custom_claims["clerkId"], "user_123");

    let (status, refreshed) = send(
        &app,
        post("/identity/v1/token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&json!({ "refreshToken": session["refreshToken"] })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let claims = local
        .verify_id_token(refreshed["idToken"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.custom["clerkId"], "user_123");
}

#[tokio::test]
async fn bearer_session_is_accepted() {
    let (app, _) = local_app();
    let (status, minted) = send(
        &app,
        post("/api/firebase-token")
            .header(header::AUTHORIZATION, format!("Bearer {}", session_token("user_9")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(minted["firebaseUid"], "user_9");
}

#[tokio::test]
async fn directory_failure_is_uniform_500() {
    let app = unavailable_app();
    for uri in ["/api/firebase-token", "/api/setFirebaseCustomClaims"] {
        let (status, body) = send(
            &app,
            with_session(post(uri), "user_123").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(body, json!({ "error": "Internal Server Error" }));
    }
}

#[tokio::test]
async fn identity_routes_reject_bad_credentials() {
    let (app, _) = local_app();

    let (status, body) = send(
        &app,
        post("/identity/v1/accounts:signInWithCustomToken")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&json!({ "token": "not-a-token" })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized" }));

    let (status, _) = send(
        &app,
        post("/identity/v1/token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&json!({ "refreshToken": "nprt_unknown" })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_routes_answer_unreadable_bodies_with_json_errors() {
    let (app, _) = local_app();

    let (status, body) = send(
        &app,
        post("/identity/v1/accounts:signInWithCustomToken")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"token\":"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Bad Request" }));

    let (status, body) = send(
        &app,
        post("/identity/v1/token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&json!({ "token": "wrong-field" })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body, json!({ "error": "Unprocessable Entity" }));

    let (status, body) = send(
        &app,
        post("/identity/v1/token")
            .body(json_body(&json!({ "refreshToken": "nprt_x" })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body, json!({ "error": "Unsupported Media Type" }));
}

#[tokio::test]
async fn identity_routes_are_absent_with_remote_directory() {
    let app = unavailable_app();
    let (status, _) = send(
        &app,
        post("/identity/v1/token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&json!({ "refreshToken": "nprt_x" })))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[cfg(feature = "redb-backend")]
#[tokio::test]
async fn claims_survive_restart_on_redb() {
    use nopass_storage::RedbBackend;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nopass.redb");

    {
        let storage = Arc::new(RedbBackend::open(&path).unwrap());
        let local = Arc::new(LocalDirectory::new(storage, signer()).unwrap());
        let state = AppState {
            bridge: IdentityBridge::new(verifier(), local.clone()),
            local_directory: Some(local),
        };
        let app = routes::router(Arc::new(state));
        let (status, _) = send(
            &app,
            with_session(post("/api/setFirebaseCustomClaims"), "user_123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let storage = Arc::new(RedbBackend::open(&path).unwrap());
    let local = LocalDirectory::new(storage, signer()).unwrap();
    let user = local
        .get_user(&SubjectId::new("user_123").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.custom_claims["clerkId"], "user_123");
}
