//! HTTP-level tests for the admin API over the in-memory ports.
//!
//! These pin the response contract the portal depends on: status codes per
//! failing step, the `{ success, ... }` envelope, and the bearer guard.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use alumni_admin::router::build_router;
use alumni_admin::state::AppState;
use alumni_core::memory::MemoryBackend;
use alumni_core::PendingRegistration;

// ── Test app builder ───────────────────────────────────────────

const TOKEN: &str = "test-admin-token";

fn app(backend: &MemoryBackend, token: Option<&str>) -> Router {
    let service = backend.service().with_mailer(backend.mailer.clone());
    build_router(AppState::new(service, "alumni-admin-test", token))
}

fn app_without_mailer(backend: &MemoryBackend) -> Router {
    build_router(AppState::new(backend.service(), "alumni-admin-test", None))
}

async fn seeded() -> MemoryBackend {
    let backend = MemoryBackend::new();
    let mut registration = PendingRegistration::new("r1", "a@b.edu", "Ana", "Cruz");
    registration.graduation_year = Some(2021);
    backend.registrations.seed(registration).await;
    backend
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn approve(id: &str) -> Request<Body> {
    post_json("/api/admin/approve-registration", json!({ "registrationId": id }))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

// ── Health ─────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_service_name() {
    let backend = MemoryBackend::new();
    let request = Request::get("/api/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(&backend, Some(TOKEN)), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "service": "alumni-admin-test" }));
}

// ── Approval ───────────────────────────────────────────────────

#[tokio::test]
async fn approve_provisions_account_and_removes_registration() {
    let backend = seeded().await;
    let (status, body) = send(app(&backend, None), approve("r1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let user_id = body["userId"].as_str().unwrap().to_string();
    assert!(body.get("warning").is_none());

    let user = backend.users.get(&user_id).await.unwrap();
    assert_eq!(user.email, "a@b.edu");
    let profile = backend.profiles.get(&user_id).await.unwrap();
    assert_eq!(profile.fields.graduation_year, Some(2021));
    assert!(!backend.registrations.contains("r1").await);
}

#[tokio::test]
async fn approve_without_body_is_400() {
    let backend = seeded().await;
    let request = Request::post("/api/admin/approve-registration")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "registrationId is required");
}

#[tokio::test]
async fn approve_unknown_registration_is_404() {
    let backend = seeded().await;
    let (status, body) = send(app(&backend, None), approve("nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["step"], "fetch_registration");
    assert_eq!(backend.users.count().await, 0);
}

#[tokio::test]
async fn second_approval_is_404() {
    let backend = seeded().await;
    let (first, _) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(first, StatusCode::OK);
    let (second, _) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(second, StatusCode::NOT_FOUND);
    assert_eq!(backend.identities.all().await.len(), 1);
}

#[tokio::test]
async fn existing_identity_is_403_and_registration_kept() {
    let backend = seeded().await;
    backend.identities.register_existing("a@b.edu").await;

    let (status, body) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["step"], "provision_identity");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("already been registered"));
    assert!(backend.registrations.contains("r1").await);
    assert!(!backend.registrations.is_claimed("r1").await);
}

#[tokio::test]
async fn user_write_failure_is_400_and_identity_rolled_back() {
    let backend = seeded().await;
    backend.users.fail_inserts("role check violated").await;

    let (status, body) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["step"], "write_user");
    assert!(body.get("orphans").is_none());
    assert!(backend.identities.all().await.is_empty());
    assert!(backend.registrations.contains("r1").await);
}

#[tokio::test]
async fn failed_rollback_is_reported_as_orphan() {
    let backend = seeded().await;
    backend.users.fail_inserts("role check violated").await;
    backend.identities.fail_deletes("identity service down").await;

    let (status, body) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let orphans = body["orphans"].as_array().unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0]["resource"], "identity");
}

#[tokio::test]
async fn approval_in_progress_is_409() {
    let backend = seeded().await;
    backend.registrations.mark_claimed("r1").await;

    let (status, body) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(backend.identities.all().await.is_empty());
}

#[tokio::test]
async fn cleanup_failure_succeeds_with_warning() {
    let backend = seeded().await;
    backend.registrations.fail_deletes("connection reset").await;

    let (status, body) = send(app(&backend, None), approve("r1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["userId"].is_string());
    assert!(body["warning"]
        .as_str()
        .unwrap()
        .contains("connection reset"));

    // The stale row can then be removed through the reject route.
    backend.registrations.heal().await;
    let request = Request::delete("/api/admin/registrations/r1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert!(!backend.registrations.contains("r1").await);
}

// ── Listing and rejection ──────────────────────────────────────

#[tokio::test]
async fn list_returns_pending_registrations() {
    let backend = seeded().await;
    backend
        .registrations
        .seed(PendingRegistration::new("r2", "c@d.edu", "Ben", "Diaz"))
        .await;

    let request = Request::get("/api/admin/registrations?limit=1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let registrations = body["registrations"].as_array().unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0]["first_name"], "Ana");
}

#[tokio::test]
async fn reject_unknown_registration_is_404() {
    let backend = MemoryBackend::new();
    let request = Request::delete("/api/admin/registrations/r9")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Direct account creation ────────────────────────────────────

#[tokio::test]
async fn create_user_provisions_requested_role() {
    let backend = MemoryBackend::new();
    let request = post_json(
        "/api/admin/create-user",
        json!({
            "email": " Staff@B.edu ",
            "password": "hunter22",
            "role": "admin",
            "firstName": "Sam",
            "lastName": "Reyes",
        }),
    );
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::OK);

    let user = backend
        .users
        .get(body["userId"].as_str().unwrap())
        .await
        .unwrap();
    assert_eq!(user.email, "staff@b.edu");
    assert_eq!(user.role.as_str(), "admin");
}

#[tokio::test]
async fn create_user_with_bad_role_is_400() {
    let backend = MemoryBackend::new();
    let request = post_json(
        "/api/admin/create-user",
        json!({ "email": "a@b.edu", "role": "root", "firstName": "A", "lastName": "B" }),
    );
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown role"));
    assert_eq!(backend.identities.all().await.len(), 0);
}

#[tokio::test]
async fn create_user_with_malformed_body_is_400() {
    let backend = MemoryBackend::new();
    let request = post_json("/api/admin/create-user", json!({ "email": "a@b.edu" }));
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

// ── Test email ─────────────────────────────────────────────────

#[tokio::test]
async fn test_email_without_provider_is_503() {
    let backend = MemoryBackend::new();
    let request = post_json("/api/admin/test-email", json!({ "to": "a@b.edu" }));
    let (status, _) = send(app_without_mailer(&backend), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_email_returns_provider_response() {
    let backend = MemoryBackend::new();
    let request = post_json("/api/admin/test-email", json!({ "to": "a@b.edu" }));
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["providerResponse"]["id"], "memory-1");
    assert_eq!(backend.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn test_email_rejected_by_provider_is_502() {
    let backend = MemoryBackend::new();
    backend.mailer.block("a@b.edu").await;
    let request = post_json("/api/admin/test-email", json!({ "to": "a@b.edu" }));
    let (status, body) = send(app(&backend, None), request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["step"], "send_email");
}

// ── Bearer guard ───────────────────────────────────────────────

#[tokio::test]
async fn admin_routes_require_token_when_configured() {
    let backend = seeded().await;

    let (status, body) = send(app(&backend, Some(TOKEN)), approve("r1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(backend.registrations.contains("r1").await);

    let mut request = approve("r1");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        "Bearer wrong-token".parse().unwrap(),
    );
    let (status, _) = send(app(&backend, Some(TOKEN)), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = approve("r1");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", TOKEN).parse().unwrap(),
    );
    let (status, body) = send(app(&backend, Some(TOKEN)), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn health_is_public_when_token_configured() {
    let backend = MemoryBackend::new();
    let request = Request::get("/api/health").body(Body::empty()).unwrap();
    let (status, _) = send(app(&backend, Some(TOKEN)), request).await;
    assert_eq!(status, StatusCode::OK);
}
