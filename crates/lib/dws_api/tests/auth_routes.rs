mod common;

use axum::http::StatusCode;
use common::TestApp;
use dws_core::models::audit::AuditAction;
use serde_json::json;

#[tokio::test]
async fn login_me_refresh_logout() {
    let t = TestApp::new();
    t.user("alice", "alice@x.io", "P@ssw0rd1").await;

    let (status, body) = t
        .post("/auth/login", None, json!({ "email": "Alice@x.io", "password": "P@ssw0rd1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@x.io");
    assert_eq!(body["user"]["role"], "physician");
    assert!(body["user"].get("passwordHash").is_none());
    assert!(body["expiresAt"].is_string());
    let bearer = body["token"].as_str().unwrap().to_string();
    let refresh = body["refreshToken"].as_str().unwrap().to_string();

    let (status, me) = t.get("/auth/me", Some(&bearer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");

    let (status, rotated) = t
        .post("/auth/refresh", None, json!({ "refreshToken": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_bearer = rotated["token"].as_str().unwrap().to_string();

    let (status, err) = t.get("/auth/me", Some(&bearer)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "unauthorized");

    let (status, _) = t
        .post("/auth/refresh", None, json!({ "refreshToken": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.post("/auth/logout", Some(&new_bearer), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.get("/auth/me", Some(&new_bearer)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The forwarded client address reaches the audit trail.
    let login = t
        .audit
        .events()
        .into_iter()
        .find(|e| e.action == AuditAction::LoginSuccess)
        .unwrap();
    assert_eq!(login.ip_address, "203.0.113.10");
}

#[tokio::test]
async fn missing_or_malformed_bearer_is_unauthorized() {
    let t = TestApp::new();
    let (status, body) = t.get("/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Missing authorization header");

    let (status, _) = t.get("/auth/me", Some("not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lockout_is_forbidden() {
    let t = TestApp::new();
    t.user("bob", "bob@x.io", "C0rrect!pw").await;
    let wrong = json!({ "email": "bob@x.io", "password": "wrong" });

    for _ in 0..4 {
        let (status, _) = t.post("/auth/login", None, wrong.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = t.post("/auth/login", None, wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "account_locked");
}

#[tokio::test]
async fn inactive_account_is_unauthorized() {
    let t = TestApp::new();
    let dave = t.user("dave", "dave@x.io", "D@vePass1").await;
    t.users.set_active(dave.id, false);

    let (status, _) = t
        .post("/auth/login", None, json!({ "email": "dave@x.io", "password": "D@vePass1" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_over_http() {
    let t = TestApp::new();
    t.user("gus", "gus@x.io", "Gu$pass12").await;
    let bearer = t.login("gus@x.io", "Gu$pass12").await;

    let (status, body) = t
        .post(
            "/auth/change-password",
            Some(&bearer),
            json!({ "currentPassword": "Gu$pass12", "newPassword": "weak" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = t
        .post(
            "/auth/change-password",
            Some(&bearer),
            json!({ "currentPassword": "Gu$pass12", "newPassword": "N3w!secret" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    t.login("gus@x.io", "N3w!secret").await;
}

#[tokio::test]
async fn password_reset_over_http() {
    let t = TestApp::new();
    t.user("carol", "carol@x.io", "0ld!Passw").await;

    let (status, body) = t
        .post("/auth/forgot-password", None, json!({ "email": "carol@x.io" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = t
        .post("/auth/validate-reset-code", None, json!({ "code": t.last_code() }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _) = t
        .post(
            "/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "NewP@ss1!" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    t.login("carol@x.io", "NewP@ss1!").await;

    let (status, body) = t
        .post(
            "/auth/reset-password",
            None,
            json!({ "token": token, "newPassword": "Other#Pass2" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn forgot_password_does_not_reveal_accounts() {
    let t = TestApp::new();
    let ivy = t.user("ivy", "ivy@x.io", "Ivy!pass1").await;
    t.users.set_active(ivy.id, false);

    let (known_status, known) = t
        .post("/auth/forgot-password", None, json!({ "email": "ivy@x.io" }))
        .await;
    let (ghost_status, ghost) = t
        .post("/auth/forgot-password", None, json!({ "email": "ghost@x.io" }))
        .await;
    assert_eq!(known_status, StatusCode::OK);
    assert_eq!(ghost_status, StatusCode::OK);
    assert_eq!(known, ghost);
    assert!(t.mailer.sent().is_empty());
}

#[tokio::test]
async fn forgot_password_rate_limit_answers_like_unknown_email() {
    let t = TestApp::new();
    t.user("kim", "kim@x.io", "K1m!passw").await;
    let body = json!({ "email": "kim@x.io" });

    for _ in 0..3 {
        let (status, _) = t.post("/auth/forgot-password", None, body.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, limited) = t.post("/auth/forgot-password", None, body).await;
    assert_eq!(status, StatusCode::OK);
    let (_, unknown) = t
        .post("/auth/forgot-password", None, json!({ "email": "nobody@x.io" }))
        .await;
    assert_eq!(limited, unknown);
    assert_eq!(t.mailer.sent().len(), 3);
}
