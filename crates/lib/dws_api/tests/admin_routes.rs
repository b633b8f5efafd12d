mod common;

use axum::http::StatusCode;
use common::TestApp;
use dws_core::models::audit::AuditAction;
use serde_json::json;

async fn admin_bearer(t: &TestApp) -> String {
    t.super_admin("root@x.io", "R00t!admin").await;
    t.login("root@x.io", "R00t!admin").await
}

#[tokio::test]
async fn admin_routes_require_super_admin() {
    let t = TestApp::new();
    t.user("pat", "pat@x.io", "P@tient12").await;
    let bearer = t.login("pat@x.io", "P@tient12").await;

    let (status, _) = t.get("/admin/dropbox/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t.get("/admin/dropbox/status", Some(&bearer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = t.get("/admin/smtp", Some(&bearer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dropbox_admin_flow() {
    let t = TestApp::new();
    let bearer = admin_bearer(&t).await;

    let (status, body) = t.get("/admin/dropbox/status", Some(&bearer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], false);
    assert_eq!(body["state"], "unconfigured");

    let (status, body) = t
        .post("/admin/dropbox/authorize", Some(&bearer), json!({ "appKey": "k1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["authUrl"].as_str().unwrap();
    assert!(url.contains("client_id=k1"));
    // The configured redirect fills in when none is given.
    assert!(url.contains("portal.example"));

    let (status, body) = t
        .post("/admin/dropbox/authorize", Some(&bearer), json!({ "appKey": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = t
        .post(
            "/admin/dropbox/callback",
            Some(&bearer),
            json!({ "code": "bad", "appKey": "k1", "appSecret": "s1" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "external_error");

    let (status, body) = t
        .post(
            "/admin/dropbox/callback",
            Some(&bearer),
            json!({ "code": "abc", "appKey": "k1", "appSecret": "s1", "parentFolder": "/SOPS" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["state"], "connected");
    assert_eq!(body["status"]["parentFolder"], "/SOPS");
    assert!(!body.to_string().contains("s1\""));

    let (status, body) = t
        .post("/admin/dropbox/refresh", Some(&bearer), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tokenExpiry"].is_string());

    let (status, body) = t.post("/admin/dropbox/test", Some(&bearer), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = t
        .request("DELETE", "/admin/dropbox/configuration", Some(&bearer), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t
        .request("DELETE", "/admin/dropbox/configuration", Some(&bearer), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // A probe against nothing reports in the body.
    let (status, body) = t.post("/admin/dropbox/test", Some(&bearer), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    let actions: Vec<_> = t.audit.events().iter().map(|e| e.action).collect();
    assert!(actions.contains(&AuditAction::DropboxAuthorize));
    assert!(actions.contains(&AuditAction::DropboxForceRefresh));
    assert!(actions.contains(&AuditAction::DropboxDeleteConfiguration));
}

#[tokio::test]
async fn smtp_settings_keep_password_out_of_responses() {
    let t = TestApp::new();
    let bearer = admin_bearer(&t).await;

    let (status, body) = t.get("/admin/smtp", Some(&bearer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], false);

    let update = json!({
        "host": "smtp.example.org",
        "port": 587,
        "username": "mailer",
        "password": "hunter2",
        "fromEmail": "noreply@example.org",
        "fromName": "Doctor's Workspace"
    });
    let (status, body) = t
        .request("PUT", "/admin/smtp", Some(&bearer), Some(update))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isComplete"], true);
    assert_eq!(body["hasPassword"], true);
    assert!(!body.to_string().contains("hunter2"));

    // No password keeps the stored one.
    let (status, body) = t
        .request(
            "PUT",
            "/admin/smtp",
            Some(&bearer),
            Some(json!({
                "host": "smtp.example.org",
                "port": 465,
                "username": "mailer",
                "fromEmail": "noreply@example.org"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 465);
    assert_eq!(body["hasPassword"], true);

    let (status, body) = t
        .request(
            "PUT",
            "/admin/smtp",
            Some(&bearer),
            Some(json!({
                "host": "smtp.example.org",
                "port": 0,
                "username": "mailer",
                "fromEmail": "noreply@example.org"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
