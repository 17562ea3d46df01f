use std::sync::Arc;

use curator::api::{DEFAULT_LOGIN_ERROR, HttpAuthBackend};
use curator::session::{FileSessionStore, SESSION_FILE_NAME, SessionManager, SystemClock};
use curator::{ErrorKind, SyncError};
use httpmock::MockServer;
use serde_json::json;
use tempfile::TempDir;
use time::OffsetDateTime;

fn manager(server: &MockServer, dir: &TempDir) -> SessionManager {
    SessionManager::new(
        Arc::new(HttpAuthBackend::new(&server.base_url()).expect("auth backend")),
        Arc::new(FileSessionStore::in_dir(dir.path())),
        Arc::new(SystemClock),
        time::Duration::minutes(5),
    )
}

#[tokio::test]
async fn login_persists_and_restores_across_managers() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    let exp = OffsetDateTime::now_utc().unix_timestamp() + 3600;
    let login = server
        .mock_async(|when, then| {
            when.method("POST").path("/api/users/login");
            then.status(200).json_body(json!({
                "token": "tok-1",
                "exp": exp,
                "user": {"id": "u1", "email": "editor@example.org", "roles": ["admin"]}
            }));
        })
        .await;

    let dir = TempDir::new().expect("temp dir");
    let first = manager(&server, &dir);
    let session = first.login("editor@example.org", "secret").await?;
    assert_eq!(session.token, "tok-1");
    assert!(first.is_authenticated());
    assert!(dir.path().join(SESSION_FILE_NAME).exists());
    login.assert_async().await;

    let second = manager(&server, &dir);
    let restored = second.restore().await.expect("session restored");
    assert_eq!(restored.user.email, "editor@example.org");
    assert_eq!(restored.user.extra["roles"], json!(["admin"]));
    assert_eq!(second.token().as_deref(), Some("tok-1"));

    second.logout().await;
    assert!(!second.is_authenticated());
    assert!(!dir.path().join(SESSION_FILE_NAME).exists());
    Ok(())
}

#[tokio::test]
async fn session_inside_expiry_buffer_is_not_restored() -> Result<(), SyncError> {
    let server = MockServer::start_async().await;
    let exp = OffsetDateTime::now_utc().unix_timestamp() + 60;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/users/login");
            then.status(200).json_body(json!({
                "token": "tok-short",
                "exp": exp,
                "user": {"email": "editor@example.org"}
            }));
        })
        .await;

    let dir = TempDir::new().expect("temp dir");
    let first = manager(&server, &dir);
    first.login("editor@example.org", "secret").await?;
    assert!(!first.is_authenticated());

    let second = manager(&server, &dir);
    assert!(second.restore().await.is_none());
    assert!(!dir.path().join(SESSION_FILE_NAME).exists());
    Ok(())
}

#[tokio::test]
async fn rejected_login_reports_service_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/users/login");
            then.status(401).json_body(json!({
                "errors": [{"message": "The email or password provided is incorrect."}]
            }));
        })
        .await;

    let dir = TempDir::new().expect("temp dir");
    let manager = manager(&server, &dir);
    let err = manager
        .login("editor@example.org", "wrong")
        .await
        .expect_err("login rejected");
    assert_eq!(err.kind(), ErrorKind::Http);
    assert_eq!(err.message(), "The email or password provided is incorrect.");
    assert!(!manager.is_authenticated());
    assert!(!dir.path().join(SESSION_FILE_NAME).exists());
}

#[tokio::test]
async fn unreadable_login_body_uses_default_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/api/users/login");
            then.status(500).body("upstream down");
        })
        .await;

    let dir = TempDir::new().expect("temp dir");
    let err = manager(&server, &dir)
        .login("editor@example.org", "secret")
        .await
        .expect_err("login fails");
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.message(), DEFAULT_LOGIN_ERROR);
}
