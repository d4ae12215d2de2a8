use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use httpmock::prelude::*;
use huddle_chats::{FileSessionStore, LOGIN_ROUTE};
use huddle_config::{AppConfig, RunMode};
use huddle_runtime::ClientServices;
use serde_json::json;
use tempfile::TempDir;

struct TestContext {
    _temp_dir: TempDir,
    config: AppConfig,
    sessions: FileSessionStore,
}

impl TestContext {
    fn new(server: &MockServer, mode: RunMode) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let mut config = AppConfig::default();
        config.mode = mode;
        config.backend.base_url = server.url("/project/");
        config.session.token_path = temp_dir.path().join("session.json");

        let sessions = FileSessionStore::from_config(&config.session);
        sessions.save(&sessions.issue("tok-1", true, Utc::now()))?;

        Ok(Self {
            _temp_dir: temp_dir,
            config,
            sessions,
        })
    }

    fn services(&self, route: &str) -> Result<ClientServices> {
        ClientServices::initialise(&self.config, route).context("failed to initialise services")
    }
}

async fn reject_current_member(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/project/currentMember/rows");
            then.status(401).json_body(json!({"message": "jwt expired"}));
        })
        .await;
}

#[tokio::test]
async fn initialise_uses_the_saved_token() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/project/currentMember/rows")
                .header("authorization", "Bearer tok-1");
            then.status(200)
                .json_body(json!({"nodes": [{"id": "m1", "email": "ada@example.com"}]}));
        })
        .await;
    let ctx = TestContext::new(&server, RunMode::Development)?;

    let services = ctx.services("/")?;
    let member = services.directory.current_member().await?;

    mock.assert_async().await;
    assert_eq!(member.map(|m| m.id).as_deref(), Some("m1"));
    Ok(())
}

#[tokio::test]
async fn unauthorized_in_production_clears_the_session() -> Result<()> {
    let server = MockServer::start_async().await;
    reject_current_member(&server).await;
    let ctx = TestContext::new(&server, RunMode::Production)?;

    let services = ctx.services("/")?;
    assert!(services.directory.current_member().await.is_err());

    assert!(services.redirected_to_login());
    assert_eq!(ctx.sessions.load()?, None);
    Ok(())
}

#[tokio::test]
async fn unauthorized_on_the_login_page_keeps_the_session() -> Result<()> {
    let server = MockServer::start_async().await;
    reject_current_member(&server).await;
    let ctx = TestContext::new(&server, RunMode::Production)?;

    let services = ctx.services(LOGIN_ROUTE)?;
    assert!(services.directory.current_member().await.is_err());

    assert!(!services.redirected_to_login());
    assert!(ctx.sessions.load()?.is_some());
    Ok(())
}

#[tokio::test]
async fn unauthorized_in_development_does_not_redirect() -> Result<()> {
    let server = MockServer::start_async().await;
    reject_current_member(&server).await;
    let ctx = TestContext::new(&server, RunMode::Development)?;

    let services = ctx.services("/")?;
    assert!(services.directory.current_member().await.is_err());

    assert!(!services.redirected_to_login());
    assert!(ctx.sessions.load()?.is_some());
    Ok(())
}

#[test]
fn expired_sessions_are_not_sent() -> Result<()> {
    let server = MockServer::start();
    let ctx = TestContext::new(&server, RunMode::Development)?;
    ctx.sessions
        .save(&ctx.sessions.issue("old", true, Utc::now() - Duration::days(60)))?;

    let services = ctx.services("/")?;
    assert_eq!(services.client.token(), None);
    Ok(())
}

#[test]
fn registrar_targets_the_gateway() -> Result<()> {
    let server = MockServer::start();
    let mut ctx = TestContext::new(&server, RunMode::Development)?;
    ctx.config.http.address = "127.0.0.1".into();
    ctx.config.http.port = 9911;

    let registrar = ctx.services("/")?.registrar()?;
    assert_eq!(registrar.endpoint(), "http://127.0.0.1:9911/api/register");
    Ok(())
}
