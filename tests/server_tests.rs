//! HTTP round trips over an ephemeral listener with a scripted browser
//! behind the exchange engine.

mod common;

use std::sync::Arc;

use anyhow::Result;
use tempfile::tempdir;

use portalgate::config::AppConfig;
use portalgate::server::{build_router, state_with_launcher};
use portalgate::store::SharedTokenStore;

use common::ScriptedPortal;

async fn spawn_app(config: AppConfig, script: ScriptedPortal) -> Result<String> {
    let store = SharedTokenStore::new(&config.store_path);
    let state = state_with_launcher(&config, store, Arc::new(script));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn login_session_logout_round_trip() -> Result<()> {
    let tmp = tempdir()?;
    let mut config = AppConfig::default();
    config.store_path = tmp.path().join("token.json");
    let script = ScriptedPortal::happy(&config.portal.session_cookie, "cookie123");
    let base = spawn_app(config, script).await?;

    let client = reqwest::Client::builder().cookie_store(true).build()?;

    let resp = client
        .post(format!("{base}/login"))
        .json(&serde_json::json!({"email": "a@x.com", "password": "pw"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client.get(format!("{base}/session")).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let v: serde_json::Value = resp.json().await?;
    assert_eq!(v.get("email").and_then(|e| e.as_str()), Some("a@x.com"));
    assert_eq!(v.get("device_linked").and_then(|d| d.as_bool()), Some(false));

    let resp = client.post(format!("{base}/logout")).send().await?;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client.get(format!("{base}/session")).send().await?;
    assert_eq!(resp.status().as_u16(), 401, "a cleared cookie no longer authorizes");
    Ok(())
}

#[tokio::test]
async fn rejected_credentials_come_back_as_401_with_a_short_message() -> Result<()> {
    let tmp = tempdir()?;
    let mut config = AppConfig::default();
    config.store_path = tmp.path().join("token.json");
    let mut script = ScriptedPortal::happy(&config.portal.session_cookie, "cookie123");
    script.visible_selectors.remove(&config.portal.password_selector);
    let base = spawn_app(config, script).await?;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/login"))
        .json(&serde_json::json!({"email": "a@x.com", "password": "bad"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);
    let v: serde_json::Value = resp.json().await?;
    assert_eq!(v.get("error").and_then(|e| e.as_str()), Some("Invalid email or password."));
    Ok(())
}

#[tokio::test]
async fn blank_credentials_come_back_as_400() -> Result<()> {
    let tmp = tempdir()?;
    let mut config = AppConfig::default();
    config.store_path = tmp.path().join("token.json");
    let script = ScriptedPortal::happy(&config.portal.session_cookie, "cookie123");
    let launches = script.obs.clone();
    let base = spawn_app(config, script).await?;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/login"))
        .json(&serde_json::json!({"email": "", "password": ""}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        launches.launches.load(std::sync::atomic::Ordering::SeqCst),
        0,
        "blank input must not reach the browser"
    );
    Ok(())
}

#[tokio::test]
async fn a_fabricated_cookie_is_rejected_and_cleared() -> Result<()> {
    let tmp = tempdir()?;
    let mut config = AppConfig::default();
    config.store_path = tmp.path().join("token.json");
    let script = ScriptedPortal::happy(&config.portal.session_cookie, "cookie123");
    let base = spawn_app(config, script).await?;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/session"))
        .header("cookie", "portalgate_token=forged")
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 401);
    let set_cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(set_cookie.contains("portalgate_token=deleted"), "stale cookie must be cleared: {set_cookie}");
    Ok(())
}

#[tokio::test]
async fn liveness_route_answers() -> Result<()> {
    let tmp = tempdir()?;
    let mut config = AppConfig::default();
    config.store_path = tmp.path().join("token.json");
    let script = ScriptedPortal::happy(&config.portal.session_cookie, "cookie123");
    let base = spawn_app(config, script).await?;

    let body = reqwest::get(&base).await?.text().await?;
    assert_eq!(body, "portalgate ok");
    Ok(())
}
