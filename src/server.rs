//!
//! portalgate HTTP surface
//! -----------------------
//! Axum routes over the credential-exchange core.
//!
//! Responsibilities:
//! - `POST /login` runs one exchange and sets the session cookie on success.
//! - `GET /session` validates the presented cookie against the token store
//!   and returns the resolved identity.
//! - `POST /logout` clears the cookie; the store is keyed by email and needs
//!   no mutation for logout.
//! - `POST /diagnostics/portal` (mounted only when a capture directory is
//!   configured) dumps what the browser sees on the portal login page.
//! - Wiring of the configured trust model (portal-driven or local hash
//!   check) into the exchange engine.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::{self, authorize};
use crate::config::{AppConfig, VerifierMode};
use crate::engine::{CredentialVerifier, ExchangeEngine, LocalVerifier, PortalVerifier};
use crate::error::AuthError;
use crate::portal::browser::BrowserLauncher;
use crate::portal::capture;
use crate::portal::cdp::ChromiumLauncher;
use crate::portal::login::LoginDriver;
use crate::store::SharedTokenStore;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExchangeEngine>,
    pub store: SharedTokenStore,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub config: Arc<AppConfig>,
}

/// Start the server with configuration taken from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(AppConfig::from_env()).await
}

pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
    info!(
        "portalgate starting: port={}, store='{}', verifier={:?}, portal='{}'",
        config.http_port,
        config.store_path.display(),
        config.verifier,
        config.portal.login_url
    );
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let state = build_state(&config);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_state(config: &AppConfig) -> AppState {
    let store = SharedTokenStore::new(&config.store_path);
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(ChromiumLauncher::new(
        config.browser_executable.clone(),
        config.browser_args.clone(),
    ));
    state_with_launcher(config, store, launcher)
}

/// Assemble state around an externally supplied launcher. The round-trip
/// tests inject a scripted browser through this seam.
pub fn state_with_launcher(
    config: &AppConfig,
    store: SharedTokenStore,
    launcher: Arc<dyn BrowserLauncher>,
) -> AppState {
    let verifier: Arc<dyn CredentialVerifier> = match config.verifier {
        VerifierMode::Portal => Arc::new(PortalVerifier::new(
            LoginDriver::new(config.portal.clone()),
            launcher.clone(),
        )),
        VerifierMode::Local => Arc::new(LocalVerifier::new(store.clone())),
    };
    let engine = Arc::new(ExchangeEngine::new(
        store.clone(),
        verifier,
        config.remember_credentials,
    ));
    AppState { engine, store, launcher, config: Arc::new(config.clone()) }
}

pub fn build_router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { "portalgate ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(session));
    if state.config.capture_dir.is_some() {
        app = app.route("/diagnostics/portal", post(capture_portal));
    }
    app.with_state(state)
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    match state.engine.attempt_login(&payload.email, &payload.password).await {
        Ok(token) => {
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", auth::set_session_cookie(&token));
            (StatusCode::OK, headers, Json(json!({"status":"ok"})))
        }
        Err(e) => {
            // Full detail (including which stage stalled) goes to the log;
            // the response carries only a short summary.
            warn!("login refused for '{}': {e:?}", payload.email);
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, HeaderMap::new(), Json(json!({"status":"error","error": e.user_message()})))
        }
    }
}

async fn session(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let token = auth::session_token_from_headers(&headers);
    match authorize(&state.store, token.as_deref()) {
        Ok(identity) => (
            StatusCode::OK,
            HeaderMap::new(),
            Json(json!({
                "status": "ok",
                "email": identity.email,
                "device_linked": identity.device_linked,
            })),
        ),
        Err(e) => {
            let mut h = HeaderMap::new();
            if e.clears_cookie() {
                h.insert("Set-Cookie", auth::clear_session_cookie());
            }
            let label = if matches!(e, AuthError::Store(_)) {
                error!("session validation hit a store fault: {e}");
                "error"
            } else {
                "unauthorized"
            };
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, h, Json(json!({"status": label, "error": e.user_message()})))
        }
    }
}

async fn logout() -> impl IntoResponse {
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", auth::clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status":"ok"})))
}

async fn capture_portal(State(state): State<AppState>) -> impl IntoResponse {
    let Some(dir) = state.config.capture_dir.clone() else {
        // Route only exists when configured, but keep the handler total.
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status":"error","error":"capture not configured"})),
        );
    };
    match capture::capture_login_page(state.launcher.as_ref(), &state.config.portal, &dir).await {
        Ok(artifacts) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "screenshot": artifacts.screenshot.display().to_string(),
                "page": artifacts.page.display().to_string(),
            })),
        ),
        Err(e) => {
            error!("portal capture failed: {e}");
            (StatusCode::BAD_GATEWAY, Json(json!({"status":"error","error":"capture failed"})))
        }
    }
}
