//! Diagnostic capture of the portal login page: a screenshot plus the HTML
//! the browser actually renders. This exists to debug selector drift and is
//! wired to its own route; it never substitutes for the login flow.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::browser::BrowserLauncher;
use super::login::{stage_error, DriverError, Stage};
use crate::config::PortalConfig;

/// Files written by one capture run.
#[derive(Debug, Clone)]
pub struct CaptureArtifacts {
    pub screenshot: PathBuf,
    pub page: PathBuf,
}

pub async fn capture_login_page(
    launcher: &dyn BrowserLauncher,
    portal: &PortalConfig,
    out_dir: &Path,
) -> Result<CaptureArtifacts, DriverError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| stage_error(Stage::Launch)(e.into()))?;
    let mut session = launcher
        .launch()
        .await
        .map_err(|source| DriverError::Unavailable { source })?;
    let outcome = async {
        session
            .goto(&portal.login_url)
            .await
            .map_err(stage_error(Stage::NavigateToLogin))?;
        // A missing email field is part of what this capture is for, so a
        // timeout while waiting for it is not fatal here.
        let _ = session
            .wait_for_selector(&portal.email_selector, portal.timeouts.email_field)
            .await;
        let shot = session
            .screenshot()
            .await
            .map_err(stage_error(Stage::NavigateToLogin))?;
        let html = session
            .page_source()
            .await
            .map_err(stage_error(Stage::NavigateToLogin))?;
        let screenshot = out_dir.join("login.png");
        let page = out_dir.join("login.html");
        std::fs::write(&screenshot, shot).map_err(|e| stage_error(Stage::NavigateToLogin)(e.into()))?;
        std::fs::write(&page, html).map_err(|e| stage_error(Stage::NavigateToLogin)(e.into()))?;
        Ok(CaptureArtifacts { screenshot, page })
    }
    .await;
    if let Err(e) = session.close().await {
        warn!(target: "portalgate::portal", "browser teardown failed: {e}");
    }
    if outcome.is_ok() {
        info!(target: "portalgate::portal", "captured portal login page into {}", out_dir.display());
    }
    outcome
}
