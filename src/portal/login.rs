//! The staged login flow against the remote portal.
//!
//! One run drives the fixed email -> password -> submit sequence to a
//! terminal outcome. The portal emits no structured errors: a rejected email
//! shows up as the password field never appearing, and a rejected password
//! as the page never navigating away. Those waits are therefore bounded and
//! their timeouts are part of the outcome vocabulary rather than a fault.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use super::browser::{BrowserError, BrowserLauncher, BrowserSession};
use crate::config::PortalConfig;

/// One step of the fixed login sequence. Which stage a run died at is what
/// distinguishes "email rejected" from "password rejected" from a broken
/// portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Launch,
    NavigateToLogin,
    AwaitEmailField,
    SubmitEmail,
    AwaitPasswordField,
    SubmitPassword,
    AwaitPostLoginNavigation,
    HarvestSession,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Launch => "launch",
            Stage::NavigateToLogin => "navigate-to-login",
            Stage::AwaitEmailField => "await-email-field",
            Stage::SubmitEmail => "submit-email",
            Stage::AwaitPasswordField => "await-password-field",
            Stage::SubmitPassword => "submit-password",
            Stage::AwaitPostLoginNavigation => "await-post-login-navigation",
            Stage::HarvestSession => "harvest-session",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// No browser session could be acquired at all.
    #[error("no browser session available: {source}")]
    Unavailable {
        #[source]
        source: BrowserError,
    },
    /// A bounded wait elapsed; the portal never advanced past `stage`.
    #[error("portal did not advance past {stage}")]
    StageTimeout { stage: Stage },
    /// The flow completed but the authenticated area set no session cookie.
    /// Treated as invalid credentials, not as a browser fault.
    #[error("portal session cookie not present after login")]
    SessionCookieMissing,
    #[error("browser failure at {stage}: {source}")]
    Failed {
        stage: Stage,
        #[source]
        source: BrowserError,
    },
}

pub(super) fn stage_error(stage: Stage) -> impl Fn(BrowserError) -> DriverError {
    move |err| {
        if err.is_timeout() {
            DriverError::StageTimeout { stage }
        } else {
            DriverError::Failed { stage, source: err }
        }
    }
}

/// Drives one login attempt through the portal UI. Performs no persistence,
/// keeps no state between runs and never retries; retry policy belongs to
/// the caller.
pub struct LoginDriver {
    portal: PortalConfig,
}

impl LoginDriver {
    pub fn new(portal: PortalConfig) -> Self {
        Self { portal }
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    /// Run the full stage sequence to a terminal outcome. Once a browser
    /// session is acquired it is released on every exit path, exactly once.
    pub async fn run(
        &self,
        launcher: &dyn BrowserLauncher,
        email: &str,
        password: &str,
    ) -> Result<String, DriverError> {
        let mut session = launcher
            .launch()
            .await
            .map_err(|source| DriverError::Unavailable { source })?;
        let outcome = self.drive(session.as_mut(), email, password).await;
        if let Err(e) = session.close().await {
            warn!(target: "portalgate::portal", "browser teardown failed: {e}");
        }
        match &outcome {
            Ok(_) => info!(target: "portalgate::portal", "portal login flow completed"),
            Err(e) => info!(target: "portalgate::portal", "portal login flow ended: {e}"),
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        email: &str,
        password: &str,
    ) -> Result<String, DriverError> {
        let p = &self.portal;
        let t = &p.timeouts;

        session
            .goto(&p.login_url)
            .await
            .map_err(stage_error(Stage::NavigateToLogin))?;

        session
            .wait_for_selector(&p.email_selector, t.email_field)
            .await
            .map_err(stage_error(Stage::AwaitEmailField))?;
        session
            .type_text(&p.email_selector, email)
            .await
            .map_err(stage_error(Stage::SubmitEmail))?;
        session
            .click(&p.email_submit_selector)
            .await
            .map_err(stage_error(Stage::SubmitEmail))?;

        // The portal validates the email server-side before revealing the
        // password field; timing out here is how "email rejected" manifests.
        session
            .wait_for_selector(&p.password_selector, t.password_field)
            .await
            .map_err(stage_error(Stage::AwaitPasswordField))?;
        session
            .type_text(&p.password_selector, password)
            .await
            .map_err(stage_error(Stage::SubmitPassword))?;
        session
            .click(&p.password_submit_selector)
            .await
            .map_err(stage_error(Stage::SubmitPassword))?;

        // Likewise, staying on the login page is the only signal for a
        // rejected password.
        session
            .wait_for_navigation(t.post_login)
            .await
            .map_err(stage_error(Stage::AwaitPostLoginNavigation))?;

        session
            .goto(&p.dashboard_url)
            .await
            .map_err(stage_error(Stage::HarvestSession))?;
        let cookies = session
            .cookies()
            .await
            .map_err(stage_error(Stage::HarvestSession))?;
        match cookies.into_iter().find(|c| c.name == p.session_cookie) {
            Some(c) => Ok(c.value),
            None => Err(DriverError::SessionCookieMissing),
        }
    }
}
