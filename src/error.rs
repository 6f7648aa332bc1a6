//! Unified error taxonomy for the exchange engine and the HTTP layer.
//! Driver and store faults are translated here into a small set of
//! user-visible outcomes with HTTP mappings; stage-level detail never leaves
//! the server-side logs.

use thiserror::Error;

use crate::portal::login::{DriverError, Stage};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LoginError {
    /// Client input defect; rejected before any store read or browser launch.
    #[error("email and password are required")]
    MissingCredentials,
    /// The portal refused the credentials, or never advanced (`stage`), or
    /// set no session cookie (`stage` is None). The portal gives no
    /// structured error, so these are indistinguishable by design.
    #[error("portal did not accept the credentials")]
    CredentialsRejected { stage: Option<Stage> },
    /// Environment defect: no browser, or the browser itself failed.
    #[error("portal login unavailable: {detail}")]
    PortalUnavailable { detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl LoginError {
    pub fn from_driver(err: DriverError) -> Self {
        match err {
            DriverError::StageTimeout { stage } => LoginError::CredentialsRejected { stage: Some(stage) },
            DriverError::SessionCookieMissing => LoginError::CredentialsRejected { stage: None },
            DriverError::Unavailable { source } => {
                LoginError::PortalUnavailable { detail: source.to_string() }
            }
            DriverError::Failed { stage, source } => {
                LoginError::PortalUnavailable { detail: format!("{stage}: {source}") }
            }
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            LoginError::MissingCredentials => 400,
            LoginError::CredentialsRejected { .. } => 401,
            LoginError::PortalUnavailable { .. } => 502,
            LoginError::Store(_) => 500,
            LoginError::Internal(_) => 500,
        }
    }

    /// Short human-readable summary; never includes internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            LoginError::MissingCredentials => "Email and password are required.",
            LoginError::CredentialsRejected { .. } => "Invalid email or password.",
            LoginError::PortalUnavailable { .. } => "Login is temporarily unavailable.",
            LoginError::Store(_) => "Server storage error.",
            LoginError::Internal(_) => "Internal error.",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was presented at all.
    #[error("not authenticated")]
    NotAuthenticated,
    /// A token was presented but matches no identity: fabricated, or
    /// invalidated by a later login overwriting it.
    #[error("session token does not match any identity")]
    InvalidSession,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::NotAuthenticated => 401,
            AuthError::InvalidSession => 401,
            AuthError::Store(_) => 500,
        }
    }

    /// Whether the HTTP layer should clear the caller's cookie alongside
    /// the rejection.
    pub fn clears_cookie(&self) -> bool {
        matches!(self, AuthError::InvalidSession)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "Please log in to continue.",
            AuthError::InvalidSession => "Invalid session. Please log in again.",
            AuthError::Store(_) => "Server storage error.",
        }
    }
}
