//! Browser automation capability the login flow is written against.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One cookie from the browser's jar for the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("devtools protocol: {0}")]
    Protocol(String),
    #[error("timed out")]
    TimedOut,
    #[error("websocket transport: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// Bounded waits report this; everything else is a fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::TimedOut)
    }
}

/// Launches isolated browser sessions. Every login attempt gets its own
/// session; nothing is shared between attempts.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Primitives over one live browser page. Waits take an explicit bound and
/// return `BrowserError::TimedOut` when it elapses; no method blocks forever.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and wait for the page load to complete.
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;
    /// Wait until the element matching `selector` exists and is visible.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    /// Focus the element matching `selector` and type `text` into it.
    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), BrowserError>;
    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;
    /// Wait for the page to navigate away from its current document.
    async fn wait_for_navigation(&mut self, timeout: Duration) -> Result<(), BrowserError>;
    /// Cookie jar for the current page.
    async fn cookies(&mut self) -> Result<Vec<Cookie>, BrowserError>;
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;
    async fn page_source(&mut self) -> Result<String, BrowserError>;
    /// Release the underlying browser. Callers invoke this exactly once per
    /// acquired session, on every exit path.
    async fn close(&mut self) -> Result<(), BrowserError>;
}
