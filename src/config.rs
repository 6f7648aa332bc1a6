//! Runtime configuration for the gateway: where the portal login flow lives,
//! how long each stage may wait, which trust model verifies credentials, and
//! where session material is persisted. Everything is overridable through
//! PORTALGATE_* environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// The fixed email -> password -> submit sequence on the remote portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub login_url: String,
    /// A known authenticated-area URL; loading it materializes the session
    /// cookie jar we harvest from.
    pub dashboard_url: String,
    pub email_selector: String,
    pub email_submit_selector: String,
    pub password_selector: String,
    pub password_submit_selector: String,
    /// Name of the cookie the portal sets for an authenticated session.
    pub session_cookie: String,
    pub timeouts: StageTimeouts,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: "https://learn.learn.nvidia.com/login".to_string(),
            dashboard_url: "https://learn.learn.nvidia.com/dashboard".to_string(),
            email_selector: "#email".to_string(),
            email_submit_selector: "button[type=\"submit\"]".to_string(),
            password_selector: "#signinPassword".to_string(),
            password_submit_selector: "#passwordLoginButton".to_string(),
            session_cookie: "sessionid".to_string(),
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Bounded waits for the three stages where the portal does its own work.
/// The password wait is long because the portal validates the email and
/// redirects before showing the field; the post-login wait is longer still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub email_field: Duration,
    pub password_field: Duration,
    pub post_login: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            email_field: Duration::from_secs(10),
            password_field: Duration::from_secs(40),
            post_login: Duration::from_secs(60),
        }
    }
}

/// Which trust model turns a credential pair into a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierMode {
    /// Drive the remote portal and harvest its cookie.
    Portal,
    /// Compare against the locally stored credential hash.
    Local,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub store_path: PathBuf,
    pub verifier: VerifierMode,
    /// Store an argon2 hash of the credential on successful portal exchange
    /// so local mode can be enabled later. Never stores plaintext.
    pub remember_credentials: bool,
    pub browser_executable: PathBuf,
    pub browser_args: Vec<String>,
    /// When set, mounts the diagnostic capture route writing into this dir.
    pub capture_dir: Option<PathBuf>,
    pub portal: PortalConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            store_path: PathBuf::from("token.json"),
            verifier: VerifierMode::Portal,
            remember_credentials: false,
            browser_executable: PathBuf::from("/usr/bin/chromium-browser"),
            browser_args: vec!["--no-sandbox".to_string(), "--disable-setuid-sandbox".to_string()],
            capture_dir: None,
            portal: PortalConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build a config from PORTALGATE_* environment variables, falling back
    /// to the defaults above for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = AppConfig::default();
        if let Some(port) = parse_port_env("PORTALGATE_HTTP_PORT") {
            cfg.http_port = port;
        }
        if let Some(path) = env_str("PORTALGATE_TOKEN_FILE") {
            cfg.store_path = PathBuf::from(path);
        }
        if let Some(mode) = env_str("PORTALGATE_VERIFIER") {
            cfg.verifier = match mode.to_lowercase().as_str() {
                "local" => VerifierMode::Local,
                _ => VerifierMode::Portal,
            };
        }
        if let Some(b) = parse_bool_env("PORTALGATE_REMEMBER_CREDENTIALS") {
            cfg.remember_credentials = b;
        }
        if let Some(exe) = env_str("PORTALGATE_BROWSER") {
            cfg.browser_executable = PathBuf::from(exe);
        }
        if let Some(dir) = env_str("PORTALGATE_CAPTURE_DIR") {
            cfg.capture_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = env_str("PORTALGATE_LOGIN_URL") {
            cfg.portal.login_url = url;
        }
        if let Some(url) = env_str("PORTALGATE_DASHBOARD_URL") {
            cfg.portal.dashboard_url = url;
        }
        if let Some(name) = env_str("PORTALGATE_SESSION_COOKIE") {
            cfg.portal.session_cookie = name;
        }
        cfg
    }
}

fn env_str(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn parse_bool_env(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(v) => {
            let s = v.to_lowercase();
            match s.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        }
        Err(_) => None,
    }
}
