//!
//! Chromium DevTools browser sessions
//! ----------------------------------
//! Production implementation of the browser capability. Launches a private
//! headless Chromium with an ephemeral remote-debugging port, discovers the
//! websocket endpoint through the DevTools HTTP interface, attaches to a
//! fresh page target and speaks flat-session CDP over a single websocket.
//!
//! Commands are correlated by id on one stream; events that arrive between
//! command replies are buffered so the navigation waits can consume them.
//! Teardown closes the browser, kills the process and removes the scratch
//! profile directory.

use std::collections::VecDeque;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::browser::{BrowserError, BrowserLauncher, BrowserSession, Cookie};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const EVENT_BUFFER_CAP: usize = 256;

/// Launches isolated headless Chromium sessions for the login flow.
pub struct ChromiumLauncher {
    executable: PathBuf,
    extra_args: Vec<String>,
}

impl ChromiumLauncher {
    pub fn new(executable: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self { executable: executable.into(), extra_args }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let session = CdpSession::launch(&self.executable, &self.extra_args).await?;
        Ok(Box::new(session))
    }
}

/// One attached page target over the DevTools websocket.
pub struct CdpSession {
    child: Child,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    session_id: String,
    next_id: u64,
    events: VecDeque<Value>,
    profile_dir: PathBuf,
    closed: bool,
}

impl CdpSession {
    async fn launch(executable: &Path, extra_args: &[String]) -> Result<Self, BrowserError> {
        let profile_dir = scratch_profile_dir();
        std::fs::create_dir_all(&profile_dir)?;
        match Self::launch_inner(executable, extra_args, &profile_dir).await {
            Ok(session) => Ok(session),
            Err(e) => {
                let _ = std::fs::remove_dir_all(&profile_dir);
                Err(e)
            }
        }
    }

    async fn launch_inner(
        executable: &Path,
        extra_args: &[String],
        profile_dir: &Path,
    ) -> Result<Self, BrowserError> {
        let port = free_port()?;
        let mut cmd = Command::new(executable);
        cmd.arg("--headless=new")
            .arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let child = cmd
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("spawn {}: {e}", executable.display())))?;

        let ws_url = discover_ws_url(port).await?;
        debug!(target: "portalgate::cdp", "devtools endpoint ready: {ws_url}");
        let (ws, _resp) = tokio_tungstenite::connect_async(ws_url.as_str()).await?;
        let mut session = Self {
            child,
            ws,
            session_id: String::new(),
            next_id: 1,
            events: VecDeque::new(),
            profile_dir: profile_dir.to_path_buf(),
            closed: false,
        };

        let created = session
            .browser_command("Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrowserError::Protocol("Target.createTarget returned no targetId".into()))?
            .to_string();
        let attached = session
            .browser_command(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        session.session_id = attached
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrowserError::Protocol("Target.attachToTarget returned no sessionId".into()))?
            .to_string();
        session.command("Page.enable", json!({})).await?;
        Ok(session)
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn buffer_event(&mut self, event: Value) {
        if self.events.len() >= EVENT_BUFFER_CAP {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Send a command scoped to the attached page target and await its reply.
    async fn command(&mut self, method: &str, params: Value) -> Result<Value, BrowserError> {
        let sid = self.session_id.clone();
        self.raw_command(method, params, Some(sid)).await
    }

    /// Send a browser-level command (no page session attached).
    async fn browser_command(&mut self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.raw_command(method, params, None).await
    }

    async fn raw_command(
        &mut self,
        method: &str,
        params: Value,
        session: Option<String>,
    ) -> Result<Value, BrowserError> {
        let id = self.take_id();
        let mut frame = json!({"id": id, "method": method, "params": params});
        if let Some(sid) = session {
            frame["sessionId"] = Value::String(sid);
        }
        self.ws.send(Message::Text(frame.to_string())).await?;
        let deadline = Instant::now() + COMMAND_TIMEOUT;
        loop {
            let msg = self.next_frame(deadline).await?;
            if msg.get("id").and_then(|v| v.as_u64()) == Some(id) {
                if let Some(err) = msg.get("error") {
                    return Err(BrowserError::Protocol(format!("{method}: {err}")));
                }
                return Ok(msg.get("result").cloned().unwrap_or(Value::Null));
            }
            if msg.get("method").is_some() {
                self.buffer_event(msg);
            }
        }
    }

    /// Read one JSON frame off the websocket, failing at `deadline`.
    async fn next_frame(&mut self, deadline: Instant) -> Result<Value, BrowserError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::TimedOut);
            }
            let Ok(item) = tokio::time::timeout(remaining, self.ws.next()).await else {
                return Err(BrowserError::TimedOut);
            };
            let Some(msg) = item else {
                return Err(BrowserError::Protocol("devtools socket closed".into()));
            };
            match msg? {
                Message::Text(text) => {
                    if let Ok(v) = serde_json::from_str::<Value>(&text) {
                        return Ok(v);
                    }
                }
                Message::Close(_) => {
                    return Err(BrowserError::Protocol("devtools socket closed".into()))
                }
                _ => {}
            }
        }
    }

    /// Wait for an event by method name, draining buffered ones first.
    async fn wait_for_event(&mut self, method: &str, timeout: Duration) -> Result<Value, BrowserError> {
        if let Some(pos) = self
            .events
            .iter()
            .position(|e| e.get("method").and_then(|m| m.as_str()) == Some(method))
        {
            return Ok(self.events.remove(pos).expect("position within buffer"));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let msg = self.next_frame(deadline).await?;
            if msg.get("method").and_then(|m| m.as_str()) == Some(method) {
                return Ok(msg);
            }
            if msg.get("method").is_some() {
                self.buffer_event(msg);
            }
        }
    }

    fn drop_buffered_load_events(&mut self) {
        self.events
            .retain(|e| e.get("method").and_then(|m| m.as_str()) != Some("Page.loadEventFired"));
    }

    async fn evaluate(&mut self, expression: String) -> Result<Value, BrowserError> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({"expression": expression, "returnByValue": true}),
            )
            .await?;
        if let Some(ex) = result.get("exceptionDetails") {
            return Err(BrowserError::Protocol(format!("page script failed: {ex}")));
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!(target: "portalgate::cdp", "goto {url}");
        // Load events buffered before this navigation are stale by definition.
        self.drop_buffered_load_events();
        self.command("Page.navigate", json!({"url": url})).await?;
        self.wait_for_event("Page.loadEventFired", NAVIGATION_TIMEOUT).await?;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let probe = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             const cs = window.getComputedStyle(el); const r = el.getBoundingClientRect(); \
             return cs.display !== 'none' && cs.visibility !== 'hidden' && r.width > 0 && r.height > 0; }})()",
            sel = js_string(selector)
        );
        let deadline = Instant::now() + timeout;
        loop {
            if self.evaluate(probe.clone()).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::TimedOut);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.evaluate(format!("document.querySelector({}).focus()", js_string(selector)))
            .await?;
        self.command("Input.insertText", json!({"text": text})).await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.evaluate(format!("document.querySelector({}).click()", js_string(selector)))
            .await?;
        Ok(())
    }

    async fn wait_for_navigation(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        // The triggering click happened before this call, so the load event
        // may already sit in the buffer; wait_for_event drains it first.
        self.wait_for_event("Page.loadEventFired", timeout).await?;
        Ok(())
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, BrowserError> {
        let result = self.command("Network.getCookies", json!({})).await?;
        let mut out = Vec::new();
        if let Some(list) = result.get("cookies").and_then(|v| v.as_array()) {
            for c in list {
                let (Some(name), Some(value)) = (
                    c.get("name").and_then(|v| v.as_str()),
                    c.get("value").and_then(|v| v.as_str()),
                ) else {
                    continue;
                };
                out.push(Cookie { name: name.to_string(), value: value.to_string() });
            }
        }
        Ok(out)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .command("Page.captureScreenshot", json!({"format": "png"}))
            .await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrowserError::Protocol("Page.captureScreenshot returned no data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| BrowserError::Protocol(format!("screenshot payload: {e}")))
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        let v = self
            .evaluate("document.documentElement.outerHTML".to_string())
            .await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Ask nicely first, but never let a wedged browser stall teardown.
        let _ = tokio::time::timeout(
            Duration::from_secs(2),
            self.browser_command("Browser.close", json!({})),
        )
        .await;
        let _ = self.ws.close(None).await;
        if let Err(e) = self.child.kill().await {
            warn!(target: "portalgate::cdp", "browser process kill failed: {e}");
        }
        let _ = std::fs::remove_dir_all(&self.profile_dir);
        Ok(())
    }
}

/// Quote a string as a JS string literal (JSON string syntax is valid JS).
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

fn free_port() -> Result<u16, BrowserError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn scratch_profile_dir() -> PathBuf {
    let mut buf = [0u8; 8];
    let _ = getrandom::getrandom(&mut buf);
    let mut suffix = String::with_capacity(16);
    use std::fmt::Write as _;
    for b in &buf {
        let _ = write!(&mut suffix, "{:02x}", b);
    }
    std::env::temp_dir().join(format!("portalgate-profile-{suffix}"))
}

/// Poll the DevTools version endpoint until the freshly spawned browser is
/// ready to accept a websocket client.
async fn discover_ws_url(port: u16) -> Result<String, BrowserError> {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/json/version");
    let deadline = Instant::now() + LAUNCH_TIMEOUT;
    loop {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                let v: Value = resp
                    .json()
                    .await
                    .map_err(|e| BrowserError::Launch(format!("devtools version endpoint: {e}")))?;
                let Some(ws) = v.get("webSocketDebuggerUrl").and_then(|w| w.as_str()) else {
                    return Err(BrowserError::Launch(
                        "devtools endpoint returned no webSocketDebuggerUrl".into(),
                    ));
                };
                return Ok(ws.to_string());
            }
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Launch(format!(
                "devtools endpoint on port {port} never became ready"
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
