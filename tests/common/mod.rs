//! Scripted browser fakes shared by the integration suites.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use portalgate::portal::browser::{BrowserError, BrowserLauncher, BrowserSession, Cookie};

/// What a scripted run was observed doing.
#[derive(Default)]
pub struct Observations {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub typed: Mutex<Vec<(String, String)>>,
    pub visited: Mutex<Vec<String>>,
}

/// A launcher whose sessions follow a fixed script of the portal flow:
/// selectors in `visible_selectors` appear immediately, everything else
/// times out; navigation completes or stalls; the cookie jar is canned.
#[derive(Clone)]
pub struct ScriptedPortal {
    pub visible_selectors: HashSet<String>,
    pub navigation_completes: bool,
    pub cookies: Vec<Cookie>,
    pub obs: Arc<Observations>,
}

impl ScriptedPortal {
    /// A portal where the default flow succeeds and the session cookie
    /// `cookie_name` carries `value`.
    pub fn happy(cookie_name: &str, value: &str) -> Self {
        let visible_selectors = ["#email", "#signinPassword"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            visible_selectors,
            navigation_completes: true,
            cookies: vec![Cookie { name: cookie_name.to_string(), value: value.to_string() }],
            obs: Arc::new(Observations::default()),
        }
    }

    pub fn launches(&self) -> usize {
        self.obs.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.obs.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedPortal {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.obs.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession { script: self.clone() }))
    }
}

/// A launcher with no browser behind it at all.
pub struct FailingLauncher {
    pub obs: Arc<Observations>,
}

impl FailingLauncher {
    pub fn new() -> Self {
        Self { obs: Arc::new(Observations::default()) }
    }
}

#[async_trait]
impl BrowserLauncher for FailingLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.obs.launches.fetch_add(1, Ordering::SeqCst);
        Err(BrowserError::Launch("no browser installed".into()))
    }
}

pub struct ScriptedSession {
    script: ScriptedPortal,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.script.obs.visited.lock().push(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        if self.script.visible_selectors.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::TimedOut)
        }
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.script.obs.typed.lock().push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_navigation(&mut self, _timeout: Duration) -> Result<(), BrowserError> {
        if self.script.navigation_completes {
            Ok(())
        } else {
            Err(BrowserError::TimedOut)
        }
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, BrowserError> {
        Ok(self.script.cookies.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        Ok("<html><body>scripted portal</body></html>".to_string())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.script.obs.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
