//! Remote-portal login: the browser capability surface, its DevTools-backed
//! implementation, the staged login flow, and the diagnostic page capture.
//! Keep the public surface thin and split implementation across sub-modules.

pub mod browser;
pub mod capture;
pub mod cdp;
pub mod login;

pub use browser::{BrowserError, BrowserLauncher, BrowserSession, Cookie};
pub use cdp::ChromiumLauncher;
pub use login::{DriverError, LoginDriver, Stage};
