//! Session validation over the token store, plus the cookie helpers the
//! HTTP layer uses to carry the session token.

use axum::http::{HeaderMap, HeaderValue};

use crate::error::AuthError;
use crate::store::{find_by_token, SharedTokenStore};

/// Cookie carrying the local session token.
pub const SESSION_COOKIE: &str = "portalgate_token";
/// The cookie (and with it the local session) lives one day.
pub const SESSION_COOKIE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Identity resolved from a presented session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedIdentity {
    pub email: String,
    pub device_linked: bool,
}

/// Map a presented token back to an identity. The store is consulted fresh
/// on every call; a token the store no longer carries (fabricated, or
/// replaced by a later login) is an invalid session and the caller should
/// clear it. Store corruption propagates as its own failure rather than
/// masquerading as a missing session.
pub fn authorize(store: &SharedTokenStore, token: Option<&str>) -> Result<AuthorizedIdentity, AuthError> {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return Err(AuthError::NotAuthenticated),
    };
    let guard = store.0.lock();
    let map = guard.read()?;
    match find_by_token(&map, token) {
        Some((email, rec)) => Ok(AuthorizedIdentity {
            email: email.to_string(),
            device_linked: rec.device_linked,
        }),
        None => Err(AuthError::InvalidSession),
    }
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

/// HttpOnly cookie scoped to path / with the 24h lifetime.
pub fn set_session_cookie(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, SESSION_COOKIE_MAX_AGE_SECS
    ))
    .unwrap()
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}
