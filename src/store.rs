//!
//! portalgate token store
//! ----------------------
//! Persists the mapping from email to identity record as one JSON document.
//! The document is the whole store: every mutation rewrites it in full via a
//! temp-file-then-rename sequence, so a concurrent reader only ever observes
//! a complete old or complete new document.
//!
//! Key responsibilities:
//! - First-use bootstrap: a missing file reads as an empty map and is never
//!   created by the read path itself.
//! - Corruption is a distinct failure: malformed content is reported as
//!   `StoreError::Corrupt`, never silently replaced with an empty store.
//! - Forward lookup by email for the exchange engine, reverse lookup by
//!   session token for validation (linear scan; the store is small and
//!   single-tenant).
//!
//! The store is usually wrapped in a `SharedTokenStore` (`Arc<Mutex<_>>`) so
//! that concurrent read-modify-write cycles serialize instead of silently
//! dropping each other's result.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-email state surviving across login exchanges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Argon2 PHC string of the last remembered credential, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hash: Option<String>,
    /// Current session token; replaced wholesale on every successful
    /// exchange. Overwrite is revocation: there is no revocation list.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Defaults false on first write; a later exchange never clears it.
    #[serde(default)]
    pub device_linked: bool,
}

pub type IdentityMap = HashMap<String, IdentityRecord>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store at {path} is not a valid identity document: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("token store i/o: {0}")]
    Io(#[from] io::Error),
}

/// On-disk handle for the identity document.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Load the full mapping. A missing file is first-use bootstrap and
    /// yields an empty map without touching the filesystem.
    pub fn read(&self) -> Result<IdentityMap, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(IdentityMap::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_str(&raw)
            .map_err(|source| StoreError::Corrupt { path: self.path.clone(), source })
    }

    /// Atomically replace the persisted mapping with `map`.
    ///
    /// The document is serialized to a temp file in the same directory and
    /// renamed over the target, which is what makes interrupted writes
    /// invisible to readers.
    pub fn write(&self, map: &IdentityMap) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let body = serde_json::to_string_pretty(map).map_err(io::Error::from)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut buf = [0u8; 8];
        let _ = getrandom::getrandom(&mut buf);
        let mut suffix = String::with_capacity(16);
        use std::fmt::Write as _;
        for b in &buf {
            let _ = write!(&mut suffix, "{:02x}", b);
        }
        let name = match self.path.file_name().and_then(|n| n.to_str()) {
            Some(n) => format!("{n}.{suffix}.tmp"),
            None => format!("tokens.{suffix}.tmp"),
        };
        self.path.with_file_name(name)
    }
}

/// Reverse lookup used by session validation.
pub fn find_by_token<'a>(map: &'a IdentityMap, token: &str) -> Option<(&'a str, &'a IdentityRecord)> {
    map.iter()
        .find(|(_, rec)| rec.session_token.as_deref() == Some(token))
        .map(|(email, rec)| (email.as_str(), rec))
}

pub fn find_by_email<'a>(map: &'a IdentityMap, email: &str) -> Option<&'a IdentityRecord> {
    map.get(email)
}

/// Thread-safe shared handle over the store. All read-modify-write cycles
/// must run under this lock so concurrent logins serialize.
#[derive(Clone)]
pub struct SharedTokenStore(pub Arc<Mutex<TokenStore>>);

impl SharedTokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self(Arc::new(Mutex::new(TokenStore::new(path))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: Option<&str>) -> IdentityRecord {
        IdentityRecord { credential_hash: None, session_token: token.map(|t| t.to_string()), device_linked: false }
    }

    #[test]
    fn reverse_lookup_matches_exact_token_only() {
        let mut map = IdentityMap::new();
        map.insert("a@x.com".into(), record(Some("T")));
        map.insert("b@x.com".into(), record(None));

        let (email, _) = find_by_token(&map, "T").expect("token T should resolve");
        assert_eq!(email, "a@x.com");
        assert!(find_by_token(&map, "t").is_none(), "tokens are case-sensitive opaque strings");
        assert!(find_by_token(&map, "").is_none());
    }

    #[test]
    fn email_lookup_is_case_sensitive_as_supplied() {
        let mut map = IdentityMap::new();
        map.insert("A@x.com".into(), record(None));
        assert!(find_by_email(&map, "A@x.com").is_some());
        assert!(find_by_email(&map, "a@x.com").is_none());
    }
}
