//! The credential exchange engine: turns an (email, credential) pair into a
//! local session token, or a typed refusal. Verification is a strategy seam
//! because two trust models exist: letting the remote portal decide (and
//! harvesting its cookie), or checking against the locally stored hash.

use std::sync::Arc;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use base64::Engine as _;
use password_hash::{PasswordHash, SaltString};

use crate::error::LoginError;
use crate::portal::browser::BrowserLauncher;
use crate::portal::login::LoginDriver;
use crate::store::{find_by_email, SharedTokenStore};
use crate::tprintln;

/// Produces a session token for a credential pair, or a typed refusal.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, email: &str, credential: &str) -> Result<String, LoginError>;
}

/// Remote trust model: the portal itself decides; we harvest its cookie and
/// use it verbatim as the local session token.
pub struct PortalVerifier {
    driver: LoginDriver,
    launcher: Arc<dyn BrowserLauncher>,
}

impl PortalVerifier {
    pub fn new(driver: LoginDriver, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { driver, launcher }
    }
}

#[async_trait]
impl CredentialVerifier for PortalVerifier {
    async fn verify(&self, email: &str, credential: &str) -> Result<String, LoginError> {
        self.driver
            .run(self.launcher.as_ref(), email, credential)
            .await
            .map_err(LoginError::from_driver)
    }
}

/// Local trust model: compare against the stored argon2 hash and mint a
/// fresh token. Requires a prior exchange that remembered the credential;
/// an unknown email or missing hash is an ordinary rejection.
pub struct LocalVerifier {
    store: SharedTokenStore,
}

impl LocalVerifier {
    pub fn new(store: SharedTokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialVerifier for LocalVerifier {
    async fn verify(&self, email: &str, credential: &str) -> Result<String, LoginError> {
        let known = {
            let guard = self.store.0.lock();
            let map = guard.read()?;
            find_by_email(&map, email).and_then(|rec| rec.credential_hash.clone())
        };
        match known {
            Some(phc) if verify_credential(&phc, credential) => Ok(generate_token()),
            _ => Err(LoginError::CredentialsRejected { stage: None }),
        }
    }
}

pub struct ExchangeEngine {
    store: SharedTokenStore,
    verifier: Arc<dyn CredentialVerifier>,
    remember_credentials: bool,
}

impl ExchangeEngine {
    pub fn new(
        store: SharedTokenStore,
        verifier: Arc<dyn CredentialVerifier>,
        remember_credentials: bool,
    ) -> Self {
        Self { store, verifier, remember_credentials }
    }

    /// One full exchange: cheap input rejection, verifier run, then the
    /// identity upsert under the store lock. Any failure leaves the store
    /// untouched.
    pub async fn attempt_login(&self, email: &str, credential: &str) -> Result<String, LoginError> {
        if email.is_empty() || credential.is_empty() {
            return Err(LoginError::MissingCredentials);
        }
        let token = self.verifier.verify(email, credential).await?;
        {
            let guard = self.store.0.lock();
            let mut map = guard.read()?;
            // device_linked defaults false on first write and an existing
            // true is left alone; the token is replaced wholesale.
            let rec = map.entry(email.to_string()).or_default();
            rec.session_token = Some(token.clone());
            if self.remember_credentials {
                rec.credential_hash = Some(hash_credential(credential)?);
            }
            guard.write(&map)?;
        }
        tprintln!("exchange.login email={}", email);
        Ok(token)
    }
}

/// 32 random bytes, base64url without padding.
pub fn generate_token() -> String {
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

pub fn hash_credential(credential: &str) -> Result<String, LoginError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| LoginError::Internal(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| LoginError::Internal(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(credential.as_bytes(), &salt)
        .map_err(|e| LoginError::Internal(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// The comparison inside the argon2 verifier is constant-time; the raw
/// secret is never compared directly.
pub fn verify_credential(phc: &str, credential: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(phc) {
        let argon2 = Argon2::default();
        argon2.verify_password(credential.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}
