//! Session-scoped secret holder
//!
//! A [`Session`] holds the wallet signature for the lifetime of a sign-in and
//! memoizes the [`UserKey`] derived from it. Sign-out drops both. Every
//! sign-in or sign-out bumps an epoch; a [`SessionLease`] taken at the start of
//! an operation records the epoch, so a long-running upload or download can
//! notice that the session changed under it and stop with `MissingSecret`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use secrecy::SecretString;

use crate::error::CryptoError;
use crate::keys::{derive_user_key, UserKey};

/// Source of the wallet signature (wallet connection, env var, prompt...).
pub trait SignatureProvider {
    /// The signature, or `None` if the user has not signed.
    fn signature(&self) -> Option<SecretString>;
}

struct Active {
    signature: SecretString,
    user_key: Option<UserKey>,
}

/// Explicit session context passed into every envelope operation.
pub struct Session {
    state: RwLock<Option<Active>>,
    epoch: AtomicU64,
}

impl Session {
    /// A session with no signature; every operation fails with `MissingSecret`
    /// until [`Session::sign_in`] is called.
    pub fn signed_out() -> Self {
        Self {
            state: RwLock::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// A session holding `signature`.
    pub fn new(signature: SecretString) -> Self {
        let session = Self::signed_out();
        session.sign_in(signature);
        session
    }

    /// Ask a provider for the signature and open a session with it.
    pub fn from_provider(provider: &dyn SignatureProvider) -> Result<Self, CryptoError> {
        let signature = provider.signature().ok_or(CryptoError::MissingSecret)?;
        Ok(Self::new(signature))
    }

    /// Replace the held signature. Leases taken before this call become stale.
    pub fn sign_in(&self, signature: SecretString) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = Some(Active {
            signature,
            user_key: None,
        });
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the signature and any memoized key.
    pub fn sign_out(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The user key for the held signature, derived once and then memoized.
    pub fn user_key(&self) -> Result<UserKey, CryptoError> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            match state.as_ref() {
                None => return Err(CryptoError::MissingSecret),
                Some(Active {
                    user_key: Some(key), ..
                }) => return Ok(key.clone()),
                Some(_) => {}
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let active = state.as_mut().ok_or(CryptoError::MissingSecret)?;
        if let Some(key) = &active.user_key {
            return Ok(key.clone());
        }
        let key = derive_user_key(&active.signature)?;
        active.user_key = Some(key.clone());
        Ok(key)
    }

    /// Take a lease on the current sign-in for the duration of one operation.
    pub fn lease(&self) -> Result<SessionLease, CryptoError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let user_key = self.user_key()?;
        let lease = SessionLease { epoch, user_key };
        lease.ensure_valid(self)?;
        Ok(lease)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.is_active())
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish()
    }
}

/// A user key pinned to the sign-in that produced it.
#[derive(Debug, Clone)]
pub struct SessionLease {
    epoch: u64,
    user_key: UserKey,
}

impl SessionLease {
    pub fn user_key(&self) -> &UserKey {
        &self.user_key
    }

    /// Fail with `MissingSecret` if the session was signed out or re-signed
    /// since this lease was taken.
    pub fn ensure_valid(&self, session: &Session) -> Result<(), CryptoError> {
        if session.epoch.load(Ordering::SeqCst) != self.epoch || !session.is_active() {
            return Err(CryptoError::MissingSecret);
        }
        Ok(())
    }
}
