//! Credential and ceremony-state store traits
//!
//! The verification core never owns persistence. It reaches credentials and
//! in-flight ceremony state only through these traits, which the embedding
//! application implements over its own storage. [`MemoryStore`] implements
//! both for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::errors::{Result, WebAuthnError};
use super::types::{CeremonyState, Credential};

/// Persistent credential storage
pub trait CredentialStore: Send + Sync {
    /// Persist a newly registered credential
    ///
    /// # Errors
    /// Returns `Store` if the credential cannot be written.
    fn set_credential(&self, credential: Credential) -> Result<()>;

    /// Look up credentials by id
    ///
    /// # Arguments
    /// * `credential_id` - Raw credential id from the authenticator
    /// * `user_handle` - When present, only credentials owned by this user match
    ///
    /// # Errors
    /// Returns `Store` if the lookup fails.
    fn get_credentials(
        &self,
        credential_id: &[u8],
        user_handle: Option<&[u8]>,
    ) -> Result<Vec<Credential>>;

    /// Apply the signature counter reported by a verified assertion
    ///
    /// Implementations apply the update atomically with respect to other
    /// writers of the same credential.
    ///
    /// # Errors
    /// Returns `Store` if the credential is unknown or the write fails.
    fn update_sign_count(&self, credential_id: &[u8], sign_count: u32) -> Result<()>;
}

/// Ceremony state keyed by an opaque token
pub trait CeremonyStateStore: Send + Sync {
    /// # Errors
    /// Returns `Store` if the state cannot be written.
    fn set_state(&self, token: &str, state: CeremonyState) -> Result<()>;

    /// # Errors
    /// Returns `Store` if the lookup fails.
    fn get_state(&self, token: &str) -> Result<Option<CeremonyState>>;

    /// # Errors
    /// Returns `Store` if the delete fails.
    fn delete_state(&self, token: &str) -> Result<()>;

    /// Remove and return the state in one step, so a challenge is used at most once
    ///
    /// # Errors
    /// Returns `Store` if the lookup or delete fails.
    fn take_state(&self, token: &str) -> Result<Option<CeremonyState>>;
}

/// In-memory implementation of both store traits
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: Mutex<HashMap<Vec<u8>, Credential>>,
    states: Mutex<HashMap<String, CeremonyState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| WebAuthnError::Store("store lock poisoned".to_string()))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials
    ///
    /// # Errors
    /// Returns `Store` if the lock is poisoned.
    pub fn credential_count(&self) -> Result<usize> {
        Ok(lock(&self.credentials)?.len())
    }

    /// Number of in-flight ceremonies
    ///
    /// # Errors
    /// Returns `Store` if the lock is poisoned.
    pub fn state_count(&self) -> Result<usize> {
        Ok(lock(&self.states)?.len())
    }

    /// Drop ceremony state whose expiry has passed
    ///
    /// # Returns
    /// The number of removed entries
    ///
    /// # Errors
    /// Returns `Store` if the lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut states = lock(&self.states)?;
        let before = states.len();
        states.retain(|_, state| !state.is_expired(now));
        Ok(before - states.len())
    }
}

impl CredentialStore for MemoryStore {
    fn set_credential(&self, credential: Credential) -> Result<()> {
        lock(&self.credentials)?.insert(credential.credential_id.clone(), credential);
        Ok(())
    }

    fn get_credentials(
        &self,
        credential_id: &[u8],
        user_handle: Option<&[u8]>,
    ) -> Result<Vec<Credential>> {
        Ok(lock(&self.credentials)?
            .get(credential_id)
            .filter(|credential| user_handle.is_none_or(|user| credential.user_id == user))
            .cloned()
            .into_iter()
            .collect())
    }

    fn update_sign_count(&self, credential_id: &[u8], sign_count: u32) -> Result<()> {
        let mut credentials = lock(&self.credentials)?;
        let credential = credentials
            .get_mut(credential_id)
            .ok_or_else(|| WebAuthnError::Store("unknown credential".to_string()))?;
        credential.sign_count = sign_count;
        credential.last_used = Some(Utc::now());
        Ok(())
    }
}

impl CeremonyStateStore for MemoryStore {
    fn set_state(&self, token: &str, state: CeremonyState) -> Result<()> {
        lock(&self.states)?.insert(token.to_string(), state);
        Ok(())
    }

    fn get_state(&self, token: &str) -> Result<Option<CeremonyState>> {
        Ok(lock(&self.states)?.get(token).cloned())
    }

    fn delete_state(&self, token: &str) -> Result<()> {
        lock(&self.states)?.remove(token);
        Ok(())
    }

    fn take_state(&self, token: &str) -> Result<Option<CeremonyState>> {
        Ok(lock(&self.states)?.remove(token))
    }
}
