//! Account storage behind the account API endpoints.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::message::status;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("account '{0}' already exists")]
    UserExists(String),
    /// Unknown user or wrong password; the two are not distinguished.
    #[error("invalid username or password")]
    BadCredentials,
    #[error("account store unavailable: {0}")]
    Backend(String),
}

impl StoreError {
    /// Status code the endpoints answer with for this error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::UserExists(_) => status::CONFLICT,
            Self::BadCredentials => status::UNAUTHORIZED,
            Self::Backend(_) => status::INTERNAL_ERROR,
        }
    }
}

/// Credential storage used by the account endpoints.
///
/// Shared across handler threads, so implementations synchronize internally.
pub trait AccountStore: Send + Sync {
    fn create(&self, username: &str, password: &str) -> Result<(), StoreError>;

    fn verify(&self, username: &str, password: &str) -> Result<(), StoreError>;

    /// Remove an account after checking its password.
    fn remove(&self, username: &str, password: &str) -> Result<(), StoreError>;

    fn change_password(
        &self,
        username: &str,
        password: &str,
        new_password: &str,
    ) -> Result<(), StoreError>;

    fn contains(&self, username: &str) -> bool;
}

#[derive(Clone)]
struct Credential {
    salt: [u8; 16],
    digest: [u8; 32],
}

impl Credential {
    fn derive(password: &str) -> Self {
        let salt: [u8; 16] = rand::random();
        Self {
            salt,
            digest: salted_digest(&salt, password),
        }
    }

    fn matches(&self, password: &str) -> bool {
        let candidate = salted_digest(&self.salt, password);
        // Compare every byte so timing does not depend on the mismatch offset.
        candidate
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Usernames are case-insensitive.
fn account_key(username: &str) -> String {
    username.trim().to_ascii_lowercase()
}

/// In-process account store with salted SHA-256 password digests.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Credential>>,
}

impl fmt::Debug for MemoryAccountStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAccountStore")
            .field("accounts", &self.len())
            .finish()
    }
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A handler that panicked mid-update cannot leave a credential half
    // written, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Credential>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AccountStore for MemoryAccountStore {
    fn create(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let key = account_key(username);
        let mut accounts = self.lock();
        if accounts.contains_key(&key) {
            return Err(StoreError::UserExists(key));
        }
        accounts.insert(key, Credential::derive(password));
        Ok(())
    }

    fn verify(&self, username: &str, password: &str) -> Result<(), StoreError> {
        match self.lock().get(&account_key(username)) {
            Some(credential) if credential.matches(password) => Ok(()),
            _ => Err(StoreError::BadCredentials),
        }
    }

    fn remove(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let key = account_key(username);
        let mut accounts = self.lock();
        match accounts.get(&key) {
            Some(credential) if credential.matches(password) => {
                accounts.remove(&key);
                Ok(())
            }
            _ => Err(StoreError::BadCredentials),
        }
    }

    fn change_password(
        &self,
        username: &str,
        password: &str,
        new_password: &str,
    ) -> Result<(), StoreError> {
        let key = account_key(username);
        let mut accounts = self.lock();
        match accounts.get_mut(&key) {
            Some(credential) if credential.matches(password) => {
                *credential = Credential::derive(new_password);
                Ok(())
            }
            _ => Err(StoreError::BadCredentials),
        }
    }

    fn contains(&self, username: &str) -> bool {
        self.lock().contains_key(&account_key(username))
    }
}
