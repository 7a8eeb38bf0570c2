//! Persistent holder of the bearer credential.
//!
//! The store is the only owner of the token. Everything else reads it
//! through [`SessionStore`] for the lifetime of a single request or check.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, StoreKind};

/// Keychain service name
const SERVICE_NAME: &str = "route2rise";

/// Keychain account the token is stored under
const KEYRING_ACCOUNT: &str = "access_token";

/// Opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token. An empty string is not a credential; anything else,
    /// whitespace included, is passed through untouched.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Raw token, for building the Authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} bytes>)", self.0.len())
    }
}

/// Durable key-value slot holding at most one credential.
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    /// Removing an absent credential succeeds.
    fn remove(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    stored_at: DateTime<Utc>,
}

/// Credential persisted as JSON on disk. Every process pointed at the same
/// path shares the credential.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read credential file")?;
        let stored: StoredCredential = serde_json::from_str(&contents)
            .context("Failed to parse credential file")?;
        Ok(Credential::new(stored.access_token))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredCredential {
            access_token: credential.expose().to_string(),
            stored_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;

        // Readers poll this file, so never let them see a half-written one.
        // Each writer gets its own temp file next to the target.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => std::path::Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary credential file")?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write credential file")?;
        tmp.persist(&self.path)
            .context("Failed to replace credential file")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential file"),
        }
    }
}

/// Credential kept in the OS keychain.
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry() -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, KEYRING_ACCOUNT)
            .context("Failed to create keyring entry")
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<Option<Credential>> {
        match Self::entry()?.get_password() {
            Ok(token) => Ok(Credential::new(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        Self::entry()?
            .set_password(credential.expose())
            .context("Failed to store token in keychain")
    }

    fn remove(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

/// In-process credential slot. Clones share the slot, so two stores built
/// from clones of one backend behave like two tabs on the same origin.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<Credential>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(credential.clone());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Handle to the persisted credential. Clone is cheap and every clone sees
/// the same backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn CredentialBackend>,
    /// Last value this handle wrote or polled; anything else in the backend
    /// was put there by someone else. Held across every write and poll so
    /// the two never interleave.
    observed: Arc<Mutex<Option<Credential>>>,
}

impl SessionStore {
    pub fn new(backend: impl CredentialBackend + 'static) -> Self {
        let observed = backend.load().ok().flatten();
        Self {
            backend: Arc::new(backend),
            observed: Arc::new(Mutex::new(observed)),
        }
    }

    /// Build the store selected in the config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = match config.store {
            StoreKind::File => Self::new(FileBackend::new(config.credential_path()?)),
            StoreKind::Keyring => Self::new(KeyringBackend),
            StoreKind::Memory => Self::new(MemoryBackend::new()),
        };
        debug!(kind = ?config.store, "Credential store ready");
        Ok(store)
    }

    /// True iff a credential is currently persisted. Read failures count as
    /// absent.
    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }

    pub fn credential(&self) -> Option<Credential> {
        match self.backend.load() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Failed to read credential, treating as absent");
                None
            }
        }
    }

    pub fn set_credential(&self, credential: Credential) -> Result<()> {
        let mut observed = self.lock_observed();
        self.backend.save(&credential)?;
        *observed = Some(credential);
        debug!("Credential stored");
        Ok(())
    }

    /// Delete the persisted credential. Safe to call when none exists.
    pub fn clear_credential(&self) -> Result<()> {
        let mut observed = self.lock_observed();
        self.backend.remove()?;
        *observed = None;
        debug!("Credential cleared");
        Ok(())
    }

    /// Reload the credential and report whether someone else changed it
    /// since this handle last wrote or polled it. Read failures are not a
    /// change.
    pub fn poll_external_change(&self) -> bool {
        let mut observed = self.lock_observed();
        let current = match self.backend.load() {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to poll credential");
                return false;
            }
        };
        if *observed == current {
            false
        } else {
            *observed = current;
            true
        }
    }

    fn lock_observed(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.observed.lock().unwrap_or_else(|e| e.into_inner())
    }
}
