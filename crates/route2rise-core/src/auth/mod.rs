//! Authentication module: where the credential lives and whether the
//! current user counts as signed in.
//!
//! This module provides:
//! - `SessionStore`: the persisted bearer credential (file, keychain, or memory)
//! - `AuthGate`: the authenticated/unauthenticated state machine
//! - `EventBus`: session notifications (login, 401, credential changes)
//! - `CredentialWatcher`: notices credential changes made by other processes

pub mod events;
pub mod gate;
pub mod store;
pub mod watcher;

pub use events::{AuthEvent, EventBus};
pub use gate::{AuthGate, AuthSnapshot, AuthState, Verifier};
pub use store::{
    Credential, CredentialBackend, FileBackend, KeyringBackend, MemoryBackend, SessionStore,
};
pub use watcher::CredentialWatcher;
