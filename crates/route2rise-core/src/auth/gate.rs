//! The auth gate decides, and keeps deciding, whether the current user is
//! authenticated.
//!
//! State lives in a `watch` channel so any number of views can follow it.
//! Every transition takes a generation number; a verification that
//! finishes after a newer transition started is dropped, so overlapping
//! checks can never leave a stale answer behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AuthEvent, SessionStore};

/// Asks the backend whether the stored credential is still good.
pub trait Verifier: Send + Sync {
    /// Resolves to `false` on any failure, including transport errors.
    fn verify(&self) -> BoxFuture<'_, bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AuthState {
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthSnapshot {
    pub state: AuthState,
    /// True until the first check settles.
    pub loading: bool,
}

impl AuthSnapshot {
    pub const INITIAL: Self = Self {
        state: AuthState::Unknown,
        loading: true,
    };

    pub fn authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self::INITIAL
    }
}

struct GateInner {
    store: SessionStore,
    verifier: Arc<dyn Verifier>,
    state: watch::Sender<AuthSnapshot>,
    generation: AtomicU64,
}

/// Clone is cheap; clones drive the same state.
#[derive(Clone)]
pub struct AuthGate {
    inner: Arc<GateInner>,
}

impl AuthGate {
    pub fn new(store: SessionStore, verifier: Arc<dyn Verifier>) -> Self {
        let (state, _) = watch::channel(AuthSnapshot::INITIAL);
        Self {
            inner: Arc::new(GateInner {
                store,
                verifier,
                state,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.state.subscribe()
    }

    /// Re-evaluate from the store: no credential settles immediately,
    /// otherwise the verifier is consulted once.
    pub async fn check(&self) -> AuthSnapshot {
        let generation = self.begin();

        if !self.inner.store.has_credential() {
            debug!(generation, "No credential stored");
            self.apply(generation, AuthState::Unauthenticated);
            return self.snapshot();
        }

        debug!(generation, "Verifying stored credential");
        let verified = self.inner.verifier.verify().await;
        info!(generation, verified, "Credential verification finished");

        let state = if verified {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        self.apply(generation, state);
        self.snapshot()
    }

    /// React to a single session event.
    pub async fn handle(&self, event: AuthEvent) {
        match event {
            AuthEvent::AuthSucceeded => {
                if self.inner.store.has_credential() {
                    let generation = self.begin();
                    self.apply(generation, AuthState::Authenticated);
                } else {
                    warn!("Auth success reported without a stored credential, re-checking");
                    self.check().await;
                }
            }
            AuthEvent::CredentialChanged => {
                self.check().await;
            }
            AuthEvent::SessionInvalidated => {
                let generation = self.begin();
                self.apply(generation, AuthState::Unauthenticated);
            }
        }
    }

    /// Follow the event bus until it closes. Credential changes are checked
    /// on their own tasks so a slow verification never holds up the loop.
    pub fn run(&self, mut events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::CredentialChanged) => {
                        let gate = gate.clone();
                        tokio::spawn(async move {
                            gate.check().await;
                        });
                    }
                    Ok(event) => gate.handle(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Auth events dropped, re-checking");
                        let gate = gate.clone();
                        tokio::spawn(async move {
                            gate.check().await;
                        });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Auth event loop stopped");
        })
    }

    /// Drop the results of every check still in flight.
    pub fn retire(&self) {
        self.begin();
    }

    fn begin(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish `state` unless a newer transition has started. Returns
    /// whether it was applied.
    fn apply(&self, generation: u64, state: AuthState) -> bool {
        let current = &self.inner.generation;
        let mut stale = false;
        self.inner.state.send_if_modified(|snapshot| {
            if current.load(Ordering::SeqCst) != generation {
                stale = true;
                return false;
            }
            let next = AuthSnapshot {
                state,
                loading: false,
            };
            if *snapshot == next {
                return false;
            }
            *snapshot = next;
            true
        });

        if stale {
            debug!(generation, ?state, "Discarding result of superseded check");
        } else {
            debug!(generation, ?state, "Auth state settled");
        }
        !stale
    }
}
