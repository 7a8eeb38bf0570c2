//! The session context ties the store, API client, event bus, and auth gate
//! together and owns the background tasks that keep the gate current.
//!
//! Views take a `SessionContext` (or a receiver from [`SessionContext::subscribe`])
//! instead of reaching for process-wide state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiResult};
use crate::auth::{AuthEvent, AuthGate, AuthSnapshot, CredentialWatcher, EventBus, SessionStore};
use crate::config::Config;

pub struct SessionContext {
    config: Config,
    store: SessionStore,
    bus: EventBus,
    api: ApiClient,
    gate: AuthGate,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionContext {
    /// Build a context using the credential store selected in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let store = SessionStore::from_config(&config)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: SessionStore) -> Result<Self> {
        let bus = EventBus::new();
        let api = ApiClient::new(&config, store.clone(), bus.clone())?;
        let gate = AuthGate::new(store.clone(), Arc::new(api.clone()));

        Ok(Self {
            config,
            store,
            bus,
            api,
            gate,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start listening for session events, run the startup check, and begin
    /// watching the store. Calling it again while running does nothing.
    pub fn init(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            debug!("Session context already running");
            return;
        }

        // Subscribe before the startup check so no event is missed.
        tasks.push(self.gate.run(self.bus.subscribe()));

        let gate = self.gate.clone();
        tasks.push(tokio::spawn(async move {
            gate.check().await;
        }));

        let interval = Duration::from_millis(self.config.watch_interval_ms);
        tasks.push(CredentialWatcher::new(self.store.clone(), self.bus.clone(), interval).spawn());

        info!(base_url = %self.api.base_url(), "Session context started");
    }

    /// Stop every background task. Checks still in flight are ignored when
    /// they finish. Safe to call more than once.
    pub fn dispose(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        self.gate.retire();
        info!("Session context stopped");
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.gate.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.gate.subscribe()
    }

    /// Wait for the first check to settle.
    pub async fn wait_until_resolved(&self) -> AuthSnapshot {
        let mut rx = self.subscribe();
        let resolved = rx.wait_for(|snapshot| !snapshot.loading).await.map(|s| *s);
        resolved.unwrap_or_else(|_| self.snapshot())
    }

    /// Report a completed login that stored its own credential.
    pub fn notify_auth_success(&self) {
        self.bus.publish(AuthEvent::AuthSucceeded);
    }

    /// Report that the stored credential may have changed.
    pub fn notify_credential_changed(&self) {
        self.bus.publish(AuthEvent::CredentialChanged);
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<()> {
        self.api.login(username, password).await
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear_credential()?;
        info!("Logged out");
        self.bus.publish(AuthEvent::CredentialChanged);
        Ok(())
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
