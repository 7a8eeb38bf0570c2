//! Detects credential changes made outside this process (another client
//! logging out, a token written by a login elsewhere) and reports them as
//! [`AuthEvent::CredentialChanged`].

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{AuthEvent, EventBus, SessionStore};

pub struct CredentialWatcher {
    store: SessionStore,
    bus: EventBus,
    interval: Duration,
}

impl CredentialWatcher {
    pub fn new(store: SessionStore, bus: EventBus, interval: Duration) -> Self {
        Self {
            store,
            bus,
            interval,
        }
    }

    /// Poll the store until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            debug!(interval_ms = self.interval.as_millis() as u64, "Credential watcher started");

            loop {
                ticker.tick().await;
                if self.store.poll_external_change() {
                    info!(present = self.store.has_credential(), "Stored credential changed elsewhere");
                    self.bus.publish(AuthEvent::CredentialChanged);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryBackend};

    #[tokio::test]
    async fn test_external_clear_is_reported() {
        let backend = MemoryBackend::new();
        let ours = SessionStore::new(backend.clone());
        let other_tab = SessionStore::new(backend);
        ours.set_credential(Credential::new("abc").unwrap()).unwrap();

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let handle = CredentialWatcher::new(ours, bus, Duration::from_millis(10)).spawn();

        other_tab.clear_credential().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("watcher should report the change")
            .unwrap();
        assert_eq!(event, AuthEvent::CredentialChanged);
        handle.abort();
    }

    #[tokio::test]
    async fn test_own_writes_are_not_reported() {
        let store = SessionStore::new(MemoryBackend::new());
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let handle = CredentialWatcher::new(store.clone(), bus, Duration::from_millis(10)).spawn();

        store.set_credential(Credential::new("abc").unwrap()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.clear_credential().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(events.try_recv().is_err());
        handle.abort();
    }
}
