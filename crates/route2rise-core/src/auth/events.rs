use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the session event channel. Events are tiny and consumed
/// promptly; a subscriber that falls behind re-evaluates from scratch.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notification about the session, delivered once to every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The stored credential appeared, disappeared, or was replaced.
    CredentialChanged,
    /// A login flow just stored a fresh credential.
    AuthSucceeded,
    /// The backend rejected the credential with 401; it has been cleared.
    SessionInvalidated,
}

/// Fan-out channel for [`AuthEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: AuthEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(?event, receivers, "Auth event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        EventBus::new().publish(AuthEvent::AuthSucceeded);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_event_once() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(AuthEvent::CredentialChanged);

        assert_eq!(a.recv().await.unwrap(), AuthEvent::CredentialChanged);
        assert_eq!(b.recv().await.unwrap(), AuthEvent::CredentialChanged);
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }
}
