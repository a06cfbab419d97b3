//! Connection registry and WebSocket plumbing.

pub mod actor;
pub mod events;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ws::events::ServerEvent;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: tracks all active WebSocket connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs).
///
/// Purely in-memory; state is lost on restart by design — reconnecting
/// clients re-register. DashMap serializes mutation per shard, so concurrent
/// register/unregister from different connection lifecycles cannot lose
/// updates.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, Vec<ConnectionSender>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the user's set, creating the set if absent.
    /// Idempotent per handle.
    pub fn register(&self, user_id: &str, tx: ConnectionSender) {
        let mut entry = self.inner.entry(user_id.to_string()).or_default();
        if !entry.iter().any(|s| s.same_channel(&tx)) {
            entry.push(tx);
        }

        tracing::debug!(
            user_id = %user_id,
            connections = entry.len(),
            "connection registered"
        );
    }

    /// Remove a handle from the user's set (along with any handles whose
    /// receiver has been dropped); delete the user's entry when it empties.
    pub fn unregister(&self, user_id: &str, tx: &ConnectionSender) {
        if let Some(mut connections) = self.inner.get_mut(user_id) {
            connections.retain(|sender| !sender.same_channel(tx) && !sender.is_closed());
        }

        // Conditional removal must be atomic: a handle registered between the
        // retain above and this cleanup keeps the entry alive.
        self.inner.remove_if(user_id, |_, senders| senders.is_empty());

        tracing::debug!(user_id = %user_id, "connection unregistered");
    }

    /// All live handles for a user (possibly empty).
    pub fn handles_for(&self, user_id: &str) -> Vec<ConnectionSender> {
        self.inner
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner
            .get(user_id)
            .map(|entry| !entry.value().is_empty())
            .unwrap_or(false)
    }

    /// Push an event to every live handle of one user. Best-effort: send
    /// failures are dropped — persistence, not push, is the durability
    /// contract.
    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        let Some(msg) = encode(event) else { return };

        if let Some(connections) = self.inner.get(user_id) {
            for sender in connections.value().iter() {
                if sender.send(msg.clone()).is_err() {
                    tracing::debug!(user_id = %user_id, "push to closed connection dropped");
                }
            }
        }
    }

    /// Push an event to every registered handle across all users.
    /// Fire-and-forget; used for platform-wide announcements.
    pub fn broadcast_to_all(&self, event: &ServerEvent) {
        let Some(msg) = encode(event) else { return };

        for entry in self.inner.iter() {
            for sender in entry.value().iter() {
                if sender.send(msg.clone()).is_err() {
                    tracing::debug!(user_id = %entry.key(), "broadcast to closed connection dropped");
                }
            }
        }
    }
}

/// Serialize a server event once for fan-out.
fn encode(event: &ServerEvent) -> Option<axum::extract::ws::Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(axum::extract::ws::Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize server event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (
        ConnectionSender,
        mpsc::UnboundedReceiver<axum::extract::ws::Message>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn register_is_idempotent_per_handle() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = handle();

        registry.register("u1", tx.clone());
        registry.register("u1", tx.clone());

        assert_eq!(registry.handles_for("u1").len(), 1);
    }

    #[test]
    fn multiple_connections_per_user() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = handle();
        let (tx2, _rx2) = handle();

        registry.register("u1", tx1);
        registry.register("u1", tx2);

        assert_eq!(registry.handles_for("u1").len(), 2);
        assert!(registry.is_online("u1"));
    }

    #[test]
    fn unregister_removes_handle_and_empty_entry() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = handle();

        registry.register("u1", tx.clone());
        registry.unregister("u1", &tx);

        assert!(registry.handles_for("u1").is_empty());
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn unregister_keeps_other_handles() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = handle();
        let (tx2, _rx2) = handle();

        registry.register("u1", tx1.clone());
        registry.register("u1", tx2);
        registry.unregister("u1", &tx1);

        assert_eq!(registry.handles_for("u1").len(), 1);
        assert!(registry.is_online("u1"));
    }

    #[test]
    fn offline_user_has_no_handles() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.is_online("nobody"));
        assert!(registry.handles_for("nobody").is_empty());
    }

    #[test]
    fn concurrent_register_and_unregister_never_lose_a_live_handle() {
        let registry = ConnectionRegistry::new();

        // Race an unregister of the last old handle against a fresh
        // registration; the new handle must survive the empty-entry cleanup.
        for _ in 0..1000 {
            let (tx1, _rx1) = handle();
            let (tx2, _rx2) = handle();
            registry.register("u1", tx1.clone());

            let reg = registry.clone();
            let racer = std::thread::spawn(move || reg.register("u1", tx2));
            registry.unregister("u1", &tx1);
            racer.join().unwrap();

            assert!(registry.is_online("u1"), "live handle lost in cleanup race");
            assert_eq!(registry.handles_for("u1").len(), 1);

            for tx in registry.handles_for("u1") {
                registry.unregister("u1", &tx);
            }
            assert!(!registry.is_online("u1"));
        }
    }

    #[test]
    fn send_to_closed_handle_is_swallowed() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = handle();

        registry.register("u1", tx);
        drop(rx);

        // The receiver is gone; the send fails internally and nothing
        // escalates to the caller.
        registry.send_to_user("u1", &ServerEvent::NotificationsCleared {});
        registry.broadcast_to_all(&ServerEvent::NotificationsCleared {});
    }
}
