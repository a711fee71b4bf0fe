use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};

use crate::models::envelope::{Envelope, RegistrySnapshot};
use crate::models::peer::Peer;
use crate::utils::id_generator::IdAllocator;

/// Display names longer than this are truncated during the handshake.
const MAX_NAME_LEN: usize = 15;

pub type Registry = Arc<RwLock<BTreeMap<u64, Peer>>>;

/// Shared hub state: the authoritative client registry plus the connection
/// id source. The registry is the only state touched from multiple
/// connection tasks, and every mutation goes through the lock held here.
pub struct HubState {
    pub registry: Registry,
    ids: IdAllocator,
}

impl HubState {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(BTreeMap::new())),
            ids: IdAllocator::new(),
        }
    }

    pub fn allocate_id(&self) -> u64 {
        self.ids.allocate()
    }

    /// Approve a display name and insert the peer, without announcing it.
    ///
    /// Name approval and insertion happen under one write lock so that two
    /// clients racing for the same name cannot both get it. The join is
    /// announced separately by [`HubState::announce_join`] once the approved
    /// name has reached the client; a peer that fails mid-handshake is pulled
    /// back out with [`HubState::remove_quiet`] and never appears in a
    /// presence event.
    pub async fn register(
        &self,
        id: u64,
        requested_name: &str,
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<Envelope>,
    ) -> String {
        let mut registry = self.registry.write().await;
        let name = approve_name(requested_name, &registry);
        registry.insert(
            id,
            Peer {
                id,
                name: name.clone(),
                addr,
                connected_at: Utc::now(),
                tx,
            },
        );
        name
    }

    /// Announce a completed join to every registered client, newcomer included.
    pub async fn announce_join(&self, id: u64) {
        let registry = self.registry.write().await;
        let envelope = Envelope::PresenceJoined {
            new_id: id,
            registry: snapshot_of(&registry),
        };
        deliver_all(&registry, &envelope);
    }

    /// Remove a peer and announce the departure to everyone still registered.
    /// Removal and announcement form one critical section, so no later event
    /// can observe the departed peer. Returns the removed peer, if any.
    pub async fn deregister(&self, id: u64) -> Option<Peer> {
        let mut registry = self.registry.write().await;
        let peer = registry.remove(&id)?;
        let envelope = Envelope::PresenceLeft {
            departed_id: id,
            departed_name: peer.name.clone(),
            registry: snapshot_of(&registry),
        };
        deliver_all(&registry, &envelope);
        Some(peer)
    }

    /// Remove a peer that never finished its handshake. No announcement.
    pub async fn remove_quiet(&self, id: u64) {
        self.registry.write().await.remove(&id);
    }

    /// Deliver one envelope to every registered client. Takes the write lock
    /// so that each event's delivery walk is atomic relative to other events,
    /// which gives all clients the same view of broadcast order.
    pub async fn broadcast(&self, envelope: Envelope) {
        let registry = self.registry.write().await;
        deliver_all(&registry, &envelope);
    }

    /// Deliver one envelope to a single recipient. Returns false if the
    /// recipient is no longer registered or its outbound queue is gone.
    pub async fn send_to(&self, recipient_id: u64, envelope: Envelope) -> bool {
        let registry = self.registry.read().await;
        match registry.get(&recipient_id) {
            Some(peer) => match peer.deliver(envelope) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("{e}");
                    false
                }
            },
            None => false,
        }
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        snapshot_of(&*self.registry.read().await)
    }

    pub async fn client_count(&self) -> usize {
        self.registry.read().await.len()
    }
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(registry: &BTreeMap<u64, Peer>) -> RegistrySnapshot {
    registry
        .iter()
        .map(|(id, peer)| (*id, peer.name.clone()))
        .collect()
}

fn deliver_all(registry: &BTreeMap<u64, Peer>, envelope: &Envelope) {
    for peer in registry.values() {
        // One dead outbound queue must not stop delivery to the rest.
        if let Err(e) = peer.deliver(envelope.clone()) {
            log::warn!("{e}");
        }
    }
}

/// Normalize a requested display name: trim, cap at [`MAX_NAME_LEN`]
/// characters, fall back to "noname" when nothing usable is left.
fn normalize_name(requested: &str) -> String {
    let name: String = requested.trim().chars().take(MAX_NAME_LEN).collect();
    let name = name.trim_end();
    if name.is_empty() {
        "noname".to_string()
    } else {
        name.to_string()
    }
}

/// Normalize and de-duplicate against names already in the registry by
/// suffixing "#2", "#3", ... until the name is free.
fn approve_name(requested: &str, registry: &BTreeMap<u64, Peer>) -> String {
    let base = normalize_name(requested);
    let taken = |name: &str| registry.values().any(|peer| peer.name == name);
    if !taken(&base) {
        return base;
    }
    let mut num = 2;
    loop {
        let candidate = format!("{base}#{num}");
        if !taken(&candidate) {
            return candidate;
        }
        num += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::Envelope;
    use tokio::sync::mpsc;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9999".parse().unwrap()
    }

    #[test]
    fn test_normalize_name_trims_and_caps() {
        assert_eq!(normalize_name("  Alice  "), "Alice");
        assert_eq!(normalize_name("abcdefghijklmnopqrst"), "abcdefghijklmno");
        assert_eq!(normalize_name(""), "noname");
        assert_eq!(normalize_name("   "), "noname");
    }

    #[test]
    fn test_normalize_name_is_character_based() {
        // Multi-byte characters count as one; no panic on byte boundaries.
        let name = normalize_name("ééééééééééééééééé");
        assert_eq!(name.chars().count(), 15);
    }

    #[tokio::test]
    async fn test_register_deduplicates_names() {
        let state = HubState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = state.register(1, "Alice", test_addr(), tx.clone()).await;
        let second = state.register(2, "Alice", test_addr(), tx.clone()).await;
        let third = state.register(3, "Alice", test_addr(), tx).await;
        assert_eq!(first, "Alice");
        assert_eq!(second, "Alice#2");
        assert_eq!(third, "Alice#3");
    }

    #[tokio::test]
    async fn test_deregister_announces_to_remaining() {
        let state = HubState::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        state.register(1, "a", test_addr(), tx_a).await;
        state.register(2, "b", test_addr(), tx_b).await;

        let removed = state.deregister(2).await.unwrap();
        assert_eq!(removed.name, "b");
        assert!(removed.connected_at <= Utc::now());

        let envelope = rx_a.recv().await.unwrap();
        match envelope {
            Envelope::PresenceLeft {
                departed_id,
                departed_name,
                registry,
            } => {
                assert_eq!(departed_id, 2);
                assert_eq!(departed_name, "b");
                assert!(!registry.contains_key(&2));
                assert!(registry.contains_key(&1));
            }
            other => panic!("expected PresenceLeft, got {:?}", other),
        }
        assert_eq!(state.client_count().await, 1);
    }

    #[tokio::test]
    async fn test_deregister_unknown_id_is_a_no_op() {
        let state = HubState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.register(1, "a", test_addr(), tx).await;

        assert!(state.deregister(42).await.is_none());

        assert_eq!(state.client_count().await, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_recipient() {
        let state = HubState::new();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.register(1, "a", test_addr(), tx_a).await;
        state.register(2, "b", test_addr(), tx_b).await;
        drop(rx_a);

        state
            .broadcast(Envelope::Broadcast {
                sender_id: 1,
                body: "hi".into(),
            })
            .await;

        assert!(matches!(
            rx_b.recv().await,
            Some(Envelope::Broadcast { sender_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_send_to_unknown_recipient_returns_false() {
        let state = HubState::new();
        let delivered = state
            .send_to(
                7,
                Envelope::Private {
                    sender_id: 1,
                    recipient_id: 7,
                    body: "psst".into(),
                },
            )
            .await;
        assert!(!delivered);
    }
}
