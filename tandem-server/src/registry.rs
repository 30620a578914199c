//! Bookkeeping for connected clients.
//!
//! The table is shared between the accept path, both dispatchers, and the
//! per-client writer tasks, so all access goes through an `RwLock`.
//! Iteration hands out a snapshot of outbound senders; no caller does I/O
//! while holding the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use tandem_wire::Message;

/// Connection state for one client.
pub struct ClientHandle {
    pub site_id: u64,
    pub username: String,
    outbound: mpsc::Sender<Message>,
}

impl ClientHandle {
    pub fn new(site_id: u64, outbound: mpsc::Sender<Message>) -> Self {
        ClientHandle {
            site_id,
            username: String::new(),
            outbound,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<Message> {
        self.outbound.clone()
    }
}

/// Relay-wide counters.
#[derive(Debug, Default)]
pub struct Stats {
    pub total_connections: AtomicU64,
    pub messages_relayed: AtomicU64,
}

/// The table of active clients plus the site-id mint.
pub struct Registry {
    clients: RwLock<HashMap<Uuid, ClientHandle>>,
    next_site_id: AtomicU64,
    stats: Stats,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            clients: RwLock::new(HashMap::new()),
            next_site_id: AtomicU64::new(0),
            stats: Stats::default(),
        }
    }

    /// Mint the next site id. Strictly monotone under concurrent accepts;
    /// the first client gets 1.
    pub fn mint_site_id(&self) -> u64 {
        self.next_site_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn add(&self, id: Uuid, handle: ClientHandle) {
        self.stats.total_connections.fetch_add(1, Ordering::Relaxed);
        self.clients.write().await.insert(id, handle);
    }

    pub async fn remove(&self, id: Uuid) -> Option<ClientHandle> {
        self.clients.write().await.remove(&id)
    }

    pub async fn update_username(&self, id: Uuid, username: String) {
        if let Some(handle) = self.clients.write().await.get_mut(&id) {
            handle.username = username;
        }
    }

    pub async fn sender(&self, id: Uuid) -> Option<mpsc::Sender<Message>> {
        self.clients.read().await.get(&id).map(ClientHandle::sender)
    }

    /// Snapshot of every client's outbound sender.
    pub async fn senders(&self) -> Vec<(Uuid, mpsc::Sender<Message>)> {
        self.clients
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.sender()))
            .collect()
    }

    /// Comma-separated, sorted list of the usernames that have announced
    /// themselves.
    pub async fn usernames(&self) -> String {
        let mut names: Vec<String> = self
            .clients
            .read()
            .await
            .values()
            .filter(|handle| !handle.username.is_empty())
            .map(|handle| handle.username.clone())
            .collect();
        names.sort();
        names.join(",")
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(site_id: u64) -> (ClientHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(4);
        (ClientHandle::new(site_id, tx), rx)
    }

    #[test]
    fn site_ids_are_minted_monotonically_from_one() {
        let registry = Registry::new();
        assert_eq!(registry.mint_site_id(), 1);
        assert_eq!(registry.mint_site_id(), 2);
        assert_eq!(registry.mint_site_id(), 3);
    }

    #[tokio::test]
    async fn add_and_remove_clients() {
        let registry = Registry::new();
        let id = Uuid::new_v4();
        let (h, _rx) = handle(1);

        registry.add(id, h).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.sender(id).await.is_some());

        assert!(registry.remove(id).await.is_some());
        assert!(registry.is_empty().await);
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn usernames_are_sorted_and_skip_unannounced_clients() {
        let registry = Registry::new();
        let bob = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let silent = Uuid::new_v4();
        let mut receivers = Vec::new();
        for id in [bob, alice, silent] {
            let (h, rx) = handle(1);
            receivers.push(rx);
            registry.add(id, h).await;
        }

        registry.update_username(bob, "bob".into()).await;
        registry.update_username(alice, "alice".into()).await;

        assert_eq!(registry.usernames().await, "alice,bob");
    }

    #[tokio::test]
    async fn senders_snapshot_matches_the_table() {
        let registry = Registry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (h, rx) = handle(1);
            receivers.push(rx);
            registry.add(Uuid::new_v4(), h).await;
        }
        assert_eq!(registry.senders().await.len(), 3);
    }
}
