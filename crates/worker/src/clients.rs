//! Controlled-client registry.
//!
//! Tracks the foreground clients the active worker governs. Used only as a
//! broadcast target for completion notices and for notification-click
//! focus/open; nothing here is persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier for a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst))
    }
}

/// Outbound message posted to controlled clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "SYNC_COMPLETED")]
    SyncCompleted { message: String },
}

struct ClientHandle {
    url: String,
    tx: UnboundedSender<ClientMessage>,
    controlled: bool,
    focused: bool,
}

/// Registry of foreground clients.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client showing `url`. The returned receiver carries
    /// broadcast messages once the client is claimed.
    pub async fn register(&self, url: &str) -> (ClientId, UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = unbounded_channel();
        let id = ClientId::next();
        let handle = ClientHandle { url: url.to_string(), tx, controlled: false, focused: false };
        self.clients.lock().await.insert(id, handle);
        (id, rx)
    }

    pub async fn unregister(&self, id: ClientId) {
        self.clients.lock().await.remove(&id);
    }

    /// Take control of every registered client (activation claim).
    pub async fn claim_all(&self) {
        let mut clients = self.clients.lock().await;
        for handle in clients.values_mut() {
            handle.controlled = true;
        }
        tracing::debug!(clients = clients.len(), "claimed clients");
    }

    /// Post a message to every controlled client. Returns how many
    /// clients were reachable; send failures are dropped silently.
    pub async fn broadcast(&self, message: &ClientMessage) -> usize {
        let clients = self.clients.lock().await;
        clients
            .values()
            .filter(|h| h.controlled)
            .filter(|h| h.tx.send(message.clone()).is_ok())
            .count()
    }

    /// Find a client currently showing `url`.
    pub async fn find_by_url(&self, url: &str) -> Option<ClientId> {
        let clients = self.clients.lock().await;
        clients
            .iter()
            .find(|(_, h)| h.url == url)
            .map(|(id, _)| *id)
    }

    /// Focus one client, unfocusing the rest. Returns false if unknown.
    pub async fn focus(&self, id: ClientId) -> bool {
        let mut clients = self.clients.lock().await;
        if !clients.contains_key(&id) {
            return false;
        }
        for (cid, handle) in clients.iter_mut() {
            handle.focused = *cid == id;
        }
        true
    }

    /// Open a new client at `url`, already focused and controlled.
    pub async fn open_window(&self, url: &str) -> ClientId {
        let (tx, _rx) = unbounded_channel();
        let id = ClientId::next();
        let mut clients = self.clients.lock().await;
        for handle in clients.values_mut() {
            handle.focused = false;
        }
        clients.insert(id, ClientHandle { url: url.to_string(), tx, controlled: true, focused: true });
        id
    }

    pub async fn is_focused(&self, id: ClientId) -> bool {
        self.clients
            .lock()
            .await
            .get(&id)
            .is_some_and(|h| h.focused)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }
}
