//! Clients API: the pages a worker controls.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

use crate::ServiceWorkerError;

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A window client (open page).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub focused: bool,
    /// Whether this worker controls the client.
    pub controlled: bool,
}

impl Client {
    /// A window client not yet controlled by any worker.
    pub fn window(url: Url) -> Self {
        Self {
            id: ClientId::new(),
            url,
            focused: false,
            controlled: false,
        }
    }
}

/// Options for `clients.matchAll()`.
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn add(&mut self, client: Client) -> ClientId {
        let id = client.id;
        self.clients.insert(id, client);
        id
    }

    /// Match all clients.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .collect();
        matched.sort_by_key(|c| c.id.raw());
        matched
    }

    /// Take control of every client. Returns how many changed hands.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        debug!(claimed, "Claimed clients");
        claimed
    }

    /// Focus a client, unfocusing every other one.
    pub fn focus(&mut self, id: ClientId) -> Result<&Client, ServiceWorkerError> {
        if !self.clients.contains_key(&id) {
            return Err(ServiceWorkerError::NotFound(format!("client {}", id.raw())));
        }
        for client in self.clients.values_mut() {
            client.focused = client.id == id;
        }
        self.clients
            .get(&id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {}", id.raw())))
    }

    /// Open a new, focused, controlled window.
    pub fn open_window(&mut self, url: Url) -> Client {
        for other in self.clients.values_mut() {
            other.focused = false;
        }
        let client = Client {
            focused: true,
            controlled: true,
            ..Client::window(url)
        };
        self.clients.insert(client.id, client.clone());
        client
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
