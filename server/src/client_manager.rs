//! Client connection management and per-client input queues
//!
//! Each connected client owns one FIFO queue of input frames waiting for the
//! authority. The queue is created on connect and torn down on disconnect or
//! timeout, so nothing lingers for a client that is gone.

use log::{debug, info};
use shared::InputFrame;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a client is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Represents a connected client and its queued input
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Frames received but not yet consumed, in arrival order
    pub inbound: VecDeque<InputFrame>,
    /// Highest sequence the authority has applied for this client
    pub last_processed_input: Option<u32>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            inbound: VecDeque::new(),
            last_processed_input: None,
        }
    }

    /// Appends a frame in arrival order. No reordering or deduplication
    /// happens here; the authority decides how to treat the batch.
    pub fn enqueue(&mut self, frame: InputFrame) {
        self.last_seen = Instant::now();
        self.inbound.push_back(frame);
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every connected client and its input queue.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a client and creates its input queue. `None` when full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client together with any frames it still had queued.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected, discarding {} queued frames",
                client.id,
                client.inbound.len()
            );
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Queues a frame for `client_id`. Returns `false` for unknown clients.
    pub fn enqueue(&mut self, client_id: u32, frame: InputFrame) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.enqueue(frame);
            true
        } else {
            false
        }
    }

    /// Takes every queued frame from every client, each client's frames in
    /// arrival order. Clients are returned in ID order.
    pub fn drain(&mut self) -> Vec<(u32, Vec<InputFrame>)> {
        let mut ids: Vec<u32> = self.clients.keys().copied().collect();
        ids.sort_unstable();

        ids.into_iter()
            .filter_map(|id| {
                let client = self.clients.get_mut(&id)?;
                if client.inbound.is_empty() {
                    return None;
                }
                Some((id, client.inbound.drain(..).collect()))
            })
            .collect()
    }

    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = Some(
                client
                    .last_processed_input
                    .map_or(sequence, |last| last.max(sequence)),
            );
        }
    }

    pub fn last_processed_input(&self, client_id: u32) -> Option<u32> {
        self.clients
            .get(&client_id)
            .and_then(|client| client.last_processed_input)
    }

    /// Removes and returns every client silent for longer than
    /// [`CLIENT_TIMEOUT`].
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        self.check_timeouts_after(CLIENT_TIMEOUT)
    }

    pub fn check_timeouts_after(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            debug!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
