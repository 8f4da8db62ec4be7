//! Network layer for the authoritative server
//!
//! Three background tasks feed and drain the main loop over channels:
//!
//! 1. **Receiver**: decodes datagrams and forwards them as [`ServerMessage`]s
//! 2. **Sender**: writes queued [`GameMessage`]s to the socket
//! 3. **Timeout checker**: drops clients that went silent
//! 4. **Shutdown listener**: turns Ctrl-C into [`ServerMessage::Shutdown`]
//!
//! The main loop owns the authority, the phase service and the session
//! director, so all game state is touched from one task only. Besides the
//! per-frame results, every tick broadcasts each player's authoritative state
//! to everyone except its owner, who predicts it instead.

use crate::authority::Authority;
use crate::client_manager::ClientManager;
use crate::config::{PhaseTable, ServerConfig};
use crate::phases::GsService;
use crate::session::SessionDirector;
use log::{debug, error, info, warn};
use shared::{
    ClientLink, MovementConfig, ObjectId, Packet, Replicator, ResultSnapshot, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// [`Replicator`] that announces every spawn and destroy to all clients.
pub struct NetworkReplicator {
    next_id: u32,
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl NetworkReplicator {
    pub fn new(game_tx: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { next_id: 0, game_tx }
    }

    fn broadcast(&self, packet: Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet,
            exclude: None,
        }) {
            error!("Failed to queue replication packet: {}", e);
        }
    }
}

impl Replicator for NetworkReplicator {
    fn spawn(&mut self, prefab: &str) -> ObjectId {
        self.next_id += 1;
        let object_id = ObjectId(self.next_id);
        debug!("Replicating {} as {}", prefab, object_id);
        self.broadcast(Packet::ObjectSpawned {
            object_id,
            prefab: prefab.to_string(),
        });
        object_id
    }

    fn destroy(&mut self, object_id: ObjectId) {
        debug!("Destroying replicated {}", object_id);
        self.broadcast(Packet::ObjectDestroyed { object_id });
    }
}

/// [`ClientLink`] that addresses each result to the client that sent the
/// frame, using addresses captured at the start of the tick.
pub struct ResultRouter {
    addrs: HashMap<u32, SocketAddr>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
}

impl ResultRouter {
    pub fn new(
        addrs: impl IntoIterator<Item = (u32, SocketAddr)>,
        game_tx: mpsc::UnboundedSender<GameMessage>,
    ) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
            game_tx,
        }
    }
}

impl ClientLink for ResultRouter {
    fn send_to_client(&mut self, client_id: u32, snapshot: &ResultSnapshot) {
        let Some(addr) = self.addrs.get(&client_id).copied() else {
            warn!("No address for client {}, dropping result #{}", client_id, snapshot.sequence);
            return;
        };

        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: Packet::InputResult {
                snapshot: *snapshot,
            },
            addr,
        }) {
            error!("Failed to queue result for client {}: {}", client_id, e);
        }
    }
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    authority: Authority,
    phases: GsService<NetworkReplicator>,
    director: SessionDirector,
    tick_duration: Duration,
    tick: u64,
    /// Seconds of simulated time, stamped on remote state broadcasts
    server_time: f64,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: ServerConfig,
        table: PhaseTable,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let phases = GsService::new(table, NetworkReplicator::new(game_tx.clone()))?;
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            authority: Authority::new(MovementConfig::default(), config.ordering),
            phases,
            director: SessionDirector::new(&config),
            tick_duration,
            tick: 0,
            server_time: 0.0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(_) => warn!("Failed to deserialize packet from {}", addr),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn spawn_shutdown_listener(&self) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    if let Err(e) = server_tx.send(ServerMessage::Shutdown) {
                        error!("Failed to send shutdown message: {}", e);
                    }
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Brings a newly connected client up to date on the session state.
    fn send_session_state(&self, addr: SocketAddr) {
        for (object_id, prefab) in self.phases.live_objects() {
            self.send_packet(Packet::ObjectSpawned { object_id, prefab }, addr);
        }
        if let Some(phase) = self.phases.active_phase() {
            self.send_packet(Packet::PhaseChanged { phase }, addr);
        }
    }

    async fn drop_client(&mut self, client_id: u32) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.forget_entity(client_id);
    }

    /// Removes a departed client's entity and tells the remaining players.
    fn forget_entity(&mut self, client_id: u32) {
        if self.authority.despawn(client_id) {
            self.broadcast_packet(Packet::PlayerLeft { client_id }, Some(client_id));
        }
    }

    /// Sends every entity's authoritative state to all other players.
    fn broadcast_remote_states(&self) {
        for (client_id, state) in self.authority.entities() {
            self.broadcast_packet(
                Packet::RemoteState {
                    client_id,
                    server_time: self.server_time,
                    state,
                },
                Some(client_id),
            );
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol {} != {}",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    self.send_packet(
                        Packet::Disconnected {
                            reason: format!(
                                "Protocol version mismatch (server {}, client {})",
                                PROTOCOL_VERSION, client_version
                            ),
                        },
                        addr,
                    );
                    return;
                }

                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    let state = self.authority.spawn(client_id);
                    self.send_packet(Packet::Connected { client_id, state }, addr);
                    self.send_session_state(addr);
                } else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                }
            }

            Packet::Input { frame } => {
                let mut clients = self.clients.write().await;
                match clients.find_client_by_addr(addr) {
                    Some(client_id) => {
                        clients.enqueue(client_id, frame);
                    }
                    None => debug!("Input #{} from unknown address {}", frame.sequence, addr),
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// One server tick: consume queued input, share the resulting states,
    /// then advance the session.
    async fn process_tick(&mut self, dt: f32) {
        let (drained, addrs) = {
            let mut clients = self.clients.write().await;
            (clients.drain(), clients.get_client_addrs())
        };

        let mut router = ResultRouter::new(addrs, self.game_tx.clone());
        let mut applied = Vec::new();
        for (client_id, frames) in drained {
            if self.authority.consume(client_id, frames, &mut router) > 0 {
                if let Some(last) = self.authority.last_applied(client_id) {
                    applied.push((client_id, last));
                }
            }
        }

        let connected = {
            let mut clients = self.clients.write().await;
            for (client_id, last) in applied {
                clients.mark_input_processed(client_id, last);
            }
            clients.len()
        };

        self.server_time += dt as f64;
        self.broadcast_remote_states();

        if let Some(change) = self.phases.tick(dt) {
            self.broadcast_packet(Packet::PhaseChanged { phase: change.to }, None);
        }
        self.director.update(&mut self.phases, connected, dt);

        self.tick += 1;
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;
        self.spawn_shutdown_listener().await;

        self.phases.start()?;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.forget_entity(client_id);
                        },
                        Some(ServerMessage::Shutdown) => {
                            info!("Server shutting down");
                            self.broadcast_packet(
                                Packet::Disconnected {
                                    reason: "Server shutting down".to_string(),
                                },
                                None,
                            );
                            // Give the sender task a chance to flush the notice
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            break;
                        },
                        None => {
                            info!("Message channel closed, stopping");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.process_tick(dt).await;

                    if self.tick % 60 == 0 && !self.authority.is_empty() {
                        debug!(
                            "Tick {}: {} entities, {:.1}Hz, phase {:?}, in flight {:?}",
                            self.tick,
                            self.authority.len(),
                            1.0 / dt,
                            self.phases.active_phase(),
                            self.phases.in_flight()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
