use crate::input::{InputRecorder, ScriptedInput};
use crate::interpolation::RemoteEntities;
use crate::phases::PhaseMirror;
use crate::prediction::{ClientPredictor, ReconcileConfig};
use crate::reconciliation::ReconcileOutcome;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{EntityState, InputFrame, MovementConfig, Packet, ServerLink, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, interval_at, sleep, Instant};

/// Runtime knobs for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server_addr: String,
    pub tick_rate: u32,
    /// Simulated round trip; half is added on send, half on receive
    pub fake_ping_ms: u64,
    /// Probability in [0, 1] of silently dropping an outgoing input frame
    pub drop_rate: f64,
    pub reconcile: ReconcileConfig,
    /// Stop after this long; run until Ctrl-C when unset
    pub duration: Option<Duration>,
}

/// [`ServerLink`] that buffers frames for the socket loop to flush, with
/// optional simulated packet loss.
pub struct OutboundFrames {
    pending: Vec<InputFrame>,
    drop_rate: f64,
    rng: StdRng,
    dropped: u64,
}

impl OutboundFrames {
    pub fn new(drop_rate: f64) -> Self {
        Self {
            pending: Vec::new(),
            drop_rate: drop_rate.clamp(0.0, 1.0),
            rng: StdRng::from_entropy(),
            dropped: 0,
        }
    }

    pub fn take(&mut self) -> Vec<InputFrame> {
        std::mem::take(&mut self.pending)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl ServerLink for OutboundFrames {
    fn send_to_server(&mut self, frame: &InputFrame) {
        if self.drop_rate > 0.0 && self.rng.gen_bool(self.drop_rate) {
            debug!("Simulated loss of input #{}", frame.sequence);
            self.dropped += 1;
            return;
        }
        self.pending.push(*frame);
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    predictor: ClientPredictor,
    recorder: InputRecorder,
    script: ScriptedInput,
    mirror: PhaseMirror,
    remotes: RemoteEntities,
    outbound: OutboundFrames,

    tick_rate: u32,
    fake_ping_ms: u64,
    duration: Option<Duration>,
}

impl Client {
    pub async fn new(options: ClientOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = options.server_addr.parse()?;
        let tick_rate = options.tick_rate.max(1);

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            predictor: ClientPredictor::new(
                EntityState::default(),
                MovementConfig::default(),
                options.reconcile,
            ),
            recorder: InputRecorder::new(),
            script: ScriptedInput::new(tick_rate),
            mirror: PhaseMirror::new(),
            remotes: RemoteEntities::default(),
            outbound: OutboundFrames::new(options.drop_rate),
            tick_rate,
            fake_ping_ms: options.fake_ping_ms,
            duration: options.duration,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server at {}...", self.server_addr);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        if self.mirror.observe(&packet) {
            return;
        }

        match packet {
            Packet::Connected { client_id, state } => {
                info!(
                    "Connected! Client ID: {} spawned at ({:.2}, {:.2}, {:.2})",
                    client_id, state.position.x, state.position.y, state.position.z
                );
                self.client_id = Some(client_id);
                self.connected = true;
                self.predictor.reset(state);
            }

            Packet::InputResult { snapshot } => match self.predictor.reconcile(&snapshot) {
                ReconcileOutcome::Corrected { replayed } | ReconcileOutcome::Resynced { replayed } => {
                    debug!("Reconciled #{} by replaying {} frames", snapshot.sequence, replayed);
                }
                _ => {}
            },

            Packet::RemoteState {
                client_id,
                server_time,
                state,
            } => {
                if Some(client_id) != self.client_id {
                    self.remotes.push(client_id, server_time, state);
                }
            }

            Packet::PlayerLeft { client_id } => {
                if self.remotes.remove(client_id) {
                    info!("Player {} left", client_id);
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                self.mirror.clear();
                self.remotes.clear();
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// One local simulation tick: sample input, predict, and flush the frame.
    async fn tick(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected || self.client_id.is_none() {
            return Ok(());
        }

        self.script.drive(&mut self.recorder);
        let dt = 1.0 / self.tick_rate as f32;
        self.remotes.advance(dt as f64);
        self.predictor
            .predict(&self.recorder.sample(), dt, &mut self.outbound);

        for frame in self.outbound.take() {
            self.send_packet(&Packet::Input { frame }).await?;
        }

        Ok(())
    }

    fn log_stats(&self) {
        let stats = self.predictor.stats();
        let state = self.predictor.state();
        info!(
            "Phase {} | pos ({:.2}, {:.2}, {:.2}) yaw {:.1} | predicted {} confirmed {} corrected {} resynced {} stale {} evicted {} dropped {} | unacked {} | remote players {}",
            self.mirror
                .phase()
                .map(|phase| phase.to_string())
                .unwrap_or_else(|| "?".to_string()),
            state.position.x,
            state.position.y,
            state.position.z,
            state.yaw,
            stats.predicted,
            stats.confirmed,
            stats.corrected,
            stats.resynced,
            stats.stale,
            stats.evicted,
            self.outbound.dropped(),
            self.predictor.input_history().len(),
            self.remotes.len()
        );

        for (client_id, remote) in self.remotes.sample_all() {
            debug!(
                "Player {} at ({:.2}, {:.2}, {:.2}) yaw {:.1}, {} snapshots buffered",
                client_id,
                remote.position.x,
                remote.position.y,
                remote.position.z,
                remote.yaw,
                self.remotes.buffered(client_id)
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(Duration::from_secs_f64(1.0 / self.tick_rate as f64));
        // First retry only after a full period, the initial Connect is already out
        let retry_period = Duration::from_secs(1);
        let mut connect_interval = interval_at(Instant::now() + retry_period, retry_period);
        let mut stats_interval = interval(Duration::from_secs(5));

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let run_for = self.duration;
        let deadline = async move {
            match run_for {
                Some(duration) => sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut buffer = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match Packet::decode(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = connect_interval.tick() => {
                    if !self.connected {
                        if let Err(e) = self.connect().await {
                            error!("Error sending connect: {}", e);
                        }
                    }
                },

                _ = stats_interval.tick() => {
                    self.log_stats();
                },

                _ = &mut shutdown => {
                    info!("Interrupted, shutting down");
                    break;
                },

                _ = &mut deadline => {
                    info!("Run duration elapsed, shutting down");
                    break;
                },
            }
        }

        self.log_stats();

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
