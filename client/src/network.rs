use crate::autopilot::{Autopilot, Direction};
use crate::game::RaceMirror;
use crate::hud::{Hud, HudEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use race_shared::{
    CircuitPath, ConnectionId, Packet, Role, Vector2, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{interval, sleep};

pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

const DRIVE_RATE_HZ: u64 = 30;

/// What this client asks the server for once connected.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub wants_racer: bool,
    pub name: Option<String>,
    pub color: Option<i32>,
    pub speed: f32,
    pub direction: Direction,
    /// Ask the server to start a race this long after joining.
    pub start_after: Option<Duration>,
    pub fake_ping_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            wants_racer: true,
            name: None,
            color: None,
            speed: 20.0,
            direction: Direction::Forward,
            start_after: None,
            fake_ping_ms: 0,
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connection_id: Option<ConnectionId>,
    role: Option<Role>,
    connected: bool,
    finish_requested: bool,

    options: ClientOptions,
    mirror: RaceMirror,
    hud: Hud,
    hud_rx: UnboundedReceiver<HudEvent>,
    autopilot: Option<Autopilot>,
}

impl Client {
    pub async fn new(server_addr: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let (hud_tx, hud_rx) = unbounded_channel();

        Ok(Client {
            socket,
            server_addr,
            connection_id: None,
            role: None,
            connected: false,
            finish_requested: false,
            options,
            mirror: RaceMirror::new(hud_tx),
            hud: Hud::new(),
            hud_rx,
            autopilot: None,
        })
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        if self.options.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Join, name, color and ready, in the order the server applies them.
    async fn introduce(&mut self) -> Result<(), ClientError> {
        self.send_packet(&Packet::Join {
            wants_racer: self.options.wants_racer,
        })
        .await?;

        if let Some(name) = self.options.name.clone() {
            self.send_packet(&Packet::SetName { name }).await?;
        }
        if let Some(color) = self.options.color {
            self.send_packet(&Packet::SetColor { color }).await?;
        }
        self.send_packet(&Packet::ReadyToRace).await
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), ClientError> {
        match packet {
            Packet::Welcome {
                connection_id,
                circuit,
            } => {
                info!("Connected! Connection ID: {}", connection_id);
                self.connection_id = Some(connection_id);
                self.connected = true;
                self.hud.set_own_connection(connection_id);

                let circuit = Arc::new(CircuitPath::from_definition(&circuit)?);
                info!(
                    "Circuit: {:.1} units, {} checkpoints",
                    circuit.length(),
                    circuit.segment_count()
                );
                self.autopilot = Some(Autopilot::new(
                    circuit,
                    self.options.speed,
                    self.options.direction,
                ));
                self.introduce().await?;
            }

            Packet::Joined { racer_id, role } => {
                info!("Joined as {:?} (id {})", role, racer_id);
                self.role = Some(role);
            }

            Packet::Rejected { reason } => {
                warn!("Request rejected: {}", reason);
            }

            Packet::Replicate {
                tick,
                snapshot,
                deltas,
            } => {
                let applied = if snapshot {
                    self.mirror.apply_snapshot(tick, deltas)
                } else {
                    self.mirror.apply(tick, deltas)
                };
                debug!("Tick {}: {} fields updated", tick, applied);
            }

            Packet::ParticipantLeft { connection_id } => {
                let dropped = self.mirror.remove_participant(connection_id);
                debug!("Participant {} left ({} fields)", connection_id, dropped);
            }

            Packet::Teleport { x, y } => {
                if let Some(autopilot) = self.autopilot.as_mut() {
                    autopilot.teleport(Vector2::new(x, y));
                }
                self.finish_requested = false;
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.connection_id = None;
            }

            other => {
                warn!("Unexpected packet from server: {:?}", other);
            }
        }
        Ok(())
    }

    /// Moves the car and reports its position; asks to finish once the
    /// required laps are done.
    async fn drive(&mut self, dt: f32) -> Result<(), ClientError> {
        if self.role != Some(Role::Racer) {
            return Ok(());
        }
        let Some(autopilot) = self.autopilot.as_mut() else {
            return Ok(());
        };

        let (sequence, position) = autopilot.step(dt);
        self.send_packet(&Packet::Position {
            sequence,
            x: position.x,
            y: position.y,
        })
        .await?;

        if let Some(connection_id) = self.connection_id {
            if !self.finish_requested && self.mirror.has_finished(connection_id) {
                info!("Final lap done, requesting finish");
                self.finish_requested = true;
                self.send_packet(&Packet::RequestFinish).await?;
            }
        }
        Ok(())
    }

    fn show_hud_event(&mut self, event: HudEvent) {
        if let Some(line) = self.hud.apply(event) {
            info!("{}", line);
        }
    }

    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.connect().await?;

        let mut drive_interval = interval(Duration::from_millis(1000 / DRIVE_RATE_HZ));
        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut status_interval = interval(Duration::from_secs(5));
        let start_timer = sleep(self.options.start_after.unwrap_or(Duration::from_secs(86_400)));
        tokio::pin!(start_timer);
        let mut start_pending = self.options.start_after.is_some();

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.options.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => {
                                    let was_connected = self.connected;
                                    self.handle_packet(packet).await?;
                                    if was_connected && !self.connected {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                Some(event) = self.hud_rx.recv() => {
                    self.show_hud_event(event);
                },

                _ = drive_interval.tick() => {
                    if let Err(e) = self.drive(1.0 / DRIVE_RATE_HZ as f32).await {
                        error!("Error sending position: {}", e);
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        self.send_packet(&Packet::Heartbeat).await?;
                    }
                },

                _ = status_interval.tick() => {
                    if self.connected {
                        info!("{}", self.hud.status_line());
                    }
                },

                _ = &mut start_timer, if start_pending => {
                    start_pending = false;
                    info!("Requesting race start");
                    self.send_packet(&Packet::StartRace).await?;
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Leaving the session");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
