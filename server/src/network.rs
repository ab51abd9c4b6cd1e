//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::{Outbound, RaceGame, Request};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use race_shared::{ConnectionId, Packet, Vector2, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

pub type NetworkError = Box<dyn std::error::Error + Send + Sync>;

/// Largest tick delta fed to the simulation after a stall.
const MAX_TICK_DELTA: f32 = 0.25;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: ConnectionId,
    },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ConnectionId>,
    },
}

/// Main server coordinating networking and the race simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: RaceGame,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Validates `config`, loads the circuit and binds the socket.
    pub async fn new(config: ServerConfig) -> Result<Self, NetworkError> {
        config.validate()?;
        let circuit = Arc::new(config.load_circuit()?);

        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let mut game = RaceGame::new(circuit, &config);
        game.initialize();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            game,
            tick_duration: config.tick_duration(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that can stop [`Server::run`] with [`ServerMessage::Shutdown`].
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
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

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
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
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), NetworkError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue_message(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue outgoing packet: {}", e);
        }
    }

    /// Hands everything the game produced to the sender task.
    async fn flush_outbox(&mut self) {
        let outbox = self.game.drain_outbox();
        if outbox.is_empty() {
            return;
        }

        let clients = self.clients.read().await;
        for outbound in outbox {
            match outbound {
                Outbound::To(connection_id, packet) => match clients.addr_of(connection_id) {
                    Some(addr) => self.queue_message(GameMessage::SendPacket { packet, addr }),
                    None => debug!("Dropping packet for departed connection {}", connection_id),
                },
                Outbound::Broadcast(packet) => {
                    self.queue_message(GameMessage::BroadcastPacket {
                        packet,
                        exclude: None,
                    });
                }
            }
        }
    }

    /// Turns a datagram into connection changes or queued requests
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };
        let Some(client_id) = client_id else {
            debug!("Ignoring {:?} from unknown address {}", packet, addr);
            return;
        };

        match packet {
            Packet::Position { sequence, x, y } => {
                if !self.game.record_position(client_id, sequence, Vector2::new(x, y)) {
                    debug!("Dropped position {} from client {}", sequence, client_id);
                }
            }
            Packet::Heartbeat => {}
            Packet::Disconnect => {
                self.clients.write().await.remove_client(&client_id);
                self.game.disconnect(client_id);
            }
            packet => match Request::from_packet(client_id, &packet) {
                Some(request) => self.game.queue(request),
                None => warn!("Unexpected packet type from client {} at {}", client_id, addr),
            },
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.queue_message(GameMessage::SendPacket {
                packet: Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            });
            return;
        }

        // A reconnect from the same address replaces the old connection
        let client_id = {
            let mut clients = self.clients.write().await;
            if let Some(existing_id) = clients.find_client_by_addr(addr) {
                info!("Removing existing client {} from {}", existing_id, addr);
                clients.remove_client(&existing_id);
                self.game.disconnect(existing_id);
            }
            clients.add_client(addr)
        };

        match client_id {
            Some(client_id) => self.game.connect(client_id),
            None => self.queue_message(GameMessage::SendPacket {
                packet: Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            }),
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), NetworkError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
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
                            info!("Client {} timed out", client_id);
                            self.game.disconnect(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                    self.flush_outbox().await;
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_TICK_DELTA);
                    last_tick = now;

                    let tick = self.game.tick(dt);
                    self.flush_outbox().await;

                    if tick % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} clients, {} participants, race active: {}",
                            tick,
                            client_count,
                            self.game.session().len(),
                            self.game.session().is_active()
                        );
                    }
                },
            }
        }

        self.game.shutdown();
        self.flush_outbox().await;
        // Let the sender task drain the goodbye packets
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}
