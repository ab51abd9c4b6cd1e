//! # Race Server Library
//!
//! Authoritative server for the racing game. It owns the participant registry,
//! runs the lap and checkpoint tracker over the positions reported by the
//! vehicle simulation, ranks the racers every tick and replicates the derived
//! state to every connected client.
//!
//! ## Architecture
//!
//! A single event loop selects over incoming datagrams and a fixed tick
//! interval. Datagrams are decoded into requests and queued on the
//! [`game::RaceGame`]; the queue is drained at the start of each tick so that
//! joins, leaves and race transitions never interleave with a projection pass.
//!
//! Separate tokio tasks handle the socket receiver, the outgoing packet queue
//! and client timeouts. They talk to the loop through unbounded channels, so
//! no tick ever waits on network I/O.
//!
//! ## Modules
//!
//! - `config`: validated [`config::ServerConfig`] and circuit loading
//! - `client_manager`: address to connection id table and timeouts
//! - `color_pool`: exclusive allocation of the 16 player colors
//! - `session`: participants, racer slots, race start/stop/finish
//! - `replication`: versioned server-side fields and delta batching
//! - `game`: the tick pipeline tying the above together
//! - `network`: UDP transport and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use race_server::config::ServerConfig;
//! use race_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:8080".to_string(),
//!         max_laps: 5,
//!         ..ServerConfig::default()
//!     };
//!
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod color_pool;
pub mod config;
pub mod game;
pub mod network;
pub mod replication;
pub mod session;
