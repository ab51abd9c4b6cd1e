//! # Race Client Library
//!
//! Headless client for the race server. It stands in for a player's game:
//! an autopilot drives along the circuit and reports positions, while a
//! mirror of the replicated race state feeds a text HUD.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`game::RaceMirror`] keeps one mirror-authority field per replicated key.
//! Mirrors are created on first delivery and dropped when the server reports
//! the participant left. Stale or duplicated deliveries are ignored.
//!
//! ### HUD Module (`hud`)
//! Observers on the mirrored fields emit [`hud::HudEvent`]s through a channel;
//! the [`hud::Hud`] turns them into lap counters, wrong-way warnings and the
//! current race order.
//!
//! ### Autopilot Module (`autopilot`)
//! Moves at a constant speed along the circuit centerline, forwards or in
//! reverse, and snaps back onto the track when the server teleports it.
//!
//! ### Network Module (`network`)
//! UDP transport, the join handshake, heartbeats and the client event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use race_client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let options = ClientOptions {
//!         name: Some("alice".to_string()),
//!         ..ClientOptions::default()
//!     };
//!     let mut client = Client::new("127.0.0.1:8080", options).await?;
//!     client.run().await
//! }
//! ```

pub mod autopilot;
pub mod game;
pub mod hud;
pub mod network;
