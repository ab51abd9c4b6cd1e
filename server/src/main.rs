use clap::Parser;
use log::info;
use race_server::config::ServerConfig;
use race_server::network::{Server, ServerMessage};
use race_shared::{DEFAULT_MAX_LAPS, DEFAULT_MAX_RACERS};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authoritative race server")]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(long, default_value = "8")]
    max_clients: usize,

    /// Number of racer slots on the grid
    #[arg(long, default_value_t = DEFAULT_MAX_RACERS)]
    max_racers: usize,

    /// Laps needed to finish a race
    #[arg(short = 'l', long, default_value_t = DEFAULT_MAX_LAPS)]
    max_laps: i32,

    /// Circuit JSON file ({"waypoints": [[x, y], ...]}); defaults to the built-in oval
    #[arg(short, long)]
    circuit: Option<PathBuf>,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Ticks between full state resyncs (0 disables)
    #[arg(long, default_value = "60")]
    resync_interval: u32,

    /// Seed for color assignment
    #[arg(long)]
    color_seed: Option<u64>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_rate: args.tick_rate,
            max_clients: args.max_clients,
            max_racers: args.max_racers,
            max_laps: args.max_laps,
            circuit_path: args.circuit,
            client_timeout: Duration::from_secs(args.timeout_secs),
            resync_interval: args.resync_interval,
            color_seed: args.color_seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig::from(args);
    info!(
        "Starting race server on {} at {} Hz ({} racers, {} laps)",
        config.bind_addr, config.tick_rate, config.max_racers, config.max_laps
    );

    let mut server = Server::new(config).await?;
    let control = server.control();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully");
            let _ = control.send(ServerMessage::Shutdown);
        }
    });

    server.run().await
}
