use clap::Parser;
use log::info;
use race_client::autopilot::Direction;
use race_client::network::{Client, ClientOptions};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Watch the race instead of driving
    #[arg(long)]
    spectate: bool,

    /// Display name (at least 3 characters)
    #[arg(short, long)]
    name: Option<String>,

    /// Preferred color index (0-15)
    #[arg(short, long)]
    color: Option<i32>,

    /// Autopilot speed in circuit units per second
    #[arg(long, default_value = "20")]
    speed: f32,

    /// Drive the circuit the wrong way round
    #[arg(short, long)]
    reverse: bool,

    /// Ask the server to start the race after this many seconds
    #[arg(long)]
    start_after: Option<u64>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,
}

impl From<Args> for ClientOptions {
    fn from(args: Args) -> Self {
        ClientOptions {
            wants_racer: !args.spectate,
            name: args.name,
            color: args.color,
            speed: args.speed,
            direction: if args.reverse {
                Direction::Reverse
            } else {
                Direction::Forward
            },
            start_after: args.start_after.map(Duration::from_secs),
            fake_ping_ms: args.fake_ping,
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

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let server = args.server.clone();
    let mut client = Client::new(&server, ClientOptions::from(args)).await?;
    client.run().await
}
