use clap::Parser;
use client::network::{Client, ClientOptions};
use client::prediction::ReconcileConfig;
use log::info;
use shared::{DEFAULT_EPSILON, DEFAULT_TICK_RATE, MAX_HISTORY_SIZE};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Local simulation ticks per second
    #[arg(short = 't', long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Fraction of outgoing input frames to drop, between 0 and 1
    #[arg(short = 'd', long, default_value = "0")]
    drop_rate: f64,

    /// Position and yaw tolerance when comparing predictions
    #[arg(long, default_value_t = DEFAULT_EPSILON)]
    epsilon: f32,

    /// Maximum number of unacknowledged frames kept for replay
    #[arg(long, default_value_t = MAX_HISTORY_SIZE)]
    history_capacity: usize,

    /// Stop after this many seconds instead of running until Ctrl-C
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
    if args.drop_rate > 0.0 {
        info!("Dropping {:.0}% of input frames", args.drop_rate * 100.0);
    }

    let options = ClientOptions {
        server_addr: args.server,
        tick_rate: args.tick_rate,
        fake_ping_ms: args.fake_ping,
        drop_rate: args.drop_rate,
        reconcile: ReconcileConfig {
            epsilon: args.epsilon,
            history_capacity: args.history_capacity,
        },
        duration: args.duration.map(Duration::from_secs),
    };

    let mut client = Client::new(options).await?;

    client.run().await?;

    Ok(())
}
