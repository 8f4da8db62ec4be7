use clap::Parser;
use log::info;
use server::authority::InputOrdering;
use server::config::{PhaseTable, ServerConfig};
use server::network::Server;
use shared::DEFAULT_TICK_RATE;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// TOML phase table; the built-in lobby/match loop is used when omitted
    #[arg(long)]
    phases: Option<PathBuf>,

    /// Order in which each tick's queued input frames are applied
    #[arg(long, value_enum, default_value_t = InputOrdering::Arrival)]
    ordering: InputOrdering,

    /// Players required before the lobby moves to pre-game
    #[arg(long, default_value = "1")]
    min_players: usize,

    /// Length of a match in seconds
    #[arg(long, default_value = "60")]
    match_secs: f32,

    /// Time spent on the results screen in seconds
    #[arg(long, default_value = "5")]
    post_game_secs: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let table = match &args.phases {
        Some(path) => {
            info!("Loading phase table from {}", path.display());
            PhaseTable::load(path)?
        }
        None => PhaseTable::default_table(),
    };

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        ordering: args.ordering,
        min_players: args.min_players,
        match_secs: args.match_secs,
        post_game_secs: args.post_game_secs,
    };

    info!("Starting server...");
    info!(
        "Tick rate: {}Hz, max clients: {}, input ordering: {:?}",
        config.tick_rate, config.max_clients, config.ordering
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, table).await?;

    server.run().await?;

    Ok(())
}
