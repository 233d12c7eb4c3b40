use clap::Parser;
use log::info;

use server::network::{Config, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Account store file
    #[arg(short, long, default_value = "accounts.db")]
    accounts: std::path::PathBuf,

    /// Directory for finished-match records
    #[arg(short, long, default_value = "games")]
    games_dir: std::path::PathBuf,

    /// Maximum number of concurrently running games
    #[arg(long, default_value = "50")]
    max_sessions: usize,

    /// Maximum pending challenges or friend requests per player
    #[arg(long, default_value = "8")]
    max_pending: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Starting Awalé server on {}:{}", args.host, args.port);

    let server = Server::bind(Config {
        host: args.host,
        port: args.port,
        accounts_file: args.accounts,
        games_dir: args.games_dir,
        max_sessions: args.max_sessions,
        max_pending: args.max_pending,
    })
    .await?;

    server.run().await?;
    Ok(())
}
