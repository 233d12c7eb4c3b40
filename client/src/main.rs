use std::io::{self, Write};

use clap::Parser;
use log::info;

use client::network::Client;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:1977")]
    server: String,

    /// Player name (prompted when omitted)
    #[arg(short, long)]
    name: Option<String>,
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let name = match args.name {
        Some(name) => name,
        None => prompt("Name")?,
    };
    let secret = prompt("Secret")?;

    info!("Connecting to {}", args.server);
    let client = Client::connect(&args.server, &name, &secret).await?;
    println!("Connected. Type 'help' for the command list.");

    client.run().await?;
    Ok(())
}
