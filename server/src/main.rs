use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Relay server for the knight arena")]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (state feed publications per second)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// Maximum number of connected clients
    #[clap(short, long, default_value = "32")]
    max_clients: usize,
    /// Seconds of silence before a client is dropped
    #[clap(long, default_value = "5")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let config = ServerConfig {
        tick_duration: Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32),
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.timeout),
    };

    info!(
        "Starting relay on {} at {} Hz (max {} clients)",
        address, args.tick_rate, args.max_clients
    );

    let mut server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
