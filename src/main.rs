use clap::Parser;
use std::process::ExitCode;
use toydhcp::{Args, ClientConfig, DhcpClient, Outcome};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = match ClientConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid arguments: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Using hardware address {}", config.mac_address);

    let client = match DhcpClient::new(config).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to open DHCP transport: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    match client.acquire_lease().await {
        Outcome::Leased(lease) => {
            println!("ACK received!\n{lease}");
            ExitCode::SUCCESS
        }
        Outcome::Nacked(nak) => {
            println!("NAK received!\n{nak}");
            ExitCode::FAILURE
        }
        Outcome::Failed(e) => {
            println!("Lease acquisition failed: {e}");
            ExitCode::FAILURE
        }
    }
}
