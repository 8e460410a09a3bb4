use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use label_sender::{client::RelayClient, poller::poll_commands};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the relay server to poll
    #[clap(long, env = "RELAY_ADDRESS", default_value = "127.0.0.1:3000")]
    address: String,

    /// Poll interval in milliseconds
    #[clap(long, default_value_t = 1000)]
    interval_ms: u64,
}

/// Polls the relay for broker commands and prints each new one to stdout.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = RelayClient::new(&args.address);
    log::info!("Polling commands from {}", client.base_url());

    poll_commands(
        &client,
        Duration::from_millis(args.interval_ms),
        shutdown_signal(),
        |command| println!("{command}"),
    )
    .await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
