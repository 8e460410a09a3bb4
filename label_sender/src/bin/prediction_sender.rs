use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use label_sender::{
    client::{payload_from_line, RelayClient},
    throttle::Throttle,
};
use tokio::io::{self, AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the relay server to send predictions to
    #[clap(long, env = "RELAY_ADDRESS", default_value = "127.0.0.1:3000")]
    address: String,

    /// Minimum time between two predictions, in milliseconds
    #[clap(long, default_value_t = 1000)]
    interval_ms: u64,
}

/// Reads one line of comma-separated detection labels per frame from stdin
/// and forwards them to the relay.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = RelayClient::new(&args.address);
    let mut throttle = Throttle::new(Duration::from_millis(args.interval_ms));
    log::info!("Sending predictions to {}", client.base_url());

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let payload = match payload_from_line(&line) {
            Some(payload) => payload,
            None => continue,
        };
        if !throttle.ready(Instant::now()) {
            log::debug!("Dropping {} (too soon)", &payload);
            continue;
        }

        match client.send_prediction(&payload).await {
            Ok(response) => log::info!("Sent {}: {}", &response.payload, &response.message),
            Err(e) => log::error!("Failed to send {}: {}", &payload, e),
        }
    }

    log::info!("Input closed");
    Ok(())
}
