//! Relay server binary.
//!
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use relay_server::{
    build_router,
    cache::InboundCache,
    config::Args,
    connector::{BrokerConnector, Publisher},
    endpoints::Relay,
    meter::spawn_meter_logger,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Environment from `.env` is visible to the argument parser below
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Setup logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let config = args.into_config()?;
    let shutdown = CancellationToken::new();

    // The broker session fills the cache and publishes on behalf of the endpoints
    let cache = Arc::new(InboundCache::new());
    let (connector, connector_task) = BrokerConnector::connect(
        &config.broker,
        &config.topics,
        Arc::clone(&cache),
        config.reconnect.clone(),
    );
    let connector_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { connector_task.run(shutdown).await })
    };

    spawn_meter_logger();

    let publisher: Arc<dyn Publisher> = Arc::new(connector);
    let relay = Arc::new(Relay::new(
        cache,
        publisher,
        config.topics.clone(),
        config.vocabulary.clone(),
        config.broker.max_payload,
    ));
    let app = build_router(relay, config.static_dir.as_deref());

    log::info!(
        "Relaying {} -> GET /get-data, POST /prediction -> {}",
        &config.topics.subscribe,
        &config.topics.publish
    );
    log::info!(
        "Server is running on {}{}",
        config.app_url.as_deref().unwrap_or("http://localhost:"),
        config.listen.port()
    );

    // Serve HTTP server
    axum::Server::try_bind(&config.listen)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    connector_handle.await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => log::info!("Shutting down"),
            Err(e) => {
                log::error!("Unable to listen for shutdown signal: {}", e);
                shutdown.cancelled().await;
            }
        },
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
