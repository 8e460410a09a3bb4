//! Polling loop of the command poller.
//!
use std::{future::Future, time::Duration};

use tokio::time::{interval, MissedTickBehavior};

use crate::client::RelayClient;

/// Poll the relay every `every` and hand each new command to `on_command`.
///
/// Repeats of the last seen command are skipped. Returns as soon as `shutdown`
/// completes, also while a request is in flight.
pub async fn poll_commands<F>(
    client: &RelayClient,
    every: Duration,
    shutdown: impl Future<Output = ()>,
    mut on_command: F,
) where
    F: FnMut(&str),
{
    tokio::pin!(shutdown);

    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_seen: Option<String> = None;
    loop {
        let polled = tokio::select! {
            _ = &mut shutdown => break,
            polled = async {
                ticker.tick().await;
                client.latest_command().await
            } => polled,
        };

        match polled {
            Ok(Some(command)) if last_seen.as_deref() != Some(command.as_str()) => {
                log::info!("New command: {}", &command);
                on_command(&command);
                last_seen = Some(command);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Polling {} failed: {}", client.base_url(), e),
        }
    }
}
