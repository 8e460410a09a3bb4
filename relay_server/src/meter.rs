use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

#[derive(Default)]
pub struct Meter {
    published: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            published: AtomicU64::new(0),
            received: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn tick_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_published(&self) -> u64 {
        self.published.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_received(&self) -> u64 {
        self.received.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_rejected(&self) -> u64 {
        self.rejected.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let published = METER.get_reset_published();
            let received = METER.get_reset_received();
            let rejected = METER.get_reset_rejected();
            let elapsed = start.elapsed().as_secs_f32();

            if published > 0 {
                let rate = published as f32 / elapsed;
                log::info!("Published messages per second: {rate:.2}")
            }
            if received > 0 {
                let rate = received as f32 / elapsed;
                log::info!("Received messages per second: {rate:.2}")
            }
            if rejected > 0 {
                log::info!("Rejected {rejected} predictions in the last {elapsed:.1}s")
            }
        }
    })
}
