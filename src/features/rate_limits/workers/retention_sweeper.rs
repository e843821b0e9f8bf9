use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::features::rate_limits::services::ActivityRetentionService;

/// Background worker that purges expired activity records on a fixed interval
pub struct RetentionSweeper {
    service: Arc<ActivityRetentionService>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(service: Arc<ActivityRetentionService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run the sweeper in a background loop. The first sweep runs immediately.
    pub async fn run(&self) {
        tracing::info!(
            "Starting activity retention worker (every {:?}, keeping {} days)",
            self.interval,
            self.service.default_days()
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.service.sweep(None).await {
            tracing::error!("Activity retention sweep failed: {:?}", e);
        }
    }
}
