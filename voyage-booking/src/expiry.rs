use chrono::Utc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::coordinator::ReservationCoordinator;

/// Periodically retires lapsed waiting-list holds so the next entry gets its turn.
pub struct HoldExpirySweeper {
    coordinator: ReservationCoordinator,
    period: Duration,
}

impl HoldExpirySweeper {
    pub fn new(coordinator: ReservationCoordinator, period: Duration) -> Self {
        Self { coordinator, period }
    }

    /// Never returns; run it on its own task.
    pub async fn run(self) {
        info!("Hold expiry sweeper started, every {:?}", self.period);
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// One pass. Returns how many holds were retired.
    pub async fn sweep_once(&self) -> usize {
        match self.coordinator.expire_holds(Utc::now()).await {
            Ok(sweep) => sweep.expired.len(),
            Err(e) => {
                error!("Hold expiry sweep failed: {}", e);
                0
            }
        }
    }
}
