use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;
use voyage_booking::{HoldExpirySweeper, NotificationWorker, ReservationCoordinator};
use voyage_core::{Notifier, UserDirectory};
use voyage_shared::Notification;

pub fn start_hold_expiry_sweeper(coordinator: ReservationCoordinator, interval_seconds: u64) -> JoinHandle<()> {
    let sweeper = HoldExpirySweeper::new(coordinator, Duration::from_secs(interval_seconds.max(1)));
    tokio::spawn(sweeper.run())
}

pub fn start_notification_worker(
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn UserDirectory>,
    receiver: UnboundedReceiver<Notification>,
) -> JoinHandle<()> {
    info!("Notification worker started");
    tokio::spawn(NotificationWorker::new(notifier, directory).run(receiver))
}
