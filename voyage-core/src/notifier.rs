use async_trait::async_trait;
use tokio::sync::Mutex;
use voyage_shared::{
    BookingCancelledEvent, BookingConfirmedEvent, Masked, Notification, WaitlistSlotAvailableEvent,
};

use crate::CoreResult;

/// Outbound messaging collaborator (email, push, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_confirmed(&self, email: &str, event: &BookingConfirmedEvent) -> CoreResult<()>;

    async fn notify_cancelled(&self, email: &str, event: &BookingCancelledEvent) -> CoreResult<()>;

    async fn notify_waitlist_available(
        &self,
        email: &str,
        event: &WaitlistSlotAvailableEvent,
    ) -> CoreResult<()>;

    /// Route a notification to the matching method.
    async fn send(&self, email: &str, notification: &Notification) -> CoreResult<()> {
        match notification {
            Notification::BookingConfirmed(e) => self.notify_confirmed(email, e).await,
            Notification::BookingCancelled(e) => self.notify_cancelled(email, e).await,
            Notification::WaitlistSlotAvailable(e) => self.notify_waitlist_available(email, e).await,
        }
    }
}

/// Writes every notification to the log. Used when no broker is configured.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_confirmed(&self, email: &str, event: &BookingConfirmedEvent) -> CoreResult<()> {
        tracing::info!(
            "Booking {} confirmed, notifying {}",
            event.booking_reference,
            Masked::new(email)
        );
        Ok(())
    }

    async fn notify_cancelled(&self, email: &str, event: &BookingCancelledEvent) -> CoreResult<()> {
        tracing::info!(
            "Booking {} cancelled, notifying {}",
            event.booking_reference,
            Masked::new(email)
        );
        Ok(())
    }

    async fn notify_waitlist_available(
        &self,
        email: &str,
        event: &WaitlistSlotAvailableEvent,
    ) -> CoreResult<()> {
        tracing::info!(
            "{} room(s) available on package {} until {}, notifying {}",
            event.number_of_rooms,
            event.package_id,
            event.expires_at,
            Masked::new(email)
        );
        Ok(())
    }
}

/// Keeps every delivered notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_confirmed(&self, email: &str, event: &BookingConfirmedEvent) -> CoreResult<()> {
        self.sent
            .lock()
            .await
            .push((email.to_string(), Notification::BookingConfirmed(event.clone())));
        Ok(())
    }

    async fn notify_cancelled(&self, email: &str, event: &BookingCancelledEvent) -> CoreResult<()> {
        self.sent
            .lock()
            .await
            .push((email.to_string(), Notification::BookingCancelled(event.clone())));
        Ok(())
    }

    async fn notify_waitlist_available(
        &self,
        email: &str,
        event: &WaitlistSlotAvailableEvent,
    ) -> CoreResult<()> {
        self.sent
            .lock()
            .await
            .push((email.to_string(), Notification::WaitlistSlotAvailable(event.clone())));
        Ok(())
    }
}
