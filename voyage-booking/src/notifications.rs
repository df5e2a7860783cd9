use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use voyage_core::{Notifier, UserDirectory};
use voyage_shared::{
    BookingCancelledEvent, BookingConfirmedEvent, Notification, WaitlistSlotAvailableEvent,
};

use crate::models::Booking;
use crate::repository::Promotion;

/// Post-commit queue of outbound notifications.
///
/// Enqueueing never blocks and never fails the caller; delivery happens on the worker task.
#[derive(Clone)]
pub struct NotificationOutbox {
    sender: UnboundedSender<Notification>,
}

impl NotificationOutbox {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, notification: Notification) {
        let key = notification.dedup_key();
        if self.sender.send(notification).is_err() {
            warn!("Notification worker is gone, dropping {}", key);
        }
    }

    pub fn booking_confirmed(&self, booking: &Booking) {
        let Some(confirmed_at) = booking.confirmed_at else {
            return;
        };
        self.enqueue(Notification::BookingConfirmed(BookingConfirmedEvent {
            booking_id: booking.id,
            booking_reference: booking.booking_reference.clone(),
            user_id: booking.user_id,
            package_id: booking.package_id,
            number_of_rooms: booking.number_of_rooms,
            total_price_cents: booking.total_price_cents,
            confirmed_at,
        }));
    }

    pub fn booking_cancelled(&self, booking: &Booking) {
        let Some(cancelled_at) = booking.cancelled_at else {
            return;
        };
        self.enqueue(Notification::BookingCancelled(BookingCancelledEvent {
            booking_id: booking.id,
            booking_reference: booking.booking_reference.clone(),
            user_id: booking.user_id,
            package_id: booking.package_id,
            number_of_rooms: booking.number_of_rooms,
            reason: booking.cancellation_reason.clone(),
            cancelled_at,
        }));
    }

    pub fn waitlist_available(&self, promotion: &Promotion) {
        let entry = &promotion.entry;
        self.enqueue(Notification::WaitlistSlotAvailable(WaitlistSlotAvailableEvent {
            entry_id: entry.id,
            user_id: entry.user_id,
            package_id: entry.package_id,
            number_of_rooms: entry.number_of_rooms,
            notified_at: entry.date_notified.unwrap_or(entry.date_added),
            expires_at: promotion.expires_at,
        }));
    }

    pub fn waitlist_promotions(&self, promotions: &[Promotion]) {
        for promotion in promotions {
            info!(
                "Waiting-list entry {} for user {} promoted on package {}, hold until {}",
                promotion.entry.id, promotion.entry.user_id, promotion.entry.package_id, promotion.expires_at
            );
            self.waitlist_available(promotion);
        }
    }
}

/// Drains the outbox: resolves each recipient's address and hands the message to the notifier.
pub struct NotificationWorker {
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn UserDirectory>,
}

impl NotificationWorker {
    pub fn new(notifier: Arc<dyn Notifier>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { notifier, directory }
    }

    /// Runs until every outbox handle has been dropped.
    pub async fn run(self, mut receiver: UnboundedReceiver<Notification>) {
        debug!("Notification worker started");
        while let Some(notification) = receiver.recv().await {
            self.deliver(&notification).await;
        }
        debug!("Notification worker stopped");
    }

    /// Failures are logged and dropped.
    pub async fn deliver(&self, notification: &Notification) {
        let recipient = notification.recipient();
        let email = match self.directory.email_for(recipient).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                warn!("No contact address for user {}, dropping {}", recipient, notification.dedup_key());
                return;
            }
            Err(e) => {
                error!("Failed to resolve contact for user {}: {}", recipient, e);
                return;
            }
        };

        if let Err(e) = self.notifier.send(&email, notification).await {
            error!("Failed to send {}: {}", notification.dedup_key(), e);
        }
    }
}
