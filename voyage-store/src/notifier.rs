use async_trait::async_trait;
use serde::Serialize;
use voyage_core::{CoreError, CoreResult, Notifier};
use voyage_shared::{BookingCancelledEvent, BookingConfirmedEvent, Notification, WaitlistSlotAvailableEvent};

use crate::events::EventProducer;

/// Hands notifications to the mail service through Kafka.
#[derive(Clone)]
pub struct KafkaNotifier {
    producer: EventProducer,
}

#[derive(Serialize)]
struct Envelope<'a> {
    email: &'a str,
    notification: &'a Notification,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }

    async fn dispatch(&self, email: &str, notification: Notification) -> CoreResult<()> {
        let payload = serde_json::to_string(&Envelope {
            email,
            notification: &notification,
        })
        .map_err(|e| CoreError::InternalError(e.to_string()))?;

        self.producer
            .publish_notification(&payload, &notification)
            .await
            .map_err(|e| CoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify_confirmed(&self, email: &str, event: &BookingConfirmedEvent) -> CoreResult<()> {
        self.dispatch(email, Notification::BookingConfirmed(event.clone())).await
    }

    async fn notify_cancelled(&self, email: &str, event: &BookingCancelledEvent) -> CoreResult<()> {
        self.dispatch(email, Notification::BookingCancelled(event.clone())).await
    }

    async fn notify_waitlist_available(
        &self,
        email: &str,
        event: &WaitlistSlotAvailableEvent,
    ) -> CoreResult<()> {
        self.dispatch(email, Notification::WaitlistSlotAvailable(event.clone())).await
    }
}
