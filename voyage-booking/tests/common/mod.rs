#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;
use voyage_booking::{
    BookingPolicy, CheckoutAggregator, InMemoryReservationStore, NotificationOutbox, PaymentOrchestrator,
    ReservationCoordinator,
};
use voyage_catalog::Package;
use voyage_core::{MockPaymentAuthorizer, PaymentAuthorizer, PaymentInstrument};
use voyage_shared::{Masked, Notification};

pub struct Harness {
    pub store: Arc<InMemoryReservationStore>,
    pub coordinator: ReservationCoordinator,
    pub payments: PaymentOrchestrator,
    pub checkout: CheckoutAggregator,
    pub notifications: UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(BookingPolicy::default())
    }

    pub fn with_policy(policy: BookingPolicy) -> Self {
        Self::with_authorizer(policy, Arc::new(MockPaymentAuthorizer))
    }

    pub fn with_authorizer(policy: BookingPolicy, authorizer: Arc<dyn PaymentAuthorizer>) -> Self {
        let store = Arc::new(InMemoryReservationStore::new());
        let (outbox, notifications) = NotificationOutbox::channel();
        let coordinator = ReservationCoordinator::new(store.clone(), policy, outbox.clone());
        let payments = PaymentOrchestrator::new(store.clone(), authorizer, policy, outbox);
        let checkout = CheckoutAggregator::new(coordinator.clone(), payments.clone());
        Self {
            store,
            coordinator,
            payments,
            checkout,
            notifications,
        }
    }

    /// Active package with `rooms` free, starting `starts_in` from now.
    pub async fn package(&self, rooms: u32, starts_in: Duration) -> Package {
        let package = Package::new("Amalfi Coast Week", 120_000, rooms, Utc::now() + starts_in);
        self.store.insert_package(package.clone()).await;
        package
    }

    pub async fn available_rooms(&self, package_id: Uuid) -> u32 {
        self.store
            .ledger_entry(package_id)
            .await
            .map(|entry| entry.available_rooms)
            .unwrap_or_default()
    }

    /// Everything enqueued so far.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }
}

pub fn card(number: &str) -> PaymentInstrument {
    PaymentInstrument {
        card_number: Masked::new(number.to_string()),
        cvv: Masked::new("123".to_string()),
        expiry: Masked::new("12/30".to_string()),
        holder_name: Some(Masked::new("Test Traveler".to_string())),
    }
}

pub const APPROVED_CARD: &str = "4242424242424242";
pub const DECLINED_CARD: &str = "4000000000000002";
pub const OUTAGE_CARD: &str = "4000000000000119";
