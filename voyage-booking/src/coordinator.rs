use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ReservationError;
use crate::lifecycle::CancelOrigin;
use crate::models::Booking;
use crate::notifications::NotificationOutbox;
use crate::policy::{generate_reference, BookingPolicy};
use crate::repository::{Admission, Cancellation, ExpirySweep, ReservationStore};
use crate::retry::retry_on_conflict;

/// A user's view of one package's waiting list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WaitlistStatus {
    pub package_id: Uuid,
    pub position: Option<u32>,
    pub queue_length: usize,
    pub is_user_next: bool,
    pub is_notified: bool,
    /// Set while the user's promotion hold is open.
    pub hold_expires_at: Option<DateTime<Utc>>,
}

/// Entry point for admission, booking transitions and the waiting list.
///
/// Pre-checks here give fast, typed rejections; the store re-validates everything inside
/// its unit of work and is the authority under concurrency.
#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn ReservationStore>,
    policy: BookingPolicy,
    outbox: NotificationOutbox,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn ReservationStore>, policy: BookingPolicy, outbox: NotificationOutbox) -> Self {
        Self { store, policy, outbox }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    pub fn outbox(&self) -> &NotificationOutbox {
        &self.outbox
    }

    /// Admit a Pending booking, reserving `rooms` on the package ledger.
    pub async fn create_booking(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rooms: u32,
        guests: u32,
    ) -> Result<Booking, ReservationError> {
        let result = self.admit(user_id, package_id, rooms, guests).await;
        match &result {
            Ok(booking) => info!(
                "Booking {} created for user {} on package {} ({} room(s))",
                booking.booking_reference, user_id, package_id, rooms
            ),
            Err(e) => log_rejection("create_booking", e),
        }
        result
    }

    async fn admit(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rooms: u32,
        guests: u32,
    ) -> Result<Booking, ReservationError> {
        if rooms == 0 || guests == 0 {
            return Err(ReservationError::InvalidRequest(
                "a booking needs at least one room and one guest".to_string(),
            ));
        }
        let now = Utc::now();

        let package = self
            .store
            .package(package_id)
            .await?
            .ok_or_else(|| ReservationError::not_found("package", package_id))?;
        self.policy.ensure_bookable(&package, now)?;

        let active = self.store.count_active_bookings(user_id).await?;
        self.policy.ensure_below_cap(active, 1)?;

        if self.store.live_booking(user_id, package_id).await?.is_some() {
            return Err(ReservationError::DuplicateBooking(package_id));
        }

        let total_price_cents = package.quote(rooms, now).total_cents;
        let policy = self.policy;
        let booking = retry_on_conflict(policy.max_conflict_retries, "create_booking", || {
            let store = self.store.clone();
            let booking = Booking::new(
                user_id,
                package_id,
                rooms,
                guests,
                total_price_cents,
                generate_reference(now),
                now,
            );
            async move { store.admit(Admission { booking, policy, now }).await }
        })
        .await?;
        Ok(booking)
    }

    /// Pending → Confirmed.
    pub async fn confirm_booking(&self, booking_id: Uuid) -> Result<Booking, ReservationError> {
        let now = Utc::now();
        let result = retry_on_conflict(self.policy.max_conflict_retries, "confirm_booking", || {
            let store = self.store.clone();
            async move { store.confirm_booking(booking_id, now).await }
        })
        .await
        .map_err(ReservationError::from);

        match &result {
            Ok(booking) => {
                info!("Booking {} confirmed", booking.booking_reference);
                self.outbox.booking_confirmed(booking);
            }
            Err(e) => log_rejection("confirm_booking", e),
        }
        result
    }

    /// Confirmed → Completed.
    pub async fn complete_booking(&self, booking_id: Uuid) -> Result<Booking, ReservationError> {
        let result = retry_on_conflict(self.policy.max_conflict_retries, "complete_booking", || {
            let store = self.store.clone();
            async move { store.complete_booking(booking_id).await }
        })
        .await
        .map_err(ReservationError::from);

        match &result {
            Ok(booking) => info!("Booking {} completed", booking.booking_reference),
            Err(e) => log_rejection("complete_booking", e),
        }
        result
    }

    /// User-initiated cancellation, bound by the cancellation cutoff.
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> Result<Booking, ReservationError> {
        let cancellation = Cancellation {
            booking_id,
            reason,
            origin: CancelOrigin::User,
            policy: self.policy,
            now: Utc::now(),
        };
        let result = retry_on_conflict(self.policy.max_conflict_retries, "cancel_booking", || {
            let store = self.store.clone();
            let cancellation = cancellation.clone();
            async move { store.cancel_booking(cancellation).await }
        })
        .await
        .map_err(ReservationError::from);

        match result {
            Ok(outcome) => {
                info!(
                    "Booking {} cancelled, {} room(s) released",
                    outcome.booking.booking_reference, outcome.booking.number_of_rooms
                );
                self.outbox.booking_cancelled(&outcome.booking);
                self.outbox.waitlist_promotions(&outcome.promotions);
                Ok(outcome.booking)
            }
            Err(e) => {
                log_rejection("cancel_booking", &e);
                Err(e)
            }
        }
    }

    /// Queue the user for the package. Returns the 1-based position.
    pub async fn join_waiting_list(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rooms: u32,
    ) -> Result<u32, ReservationError> {
        let now = Utc::now();
        let result = retry_on_conflict(self.policy.max_conflict_retries, "join_waiting_list", || {
            let store = self.store.clone();
            async move { store.join_waiting_list(user_id, package_id, rooms, now).await }
        })
        .await
        .map_err(ReservationError::from);

        match result {
            Ok(entry) => {
                info!(
                    "User {} joined waiting list of package {} at position {}",
                    user_id, package_id, entry.position
                );
                Ok(entry.position)
            }
            Err(e) => {
                log_rejection("join_waiting_list", &e);
                Err(e)
            }
        }
    }

    /// `false` when the user was not queued.
    pub async fn leave_waiting_list(&self, user_id: Uuid, package_id: Uuid) -> Result<bool, ReservationError> {
        let removed = retry_on_conflict(self.policy.max_conflict_retries, "leave_waiting_list", || {
            let store = self.store.clone();
            async move { store.leave_waiting_list(user_id, package_id).await }
        })
        .await?;

        if removed {
            info!("User {} left waiting list of package {}", user_id, package_id);
        }
        Ok(removed)
    }

    pub async fn waitlist_status(&self, user_id: Uuid, package_id: Uuid) -> Result<WaitlistStatus, ReservationError> {
        let queue = self.store.waiting_list(package_id).await?;
        let entry = queue.entry_for(user_id);
        let window = self.policy.hold_window();
        let now = Utc::now();

        Ok(WaitlistStatus {
            package_id,
            position: entry.map(|e| e.position),
            queue_length: queue.len(),
            is_user_next: queue.is_user_next(user_id, now, window),
            is_notified: entry.is_some_and(|e| e.is_notified),
            hold_expires_at: entry
                .filter(|e| e.holds_rooms(now, window))
                .and_then(|e| e.hold_expires_at(window)),
        })
    }

    pub async fn is_user_next(&self, user_id: Uuid, package_id: Uuid) -> Result<bool, ReservationError> {
        let queue = self.store.waiting_list(package_id).await?;
        Ok(queue.is_user_next(user_id, Utc::now(), self.policy.hold_window()))
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, ReservationError> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| ReservationError::not_found("booking", booking_id))
    }

    pub async fn list_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, ReservationError> {
        Ok(self.store.bookings_for_user(user_id).await?)
    }

    pub async fn active_booking_count(&self, user_id: Uuid) -> Result<u32, ReservationError> {
        Ok(self.store.count_active_bookings(user_id).await?)
    }

    /// Retire lapsed waiting-list holds and notify whoever moves into capacity.
    pub async fn expire_holds(&self, now: DateTime<Utc>) -> Result<ExpirySweep, ReservationError> {
        let policy = self.policy;
        let sweep = retry_on_conflict(policy.max_conflict_retries, "expire_holds", || {
            let store = self.store.clone();
            async move { store.expire_holds(policy, now).await }
        })
        .await?;

        if !sweep.expired.is_empty() {
            info!(
                "Expired {} waiting-list hold(s), promoted {} entr(ies)",
                sweep.expired.len(),
                sweep.promotions.len()
            );
        }
        self.outbox.waitlist_promotions(&sweep.promotions);
        Ok(sweep)
    }
}

pub(crate) fn log_rejection(operation: &str, err: &ReservationError) {
    match err {
        ReservationError::Storage(_) | ReservationError::Upstream(_) => {
            error!("{} failed: {}", operation, err)
        }
        _ => warn!("{} rejected: {}", operation, err),
    }
}
