use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;
use voyage_catalog::{InventoryLedger, LedgerEntry, LedgerError, Package};

use crate::error::ReservationError;
use crate::lifecycle::{self, CancelOrigin};
use crate::models::{Booking, BookingStatus, Payment, WaitingListEntry};
use crate::policy::BookingPolicy;
use crate::repository::{
    Admission, Cancellation, CancellationOutcome, ExpirySweep, PaymentSettlement, Promotion, Refund,
    ReservationStore, SettlementDecision, SettlementOutcome, StoreError, StoreResult,
};
use crate::waitlist::WaitingList;

#[derive(Clone, Default)]
struct MemoryState {
    packages: HashMap<Uuid, Package>,
    ledger: InventoryLedger,
    bookings: HashMap<Uuid, Booking>,
    references: HashSet<String>,
    payments: HashMap<Uuid, Payment>,
    waiting_lists: HashMap<Uuid, WaitingList>,
}

impl MemoryState {
    /// Package with `available_rooms` taken from the ledger.
    fn package_view(&self, package_id: Uuid) -> Option<Package> {
        let mut package = self.packages.get(&package_id)?.clone();
        if let Some(available) = self.ledger.available(&package_id) {
            package.available_rooms = available;
        }
        Some(package)
    }

    fn active_count(&self, user_id: Uuid) -> u32 {
        self.bookings
            .values()
            .filter(|b| b.user_id == user_id && b.is_live())
            .count() as u32
    }

    fn live_booking(&self, user_id: Uuid, package_id: Uuid) -> Option<&Booking> {
        self.bookings
            .values()
            .find(|b| b.user_id == user_id && b.package_id == package_id && b.is_live())
    }

    fn promote(&mut self, package_id: Uuid, policy: &BookingPolicy, now: DateTime<Utc>) -> Vec<Promotion> {
        let Some(available) = self.ledger.available(&package_id) else {
            return Vec::new();
        };
        let Some(queue) = self.waiting_lists.get_mut(&package_id) else {
            return Vec::new();
        };
        queue
            .promote_all(available, now, policy.hold_window())
            .into_iter()
            .map(|entry| Promotion::new(entry, policy))
            .collect()
    }

    fn cancel(
        &mut self,
        booking_id: Uuid,
        origin: CancelOrigin,
        reason: Option<String>,
        policy: &BookingPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<CancellationOutcome> {
        let mut booking = self
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found("booking", booking_id))?;
        let trip_start = self
            .packages
            .get(&booking.package_id)
            .map(|p| p.start_date)
            .ok_or_else(|| ReservationError::not_found("package", booking.package_id))?;

        lifecycle::cancel(&mut booking, trip_start, origin, reason, policy, now)?;
        self.ledger
            .release(&booking.package_id, booking.number_of_rooms)
            .map_err(ledger_error)?;
        self.bookings.insert(booking.id, booking.clone());

        let promotions = self.promote(booking.package_id, policy, now);
        Ok(CancellationOutcome { booking, promotions })
    }

    fn payment_bookings(&self, payment: &Payment) -> StoreResult<Vec<Booking>> {
        payment
            .booking_ids
            .iter()
            .map(|id| {
                self.bookings
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::from(ReservationError::not_found("booking", *id)))
            })
            .collect()
    }
}

fn ledger_error(err: LedgerError) -> StoreError {
    match err {
        LedgerError::NotFound(id) => ReservationError::not_found("package", id).into(),
        LedgerError::InsufficientRooms { .. } => StoreError::Backend(err.to_string()),
    }
}

/// Reservation store kept entirely in process memory.
///
/// One lock guards all state, so each unit of work runs to completion before the next
/// starts. Used by tests and by the API when no database is configured.
#[derive(Default)]
pub struct InMemoryReservationStore {
    state: Mutex<MemoryState>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package and seed its ledger from `available_rooms`.
    pub async fn insert_package(&self, package: Package) {
        let mut state = self.state.lock().await;
        state
            .ledger
            .initialize(package.id, package.total_rooms, package.available_rooms);
        state.packages.insert(package.id, package);
    }

    pub async fn ledger_entry(&self, package_id: Uuid) -> Option<LedgerEntry> {
        self.state.lock().await.ledger.get(&package_id).cloned()
    }

    pub async fn all_bookings(&self) -> Vec<Booking> {
        self.state.lock().await.bookings.values().cloned().collect()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn package(&self, package_id: Uuid) -> StoreResult<Option<Package>> {
        Ok(self.state.lock().await.package_view(package_id))
    }

    async fn booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
        Ok(bookings)
    }

    async fn count_active_bookings(&self, user_id: Uuid) -> StoreResult<u32> {
        Ok(self.state.lock().await.active_count(user_id))
    }

    async fn live_booking(&self, user_id: Uuid, package_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.live_booking(user_id, package_id).cloned())
    }

    async fn waiting_list(&self, package_id: Uuid) -> StoreResult<WaitingList> {
        let state = self.state.lock().await;
        Ok(state
            .waiting_lists
            .get(&package_id)
            .cloned()
            .unwrap_or_else(|| WaitingList::new(package_id)))
    }

    async fn payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(&payment_id).cloned())
    }

    async fn admit(&self, admission: Admission) -> StoreResult<Booking> {
        let Admission { booking, policy, now } = admission;
        let mut state = self.state.lock().await;

        let package = state
            .package_view(booking.package_id)
            .ok_or_else(|| ReservationError::not_found("package", booking.package_id))?;
        policy.ensure_bookable(&package, now)?;
        policy.ensure_below_cap(state.active_count(booking.user_id), 1)?;
        if state.live_booking(booking.user_id, booking.package_id).is_some() {
            return Err(ReservationError::DuplicateBooking(booking.package_id).into());
        }
        if state.references.contains(&booking.booking_reference) {
            return Err(StoreError::ReferenceTaken(booking.booking_reference));
        }

        let window = policy.hold_window();
        let (held, own_hold) = state
            .waiting_lists
            .get(&booking.package_id)
            .map_or((0, 0), |queue| {
                (queue.held_rooms(now, window), queue.live_hold_for(booking.user_id, now, window))
            });

        match state.ledger.reserve(&booking.package_id, booking.number_of_rooms, held) {
            Ok(_) => {}
            Err(LedgerError::InsufficientRooms { .. }) if own_hold > 0 => {
                state
                    .ledger
                    .reserve(&booking.package_id, booking.number_of_rooms, held - own_hold)
                    .map_err(|_| ReservationError::FullyBooked(booking.package_id))?;
                tracing::info!(
                    "User {} booked package {} from their waiting-list hold",
                    booking.user_id,
                    booking.package_id
                );
            }
            Err(LedgerError::InsufficientRooms { .. }) => {
                return Err(ReservationError::FullyBooked(booking.package_id).into());
            }
            Err(err) => return Err(ledger_error(err)),
        }

        if let Some(queue) = state.waiting_lists.get_mut(&booking.package_id) {
            queue.leave(booking.user_id);
        }
        state.references.insert(booking.booking_reference.clone());
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn confirm_booking(&self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| ReservationError::not_found("booking", booking_id))?;
        lifecycle::confirm(booking, now)?;
        Ok(booking.clone())
    }

    async fn complete_booking(&self, booking_id: Uuid) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| ReservationError::not_found("booking", booking_id))?;
        lifecycle::complete(booking)?;
        Ok(booking.clone())
    }

    async fn cancel_booking(&self, cancellation: Cancellation) -> StoreResult<CancellationOutcome> {
        let mut state = self.state.lock().await;
        state.cancel(
            cancellation.booking_id,
            cancellation.origin,
            cancellation.reason,
            &cancellation.policy,
            cancellation.now,
        )
    }

    async fn join_waiting_list(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rooms: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<WaitingListEntry> {
        let mut state = self.state.lock().await;
        if !state.packages.contains_key(&package_id) {
            return Err(ReservationError::not_found("package", package_id).into());
        }
        let has_live_booking = state.live_booking(user_id, package_id).is_some();
        let queue = state
            .waiting_lists
            .entry(package_id)
            .or_insert_with(|| WaitingList::new(package_id));
        let entry = queue.join(user_id, rooms, has_live_booking, now)?;
        Ok(entry.clone())
    }

    async fn leave_waiting_list(&self, user_id: Uuid, package_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .waiting_lists
            .get_mut(&package_id)
            .and_then(|queue| queue.leave(user_id))
            .is_some())
    }

    async fn create_payment(&self, payment: Payment) -> StoreResult<Payment> {
        let mut state = self.state.lock().await;
        let bookings = state.payment_bookings(&payment)?;
        let has_live_payment = state
            .payments
            .values()
            .any(|p| p.status.is_live() && payment.booking_ids.iter().any(|id| p.covers(id)));
        lifecycle::ensure_payable(&bookings, has_live_payment)?;

        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn claim_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> StoreResult<Payment> {
        let mut state = self.state.lock().await;
        let payment = state
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| ReservationError::not_found("payment", payment_id))?;
        lifecycle::claim_payment(payment, now)?;
        Ok(payment.clone())
    }

    async fn release_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> StoreResult<Payment> {
        let mut state = self.state.lock().await;
        let payment = state
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| ReservationError::not_found("payment", payment_id))?;
        lifecycle::release_payment(payment, now)?;
        Ok(payment.clone())
    }

    async fn settle_payment(&self, settlement: PaymentSettlement) -> StoreResult<SettlementOutcome> {
        let PaymentSettlement { payment_id, decision, policy, now } = settlement;
        let mut state = self.state.lock().await;

        let mut payment = state
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found("payment", payment_id))?;
        let covered = state.payment_bookings(&payment)?;

        // Staged on a copy so a failure part way leaves the state untouched.
        let mut draft = state.clone();
        let mut bookings = Vec::new();
        let mut promotions = Vec::new();
        match decision {
            SettlementDecision::Approved { transaction_id } => {
                lifecycle::complete_payment(&mut payment, transaction_id, now)?;
                for mut booking in covered {
                    if booking.status != BookingStatus::Pending {
                        tracing::warn!(
                            "Booking {} is {} at payment {} approval, leaving it unchanged",
                            booking.id,
                            booking.status,
                            payment.id
                        );
                        continue;
                    }
                    lifecycle::confirm(&mut booking, now)?;
                    draft.bookings.insert(booking.id, booking.clone());
                    bookings.push(booking);
                }
            }
            SettlementDecision::Declined { reason } => {
                lifecycle::fail_payment(&mut payment, reason.clone(), now)?;
                for booking in covered {
                    if booking.status != BookingStatus::Pending {
                        tracing::warn!(
                            "Booking {} is {} at payment {} decline, leaving it unchanged",
                            booking.id,
                            booking.status,
                            payment.id
                        );
                        continue;
                    }
                    let outcome = draft.cancel(
                        booking.id,
                        CancelOrigin::PaymentFailure,
                        Some(format!("payment declined: {reason}")),
                        &policy,
                        now,
                    )?;
                    bookings.push(outcome.booking);
                    promotions.extend(outcome.promotions);
                }
            }
        }

        draft.payments.insert(payment.id, payment.clone());
        *state = draft;
        Ok(SettlementOutcome { payment, bookings, promotions })
    }

    async fn refund_payment(&self, refund: Refund) -> StoreResult<SettlementOutcome> {
        let Refund { payment_id, reason, policy, now } = refund;
        let mut state = self.state.lock().await;

        let mut payment = state
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found("payment", payment_id))?;
        let covered = state.payment_bookings(&payment)?;
        lifecycle::refund_payment(&mut payment, now)?;

        let mut draft = state.clone();
        let mut bookings = Vec::new();
        let mut promotions = Vec::new();
        for booking in covered.into_iter().filter(|b| b.is_live()) {
            let outcome = draft.cancel(booking.id, CancelOrigin::Refund, reason.clone(), &policy, now)?;
            bookings.push(outcome.booking);
            promotions.extend(outcome.promotions);
        }

        draft.payments.insert(payment.id, payment.clone());
        *state = draft;
        Ok(SettlementOutcome { payment, bookings, promotions })
    }

    async fn expire_holds(&self, policy: BookingPolicy, now: DateTime<Utc>) -> StoreResult<ExpirySweep> {
        let mut state = self.state.lock().await;
        let window = policy.hold_window();
        let mut sweep = ExpirySweep::default();

        let package_ids: Vec<Uuid> = state.waiting_lists.keys().copied().collect();
        for package_id in package_ids {
            let expired = match state.waiting_lists.get_mut(&package_id) {
                Some(queue) => queue.expire_holds(now, window),
                None => continue,
            };
            if expired.is_empty() {
                continue;
            }
            sweep.expired.extend(expired);
            sweep.promotions.extend(state.promote(package_id, &policy, now));
        }
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;
    use crate::policy::generate_reference;
    use chrono::Duration;

    async fn store_with_package(rooms: u32) -> (InMemoryReservationStore, Package) {
        let store = InMemoryReservationStore::new();
        let package = Package::new("Lisbon Getaway", 50_000, rooms, Utc::now() + Duration::days(30));
        store.insert_package(package.clone()).await;
        (store, package)
    }

    fn admission(user_id: Uuid, package_id: Uuid, rooms: u32) -> Admission {
        let now = Utc::now();
        Admission {
            booking: Booking::new(user_id, package_id, rooms, rooms, 50_000, generate_reference(now), now),
            policy: BookingPolicy::default(),
            now,
        }
    }

    #[tokio::test]
    async fn test_admit_reserves_ledger() {
        let (store, package) = store_with_package(3).await;

        let booking = store.admit(admission(Uuid::new_v4(), package.id, 2)).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(store.package(package.id).await.unwrap().unwrap().available_rooms, 1);

        let err = store.admit(admission(Uuid::new_v4(), package.id, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(ReservationError::FullyBooked(_))));
    }

    #[tokio::test]
    async fn test_reference_collision_is_reported() {
        let (store, package) = store_with_package(5).await;
        let first = admission(Uuid::new_v4(), package.id, 1);
        let mut second = admission(Uuid::new_v4(), package.id, 1);
        second.booking.booking_reference = first.booking.booking_reference.clone();

        store.admit(first).await.unwrap();
        assert!(matches!(store.admit(second).await, Err(StoreError::ReferenceTaken(_))));
        assert_eq!(store.ledger_entry(package.id).await.unwrap().available_rooms, 4);
    }

    #[tokio::test]
    async fn test_cancel_releases_once() {
        let (store, package) = store_with_package(2).await;
        let booking = store.admit(admission(Uuid::new_v4(), package.id, 2)).await.unwrap();

        let cancel = Cancellation {
            booking_id: booking.id,
            reason: None,
            origin: CancelOrigin::User,
            policy: BookingPolicy::default(),
            now: Utc::now(),
        };
        store.cancel_booking(cancel.clone()).await.unwrap();
        assert!(store.cancel_booking(cancel).await.is_err());
        assert_eq!(store.ledger_entry(package.id).await.unwrap().available_rooms, 2);
    }

    #[tokio::test]
    async fn test_join_requires_known_package() {
        let store = InMemoryReservationStore::new();
        let result = store
            .join_waiting_list(Uuid::new_v4(), Uuid::new_v4(), 1, Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Rejected(ReservationError::NotFound { kind: "package", .. }))
        ));
    }

    fn declined(payment_id: Uuid) -> PaymentSettlement {
        PaymentSettlement {
            payment_id,
            decision: SettlementDecision::Declined {
                reason: "card_declined".to_string(),
            },
            policy: BookingPolicy::default(),
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_payment_claim_is_taken_once() {
        let (store, package) = store_with_package(2).await;
        let booking = store.admit(admission(Uuid::new_v4(), package.id, 1)).await.unwrap();
        let payment = store
            .create_payment(Payment::new(vec![booking.id], 50_000, "USD".into(), "CARD".into(), Utc::now()))
            .await
            .unwrap();

        let claimed = store.claim_payment(payment.id, Utc::now()).await.unwrap();
        assert_eq!(claimed.status, PaymentStatus::Processing);
        assert!(matches!(
            store.claim_payment(payment.id, Utc::now()).await,
            Err(StoreError::Rejected(ReservationError::InvalidStateTransition { .. }))
        ));

        store.release_payment(payment.id, Utc::now()).await.unwrap();
        store.claim_payment(payment.id, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_decline_leaves_confirmed_booking() {
        let (store, package) = store_with_package(2).await;
        let booking = store.admit(admission(Uuid::new_v4(), package.id, 1)).await.unwrap();
        let payment = store
            .create_payment(Payment::new(vec![booking.id], 50_000, "USD".into(), "CARD".into(), Utc::now()))
            .await
            .unwrap();
        store.confirm_booking(booking.id, Utc::now()).await.unwrap();
        store.claim_payment(payment.id, Utc::now()).await.unwrap();

        let outcome = store.settle_payment(declined(payment.id)).await.unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Failed);
        assert!(outcome.bookings.is_empty());
        assert_eq!(
            store.booking(booking.id).await.unwrap().unwrap().status,
            BookingStatus::Confirmed
        );
        assert_eq!(store.ledger_entry(package.id).await.unwrap().available_rooms, 1);
    }

    #[tokio::test]
    async fn test_failed_decline_applies_nothing() {
        let (store, first_package) = store_with_package(2).await;
        let second_package = Package::new("Porto Weekend", 30_000, 2, Utc::now() + Duration::days(30));
        store.insert_package(second_package.clone()).await;

        let user = Uuid::new_v4();
        let first = store.admit(admission(user, first_package.id, 1)).await.unwrap();
        let second = store.admit(admission(user, second_package.id, 1)).await.unwrap();
        let payment = store
            .create_payment(Payment::new(
                vec![first.id, second.id],
                80_000,
                "USD".into(),
                "CARD".into(),
                Utc::now(),
            ))
            .await
            .unwrap();
        store.claim_payment(payment.id, Utc::now()).await.unwrap();

        // The second cancellation cannot find its package.
        store.state.lock().await.packages.remove(&second_package.id);

        let result = store.settle_payment(declined(payment.id)).await;
        assert!(matches!(
            result,
            Err(StoreError::Rejected(ReservationError::NotFound { kind: "package", .. }))
        ));
        assert_eq!(
            store.booking(first.id).await.unwrap().unwrap().status,
            BookingStatus::Pending
        );
        assert_eq!(store.ledger_entry(first_package.id).await.unwrap().available_rooms, 1);
        assert_eq!(
            store.payment(payment.id).await.unwrap().unwrap().status,
            PaymentStatus::Processing
        );
    }
}
