use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use voyage_catalog::Package;

use crate::error::ReservationError;
use crate::lifecycle::CancelOrigin;
use crate::models::{Booking, Payment, WaitingListEntry};
use crate::policy::BookingPolicy;
use crate::waitlist::WaitingList;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A business rule re-checked inside the unit of work failed.
    #[error(transparent)]
    Rejected(#[from] ReservationError),

    /// Concurrent writers collided; the whole unit may be retried.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Booking reference already taken: {0}")]
    ReferenceTaken(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(e) => e,
            StoreError::Conflict(_) => ReservationError::TransactionConflict,
            StoreError::ReferenceTaken(reference) => {
                ReservationError::Storage(format!("booking reference {reference} collided repeatedly"))
            }
            StoreError::Backend(msg) => ReservationError::Storage(msg),
        }
    }
}

/// Input to the admission unit of work. `booking` is the Pending record to persist.
#[derive(Debug, Clone)]
pub struct Admission {
    pub booking: Booking,
    pub policy: BookingPolicy,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    pub booking_id: Uuid,
    pub reason: Option<String>,
    pub origin: CancelOrigin,
    pub policy: BookingPolicy,
    pub now: DateTime<Utc>,
}

/// A waiting-list entry notified inside a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub entry: WaitingListEntry,
    pub expires_at: DateTime<Utc>,
}

impl Promotion {
    pub fn new(entry: WaitingListEntry, policy: &BookingPolicy) -> Self {
        let notified = entry.date_notified.unwrap_or(entry.date_added);
        Self {
            expires_at: notified + policy.hold_window(),
            entry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub promotions: Vec<Promotion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementDecision {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub payment_id: Uuid,
    pub decision: SettlementDecision,
    pub policy: BookingPolicy,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Refund {
    pub payment_id: Uuid,
    pub reason: Option<String>,
    pub policy: BookingPolicy,
    pub now: DateTime<Utc>,
}

/// Result of a payment transition and the booking transitions it drove.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub payment: Payment,
    /// Bookings that changed state in this unit of work.
    pub bookings: Vec<Booking>,
    pub promotions: Vec<Promotion>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpirySweep {
    pub expired: Vec<WaitingListEntry>,
    pub promotions: Vec<Promotion>,
}

/// Persistence seam of the reservation engine.
///
/// Every method that mutates state is one atomic unit of work: either all of its effects
/// (ledger, booking, payment, waiting list) are committed or none are. Business rules that
/// depend on shared state are re-validated inside the unit and reported as
/// [`StoreError::Rejected`].
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn package(&self, package_id: Uuid) -> StoreResult<Option<Package>>;

    async fn booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// Pending + Confirmed bookings owned by the user.
    async fn count_active_bookings(&self, user_id: Uuid) -> StoreResult<u32>;

    async fn live_booking(&self, user_id: Uuid, package_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn waiting_list(&self, package_id: Uuid) -> StoreResult<WaitingList>;

    async fn payment(&self, payment_id: Uuid) -> StoreResult<Option<Payment>>;

    /// Cap + duplicate re-check, ledger reservation (with the front-of-queue override),
    /// booking insert and removal of the user's waiting-list entry.
    async fn admit(&self, admission: Admission) -> StoreResult<Booking>;

    async fn confirm_booking(&self, booking_id: Uuid, now: DateTime<Utc>) -> StoreResult<Booking>;

    async fn complete_booking(&self, booking_id: Uuid) -> StoreResult<Booking>;

    /// State transition, ledger release and waiting-list promotion.
    async fn cancel_booking(&self, cancellation: Cancellation) -> StoreResult<CancellationOutcome>;

    async fn join_waiting_list(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        rooms: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<WaitingListEntry>;

    async fn leave_waiting_list(&self, user_id: Uuid, package_id: Uuid) -> StoreResult<bool>;

    /// Persist a Pending payment after checking its bookings are payable.
    async fn create_payment(&self, payment: Payment) -> StoreResult<Payment>;

    /// Move a Pending payment to Processing. Fails with an invalid transition when another
    /// caller already holds the claim.
    async fn claim_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> StoreResult<Payment>;

    /// Return a Processing payment to Pending so it can be retried.
    async fn release_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> StoreResult<Payment>;

    /// Complete or fail a Processing payment and confirm or cancel its Pending bookings.
    async fn settle_payment(&self, settlement: PaymentSettlement) -> StoreResult<SettlementOutcome>;

    /// Refund a Completed payment and cancel its live bookings, bypassing the cutoff.
    async fn refund_payment(&self, refund: Refund) -> StoreResult<SettlementOutcome>;

    /// Retire lapsed holds and re-run promotion on the affected packages.
    async fn expire_holds(&self, policy: BookingPolicy, now: DateTime<Utc>) -> StoreResult<ExpirySweep>;
}
