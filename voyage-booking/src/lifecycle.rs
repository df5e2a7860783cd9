//! Booking and payment state machines.
//!
//! Transitions mutate the record in place and leave it untouched on rejection. Stores call
//! them inside their atomic units of work so the same rules apply to every backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReservationError;
use crate::models::{Booking, BookingStatus, Payment, PaymentStatus};
use crate::policy::BookingPolicy;

/// Who asked for a cancellation. Only travelers are bound by the cutoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelOrigin {
    User,
    Refund,
    PaymentFailure,
}

impl CancelOrigin {
    pub fn enforces_cutoff(self) -> bool {
        matches!(self, CancelOrigin::User)
    }
}

/// Pending → Confirmed
pub fn confirm(booking: &mut Booking, now: DateTime<Utc>) -> Result<(), ReservationError> {
    if booking.status != BookingStatus::Pending {
        return Err(ReservationError::transition(booking.status, BookingStatus::Confirmed));
    }
    booking.status = BookingStatus::Confirmed;
    booking.confirmed_at = Some(now);
    Ok(())
}

/// Pending | Confirmed → Cancelled
///
/// The caller releases `booking.number_of_rooms` back to the ledger when this returns `Ok`.
pub fn cancel(
    booking: &mut Booking,
    trip_start: DateTime<Utc>,
    origin: CancelOrigin,
    reason: Option<String>,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> Result<(), ReservationError> {
    if booking.status.is_terminal() {
        return Err(ReservationError::transition(booking.status, BookingStatus::Cancelled));
    }
    if origin.enforces_cutoff() {
        policy.ensure_cancellable(trip_start, now)?;
    }
    booking.status = BookingStatus::Cancelled;
    booking.cancelled_at = Some(now);
    booking.cancellation_reason = reason;
    Ok(())
}

/// Confirmed → Completed (post-trip housekeeping)
pub fn complete(booking: &mut Booking) -> Result<(), ReservationError> {
    if booking.status != BookingStatus::Confirmed {
        return Err(ReservationError::transition(booking.status, BookingStatus::Completed));
    }
    booking.status = BookingStatus::Completed;
    Ok(())
}

/// Pending → Processing. Only the caller holding the claim may talk to the authorizer.
pub fn claim_payment(payment: &mut Payment, now: DateTime<Utc>) -> Result<(), ReservationError> {
    if payment.status != PaymentStatus::Pending {
        return Err(ReservationError::transition(payment.status, PaymentStatus::Processing));
    }
    payment.status = PaymentStatus::Processing;
    payment.updated_at = now;
    Ok(())
}

/// Processing → Pending, after the authorizer could not be reached.
pub fn release_payment(payment: &mut Payment, now: DateTime<Utc>) -> Result<(), ReservationError> {
    if payment.status != PaymentStatus::Processing {
        return Err(ReservationError::transition(payment.status, PaymentStatus::Pending));
    }
    payment.status = PaymentStatus::Pending;
    payment.updated_at = now;
    Ok(())
}

/// Processing → Completed
pub fn complete_payment(
    payment: &mut Payment,
    transaction_id: String,
    now: DateTime<Utc>,
) -> Result<(), ReservationError> {
    if payment.status != PaymentStatus::Processing {
        return Err(ReservationError::transition(payment.status, PaymentStatus::Completed));
    }
    payment.status = PaymentStatus::Completed;
    payment.transaction_id = Some(transaction_id);
    payment.failure_reason = None;
    payment.updated_at = now;
    Ok(())
}

/// Processing → Failed
pub fn fail_payment(payment: &mut Payment, reason: String, now: DateTime<Utc>) -> Result<(), ReservationError> {
    if payment.status != PaymentStatus::Processing {
        return Err(ReservationError::transition(payment.status, PaymentStatus::Failed));
    }
    payment.status = PaymentStatus::Failed;
    payment.failure_reason = Some(reason);
    payment.updated_at = now;
    Ok(())
}

/// Completed → Refunded
pub fn refund_payment(payment: &mut Payment, now: DateTime<Utc>) -> Result<(), ReservationError> {
    if payment.status != PaymentStatus::Completed {
        return Err(ReservationError::transition(payment.status, PaymentStatus::Refunded));
    }
    payment.status = PaymentStatus::Refunded;
    payment.updated_at = now;
    Ok(())
}

/// Bookings a new payment may cover: all Pending, one owner, none already paid for.
pub fn ensure_payable(bookings: &[Booking], has_live_payment: bool) -> Result<(), ReservationError> {
    let first = bookings
        .first()
        .ok_or_else(|| ReservationError::InvalidRequest("payment must cover at least one booking".to_string()))?;

    if bookings.iter().any(|b| b.user_id != first.user_id) {
        return Err(ReservationError::InvalidRequest(
            "bookings in one payment must share an owner".to_string(),
        ));
    }
    if let Some(booking) = bookings.iter().find(|b| b.status != BookingStatus::Pending) {
        return Err(ReservationError::transition(booking.status, "PAYMENT_PENDING"));
    }
    if has_live_payment {
        return Err(ReservationError::InvalidRequest(
            "a live payment already exists for one of the bookings".to_string(),
        ));
    }
    Ok(())
}
