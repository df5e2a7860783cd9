use uuid::Uuid;

/// Typed outcome of every rejected reservation operation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReservationError {
    #[error("Package unavailable: {0}")]
    PackageUnavailable(String),

    #[error("Booking limit exceeded: {active} active booking(s), limit {limit}")]
    BookingLimitExceeded { active: u32, limit: u32 },

    #[error("User already has a live booking for package {0}")]
    DuplicateBooking(Uuid),

    #[error("Package {0} is fully booked; join the waiting list instead")]
    FullyBooked(Uuid),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Cancellation window expired: trip starts in {days_left} day(s), cutoff is {cutoff_days}")]
    CancellationWindowExpired { days_left: i64, cutoff_days: i64 },

    #[error("Transaction conflict, retry the request")]
    TransactionConflict,

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("User is already on the waiting list for package {0}")]
    AlreadyQueued(Uuid),

    #[error("User already holds a booking for package {0}")]
    AlreadyBooked(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Payment authorizer unavailable: {0}")]
    Upstream(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl ReservationError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        ReservationError::NotFound { kind, id }
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        ReservationError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable identifier for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::PackageUnavailable(_) => "PACKAGE_UNAVAILABLE",
            ReservationError::BookingLimitExceeded { .. } => "BOOKING_LIMIT_EXCEEDED",
            ReservationError::DuplicateBooking(_) => "DUPLICATE_BOOKING",
            ReservationError::FullyBooked(_) => "FULLY_BOOKED",
            ReservationError::NotFound { .. } => "NOT_FOUND",
            ReservationError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            ReservationError::CancellationWindowExpired { .. } => "CANCELLATION_WINDOW_EXPIRED",
            ReservationError::TransactionConflict => "TRANSACTION_CONFLICT",
            ReservationError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            ReservationError::AlreadyQueued(_) => "ALREADY_QUEUED",
            ReservationError::AlreadyBooked(_) => "ALREADY_BOOKED",
            ReservationError::InvalidRequest(_) => "INVALID_REQUEST",
            ReservationError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            ReservationError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// Only ledger contention is worth retrying with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationError::TransactionConflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(ReservationError::TransactionConflict.is_retryable());
        assert!(!ReservationError::FullyBooked(Uuid::new_v4()).is_retryable());
        assert!(!ReservationError::Storage("disk".to_string()).is_retryable());
    }

    #[test]
    fn test_messages_are_caller_readable() {
        let err = ReservationError::BookingLimitExceeded { active: 3, limit: 3 };
        assert_eq!(err.to_string(), "Booking limit exceeded: 3 active booking(s), limit 3");
    }
}
