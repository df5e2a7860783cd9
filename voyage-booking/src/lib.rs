//! Reservation engine for fixed-date travel packages: admission against a finite room
//! ledger, per-package waiting lists, booking and payment lifecycles, and multi-package
//! checkout.

pub mod checkout;
pub mod coordinator;
pub mod error;
pub mod expiry;
pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod policy;
pub mod repository;
pub mod retry;
pub mod waitlist;

pub use checkout::{CartLine, CheckoutAggregator, CheckoutResult, FailedLine};
pub use coordinator::{ReservationCoordinator, WaitlistStatus};
pub use error::ReservationError;
pub use expiry::HoldExpirySweeper;
pub use lifecycle::CancelOrigin;
pub use memory::InMemoryReservationStore;
pub use models::{Booking, BookingStatus, Payment, PaymentStatus, WaitingListEntry};
pub use notifications::{NotificationOutbox, NotificationWorker};
pub use orchestrator::PaymentOrchestrator;
pub use policy::BookingPolicy;
pub use repository::{
    Admission, Cancellation, CancellationOutcome, ExpirySweep, PaymentSettlement, Promotion, Refund,
    ReservationStore, SettlementDecision, SettlementOutcome, StoreError, StoreResult,
};
pub use waitlist::WaitingList;
