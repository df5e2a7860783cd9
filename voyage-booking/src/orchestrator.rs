use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use voyage_core::{AuthorizationDecision, AuthorizationRequest, PaymentAuthorizer, PaymentInstrument};

use crate::coordinator::log_rejection;
use crate::error::ReservationError;
use crate::models::{Payment, PaymentStatus};
use crate::notifications::NotificationOutbox;
use crate::policy::BookingPolicy;
use crate::repository::{PaymentSettlement, Refund, ReservationStore, SettlementDecision, SettlementOutcome};
use crate::retry::retry_on_conflict;

/// Drives payments through the authorizer and applies the booking transitions they imply.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn ReservationStore>,
    authorizer: Arc<dyn PaymentAuthorizer>,
    policy: BookingPolicy,
    outbox: NotificationOutbox,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        authorizer: Arc<dyn PaymentAuthorizer>,
        policy: BookingPolicy,
        outbox: NotificationOutbox,
    ) -> Self {
        Self {
            store,
            authorizer,
            policy,
            outbox,
        }
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, ReservationError> {
        self.store
            .payment(payment_id)
            .await?
            .ok_or_else(|| ReservationError::not_found("payment", payment_id))
    }

    /// Open a Pending payment for the sum of `booking_ids`, which must all belong to `user_id`.
    pub async fn initiate_payment(
        &self,
        user_id: Uuid,
        booking_ids: Vec<Uuid>,
        method: &str,
    ) -> Result<Payment, ReservationError> {
        let result = self.open_payment(user_id, booking_ids, method).await;
        match &result {
            Ok(payment) => info!(
                "Payment {} initiated for {} booking(s), {} {}",
                payment.id,
                payment.booking_ids.len(),
                payment.amount_cents,
                payment.currency
            ),
            Err(e) => log_rejection("initiate_payment", e),
        }
        result
    }

    async fn open_payment(
        &self,
        user_id: Uuid,
        mut booking_ids: Vec<Uuid>,
        method: &str,
    ) -> Result<Payment, ReservationError> {
        let mut seen = HashSet::new();
        booking_ids.retain(|id| seen.insert(*id));
        if booking_ids.is_empty() {
            return Err(ReservationError::InvalidRequest(
                "payment must cover at least one booking".to_string(),
            ));
        }

        let mut amount_cents = 0;
        let mut currency: Option<String> = None;
        for id in &booking_ids {
            let booking = self
                .store
                .booking(*id)
                .await?
                .filter(|b| b.user_id == user_id)
                .ok_or_else(|| ReservationError::not_found("booking", *id))?;
            let package = self
                .store
                .package(booking.package_id)
                .await?
                .ok_or_else(|| ReservationError::not_found("package", booking.package_id))?;

            match &currency {
                Some(existing) if *existing != package.currency => {
                    return Err(ReservationError::InvalidRequest(
                        "bookings in one payment must share a currency".to_string(),
                    ));
                }
                Some(_) => {}
                None => currency = Some(package.currency.clone()),
            }
            amount_cents += booking.total_price_cents;
        }

        let payment = Payment::new(
            booking_ids,
            amount_cents,
            currency.unwrap_or_else(|| "USD".to_string()),
            method.to_string(),
            Utc::now(),
        );
        let payment = retry_on_conflict(self.policy.max_conflict_retries, "initiate_payment", || {
            let store = self.store.clone();
            let payment = payment.clone();
            async move { store.create_payment(payment).await }
        })
        .await?;
        Ok(payment)
    }

    /// Authorize a Pending payment.
    ///
    /// The payment is claimed (Pending → Processing) before the authorizer is called, so
    /// concurrent calls for one payment reach the authorizer at most once. Approval completes
    /// the payment and confirms its Pending bookings. A decline fails the payment, cancels its
    /// Pending bookings and returns [`ReservationError::PaymentDeclined`]. When the authorizer
    /// cannot be reached the claim is released and the payment stays Pending.
    pub async fn process_payment(
        &self,
        payment_id: Uuid,
        instrument: &PaymentInstrument,
    ) -> Result<Payment, ReservationError> {
        let payment = self.claim(payment_id).await?;

        let request = AuthorizationRequest {
            payment_id: payment.id,
            booking_ids: payment.booking_ids.clone(),
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            method: payment.method.clone(),
        };
        let decision = match self.authorizer.authorize(&request, instrument).await {
            Ok(decision) => decision,
            Err(e) => {
                error!("Authorizer failed for payment {}: {}", payment.id, e);
                self.release(payment.id).await;
                return Err(ReservationError::Upstream(e.to_string()));
            }
        };

        let decision = match decision {
            AuthorizationDecision::Approved { transaction_id } => SettlementDecision::Approved { transaction_id },
            AuthorizationDecision::Declined { reason } => SettlementDecision::Declined { reason },
        };
        let outcome = self.settle(payment_id, decision).await?;

        match outcome.payment.status {
            PaymentStatus::Completed => {
                info!(
                    "Payment {} completed, {} booking(s) confirmed",
                    outcome.payment.id,
                    outcome.bookings.len()
                );
                for booking in &outcome.bookings {
                    self.outbox.booking_confirmed(booking);
                }
                Ok(outcome.payment)
            }
            _ => {
                let reason = outcome
                    .payment
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "declined".to_string());
                info!(
                    "Payment {} declined ({}), {} booking(s) cancelled",
                    outcome.payment.id,
                    reason,
                    outcome.bookings.len()
                );
                for booking in &outcome.bookings {
                    self.outbox.booking_cancelled(booking);
                }
                self.outbox.waitlist_promotions(&outcome.promotions);
                Err(ReservationError::PaymentDeclined(reason))
            }
        }
    }

    async fn claim(&self, payment_id: Uuid) -> Result<Payment, ReservationError> {
        let now = Utc::now();
        let result = retry_on_conflict(self.policy.max_conflict_retries, "claim_payment", || {
            let store = self.store.clone();
            async move { store.claim_payment(payment_id, now).await }
        })
        .await
        .map_err(ReservationError::from);

        if let Err(e) = &result {
            log_rejection("process_payment", e);
        }
        result
    }

    async fn release(&self, payment_id: Uuid) {
        let now = Utc::now();
        let result = retry_on_conflict(self.policy.max_conflict_retries, "release_payment", || {
            let store = self.store.clone();
            async move { store.release_payment(payment_id, now).await }
        })
        .await;

        if let Err(e) = result {
            error!("Payment {} left Processing after authorizer failure: {}", payment_id, e);
        }
    }

    async fn settle(
        &self,
        payment_id: Uuid,
        decision: SettlementDecision,
    ) -> Result<SettlementOutcome, ReservationError> {
        let policy = self.policy;
        let now = Utc::now();
        let result = retry_on_conflict(policy.max_conflict_retries, "settle_payment", || {
            let store = self.store.clone();
            let settlement = PaymentSettlement {
                payment_id,
                decision: decision.clone(),
                policy,
                now,
            };
            async move { store.settle_payment(settlement).await }
        })
        .await
        .map_err(ReservationError::from);

        if let Err(e) = &result {
            log_rejection("settle_payment", e);
        }
        result
    }

    /// Completed → Refunded; every live booking of the payment is cancelled regardless of
    /// the cancellation cutoff.
    pub async fn refund_and_cancel(
        &self,
        payment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Payment, ReservationError> {
        let policy = self.policy;
        let now = Utc::now();
        let result = retry_on_conflict(policy.max_conflict_retries, "refund_payment", || {
            let store = self.store.clone();
            let refund = Refund {
                payment_id,
                reason: reason.clone(),
                policy,
                now,
            };
            async move { store.refund_payment(refund).await }
        })
        .await
        .map_err(ReservationError::from);

        match result {
            Ok(outcome) => {
                info!(
                    "Payment {} refunded, {} booking(s) cancelled",
                    outcome.payment.id,
                    outcome.bookings.len()
                );
                for booking in &outcome.bookings {
                    self.outbox.booking_cancelled(booking);
                }
                self.outbox.waitlist_promotions(&outcome.promotions);
                Ok(outcome.payment)
            }
            Err(e) => {
                log_rejection("refund_payment", &e);
                Err(e)
            }
        }
    }
}
