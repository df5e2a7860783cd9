use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::coordinator::{log_rejection, ReservationCoordinator};
use crate::error::ReservationError;
use crate::models::{Booking, Payment};
use crate::orchestrator::PaymentOrchestrator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub package_id: Uuid,
    pub rooms: u32,
    pub guests: u32,
}

/// A cart line that was not admitted, with its index in the submitted cart.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedLine {
    pub index: usize,
    pub package_id: Uuid,
    pub error: ReservationError,
}

#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub succeeded: Vec<Booking>,
    pub failed: Vec<FailedLine>,
    /// One Pending payment covering every succeeded line, if any succeeded.
    pub payment: Option<Payment>,
    /// Why no payment was opened even though some lines succeeded. Those bookings stay
    /// Pending and can be paid for with a separate payment.
    pub payment_error: Option<ReservationError>,
}

/// Admits a multi-package cart line by line.
///
/// Lines are independent: a failed line never rolls back the ones before it. A cart whose
/// packages are priced in different currencies is rejected before any line is admitted.
#[derive(Clone)]
pub struct CheckoutAggregator {
    coordinator: ReservationCoordinator,
    payments: PaymentOrchestrator,
}

impl CheckoutAggregator {
    pub fn new(coordinator: ReservationCoordinator, payments: PaymentOrchestrator) -> Self {
        Self { coordinator, payments }
    }

    pub async fn checkout(
        &self,
        user_id: Uuid,
        lines: &[CartLine],
        payment_method: &str,
    ) -> Result<CheckoutResult, ReservationError> {
        if lines.is_empty() {
            let err = ReservationError::InvalidRequest("cart is empty".to_string());
            log_rejection("checkout", &err);
            return Err(err);
        }

        // Whole-cart cap check; each admission still re-checks the cap on its own.
        let active = self.coordinator.active_booking_count(user_id).await?;
        if let Err(e) = self
            .coordinator
            .policy()
            .ensure_below_cap(active, lines.len() as u32)
        {
            log_rejection("checkout", &e);
            return Err(e);
        }
        if let Err(e) = self.ensure_single_currency(lines).await {
            log_rejection("checkout", &e);
            return Err(e);
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            match self
                .coordinator
                .create_booking(user_id, line.package_id, line.rooms, line.guests)
                .await
            {
                Ok(booking) => succeeded.push(booking),
                Err(error) => failed.push(FailedLine {
                    index,
                    package_id: line.package_id,
                    error,
                }),
            }
        }

        let mut payment_error = None;
        let payment = if succeeded.is_empty() {
            None
        } else {
            let booking_ids = succeeded.iter().map(|b| b.id).collect();
            match self
                .payments
                .initiate_payment(user_id, booking_ids, payment_method)
                .await
            {
                Ok(payment) => Some(payment),
                Err(e) => {
                    warn!(
                        "Checkout for user {} admitted {} line(s) but opened no payment: {}",
                        user_id,
                        succeeded.len(),
                        e
                    );
                    payment_error = Some(e);
                    None
                }
            }
        };

        info!(
            "Checkout for user {}: {} line(s) admitted, {} failed",
            user_id,
            succeeded.len(),
            failed.len()
        );
        Ok(CheckoutResult {
            succeeded,
            failed,
            payment,
            payment_error,
        })
    }

    /// Unknown packages are skipped here and reported by their own line.
    async fn ensure_single_currency(&self, lines: &[CartLine]) -> Result<(), ReservationError> {
        let mut currencies = BTreeSet::new();
        for line in lines {
            if let Some(package) = self.coordinator.store().package(line.package_id).await? {
                currencies.insert(package.currency);
            }
        }
        if currencies.len() > 1 {
            let listed: Vec<String> = currencies.into_iter().collect();
            return Err(ReservationError::InvalidRequest(format!(
                "cart mixes currencies ({}); check out each currency separately",
                listed.join(", ")
            )));
        }
        Ok(())
    }
}
