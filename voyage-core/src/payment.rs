use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyage_shared::Masked;

use crate::{CoreError, CoreResult};

/// Card or wallet details supplied by the traveler.
///
/// Passed straight through to the authorizer and never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInstrument {
    pub card_number: Masked<String>,
    pub cvv: Masked<String>,
    pub expiry: Masked<String>,
    pub holder_name: Option<Masked<String>>,
}

impl PaymentInstrument {
    pub fn last_four(&self) -> &str {
        let number = self.card_number.expose();
        number.get(number.len().saturating_sub(4)..).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub payment_id: Uuid,
    pub booking_ids: Vec<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationDecision {
    Approved { transaction_id: String },
    Declined { reason: String },
}

/// Decision oracle for charging a traveler. Real gateways live behind this seam.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    /// Returns `Err` only when the authorizer could not reach a decision.
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        instrument: &PaymentInstrument,
    ) -> CoreResult<AuthorizationDecision>;
}

/// Test-card authorizer used in development and tests.
///
/// * card numbers ending in `0002` are declined
/// * card numbers ending in `0119` simulate a gateway outage
/// * everything else is approved
pub struct MockPaymentAuthorizer;

#[async_trait]
impl PaymentAuthorizer for MockPaymentAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        instrument: &PaymentInstrument,
    ) -> CoreResult<AuthorizationDecision> {
        tracing::info!(
            "Authorizing payment {} for {} {} (card ending {})",
            request.payment_id,
            request.amount_cents,
            request.currency,
            instrument.last_four()
        );

        if request.amount_cents <= 0 {
            return Err(CoreError::ValidationError("amount must be positive".to_string()));
        }

        match instrument.last_four() {
            "0119" => Err(CoreError::Unavailable("simulated gateway outage".to_string())),
            "0002" => Ok(AuthorizationDecision::Declined {
                reason: "card_declined".to_string(),
            }),
            _ => Ok(AuthorizationDecision::Approved {
                transaction_id: format!("txn_{}", Uuid::new_v4().simple()),
            }),
        }
    }
}
