use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyage_booking::{Booking, CartLine, CheckoutResult, FailedLine, Payment, ReservationError};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

fn default_payment_method() -> String {
    "CARD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

#[derive(Debug, Serialize)]
pub struct FailedLineResponse {
    pub index: usize,
    pub package_id: Uuid,
    pub code: &'static str,
    pub error: String,
}

impl From<FailedLine> for FailedLineResponse {
    fn from(line: FailedLine) -> Self {
        Self {
            index: line.index,
            package_id: line.package_id,
            code: line.error.code(),
            error: line.error.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl From<ReservationError> for PaymentErrorResponse {
    fn from(err: ReservationError) -> Self {
        Self {
            code: err.code(),
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub succeeded: Vec<Booking>,
    pub failed: Vec<FailedLineResponse>,
    pub payment: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_error: Option<PaymentErrorResponse>,
}

impl From<CheckoutResult> for CheckoutResponse {
    fn from(result: CheckoutResult) -> Self {
        Self {
            succeeded: result.succeeded,
            failed: result.failed.into_iter().map(FailedLineResponse::from).collect(),
            payment: result.payment,
            payment_error: result.payment_error.map(PaymentErrorResponse::from),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/checkout", post(checkout))
}

async fn checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let result = state
        .checkout
        .checkout(claims.user_id()?, &req.lines, &req.payment_method)
        .await?;
    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_carries_payment_error() {
        let result = CheckoutResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
            payment: None,
            payment_error: Some(ReservationError::TransactionConflict),
        };
        let body = serde_json::to_value(CheckoutResponse::from(result)).unwrap();
        assert_eq!(body["payment"], serde_json::Value::Null);
        assert_eq!(body["payment_error"]["code"], "TRANSACTION_CONFLICT");
    }
}
