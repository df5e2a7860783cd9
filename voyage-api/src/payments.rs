use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use voyage_booking::{Payment, ReservationError};
use voyage_core::PaymentInstrument;

use crate::bookings::parse_reason;
use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

fn default_payment_method() -> String {
    "CARD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub booking_ids: Vec<Uuid>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(initiate_payment))
        .route("/v1/payments/{id}/process", post(process_payment))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/v1/payments/{id}/refund", post(refund_payment))
}

async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state
        .payments
        .initiate_payment(claims.user_id()?, req.booking_ids, &req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn process_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<Uuid>,
    Json(instrument): Json<PaymentInstrument>,
) -> Result<Json<Payment>, AppError> {
    // Only the owner of the covered bookings may pay.
    let payment = state.payments.get_payment(payment_id).await?;
    let user_id = claims.user_id()?;
    for booking_id in &payment.booking_ids {
        let booking = state.coordinator.get_booking(*booking_id).await?;
        if booking.user_id != user_id {
            return Err(ReservationError::not_found("payment", payment_id).into());
        }
    }

    Ok(Json(state.payments.process_payment(payment_id, &instrument).await?))
}

async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Payment>, AppError> {
    let reason = parse_reason(&body)?;
    Ok(Json(state.payments.refund_and_cancel(payment_id, reason).await?))
}
