use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use voyage_booking::{Booking, ReservationError};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub package_id: Uuid,
    pub number_of_rooms: u32,
    pub number_of_guests: u32,
}

/// Body of cancel and refund requests. The body itself is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) fn parse_reason(body: &Bytes) -> Result<Option<String>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<ReasonRequest>(body)
        .map(|req| req.reason)
        .map_err(|e| AppError::ValidationError(format!("invalid request body: {e}")))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/complete", post(complete_booking))
}

/// Bookings are visible to their owner and to operators; anyone else gets a 404.
async fn owned_booking(state: &AppState, claims: &Claims, booking_id: Uuid) -> Result<Booking, AppError> {
    let booking = state.coordinator.get_booking(booking_id).await?;
    if !claims.is_admin() && booking.user_id != claims.user_id()? {
        return Err(ReservationError::not_found("booking", booking_id).into());
    }
    Ok(booking)
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state
        .coordinator
        .create_booking(claims.user_id()?, req.package_id, req.number_of_rooms, req.number_of_guests)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.coordinator.list_bookings(claims.user_id()?).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(owned_booking(&state, &claims, booking_id).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Booking>, AppError> {
    owned_booking(&state, &claims, booking_id).await?;
    let reason = parse_reason(&body)?;
    Ok(Json(state.coordinator.cancel_booking(booking_id, reason).await?))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.confirm_booking(booking_id).await?))
}

async fn complete_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.coordinator.complete_booking(booking_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_body_is_optional() {
        assert_eq!(parse_reason(&Bytes::new()).unwrap(), None);
        assert_eq!(
            parse_reason(&Bytes::from_static(br#"{"reason":"plans changed"}"#)).unwrap(),
            Some("plans changed".to_string())
        );
        assert_eq!(parse_reason(&Bytes::from_static(b"{}")).unwrap(), None);
        assert!(matches!(
            parse_reason(&Bytes::from_static(b"not json")),
            Err(AppError::ValidationError(_))
        ));
    }
}
