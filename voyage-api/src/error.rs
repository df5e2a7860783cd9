use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use voyage_booking::ReservationError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
    #[error("{0}")]
    InternalServerError(String),
}

/// HTTP status for a rejected reservation operation.
pub fn status_for(err: &ReservationError) -> StatusCode {
    match err {
        ReservationError::NotFound { .. } => StatusCode::NOT_FOUND,
        ReservationError::DuplicateBooking(_)
        | ReservationError::FullyBooked(_)
        | ReservationError::AlreadyQueued(_)
        | ReservationError::AlreadyBooked(_)
        | ReservationError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        ReservationError::PackageUnavailable(_)
        | ReservationError::BookingLimitExceeded { .. }
        | ReservationError::CancellationWindowExpired { .. }
        | ReservationError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReservationError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        ReservationError::TransactionConflict => StatusCode::SERVICE_UNAVAILABLE,
        ReservationError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ReservationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message, retryable) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg, false),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, false),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, false),
            AppError::Reservation(err) => {
                let status = status_for(&err);
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal Server Error: {}", err);
                    "Internal Server Error".to_string()
                } else {
                    err.to_string()
                };
                (status, err.code(), message, err.is_retryable())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                    false,
                )
            }
        };

        let mut body = json!({
            "error": error_message,
            "code": code,
        });
        if retryable {
            body["retryable"] = json!(true);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(status_for(&ReservationError::FullyBooked(id)), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&ReservationError::BookingLimitExceeded { active: 3, limit: 3 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ReservationError::PaymentDeclined("card_declined".into())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(&ReservationError::not_found("booking", id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ReservationError::TransactionConflict),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_conflict_response_is_marked_retryable() {
        let response = AppError::from(ReservationError::TransactionConflict).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
