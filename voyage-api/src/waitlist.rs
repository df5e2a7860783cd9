use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voyage_booking::WaitlistStatus;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JoinWaitlistRequest {
    pub number_of_rooms: u32,
}

#[derive(Debug, Serialize)]
pub struct JoinWaitlistResponse {
    pub package_id: Uuid,
    pub position: u32,
}

#[derive(Debug, Serialize)]
pub struct LeaveWaitlistResponse {
    pub package_id: Uuid,
    pub removed: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/packages/{id}/waitlist", post(join).delete(leave))
        .route("/v1/packages/{id}/waitlist/me", get(status))
}

async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(package_id): Path<Uuid>,
    Json(req): Json<JoinWaitlistRequest>,
) -> Result<(StatusCode, Json<JoinWaitlistResponse>), AppError> {
    let position = state
        .coordinator
        .join_waiting_list(claims.user_id()?, package_id, req.number_of_rooms)
        .await?;
    Ok((StatusCode::CREATED, Json(JoinWaitlistResponse { package_id, position })))
}

async fn leave(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(package_id): Path<Uuid>,
) -> Result<Json<LeaveWaitlistResponse>, AppError> {
    let removed = state
        .coordinator
        .leave_waiting_list(claims.user_id()?, package_id)
        .await?;
    Ok(Json(LeaveWaitlistResponse { package_id, removed }))
}

async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(package_id): Path<Uuid>,
) -> Result<Json<WaitlistStatus>, AppError> {
    Ok(Json(
        state.coordinator.waitlist_status(claims.user_id()?, package_id).await?,
    ))
}
