use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ReservationResult;
use crate::middleware::AuthUser;
use crate::models::{Booking, HoldToken};
use crate::services::Committed;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_user_bookings))
        .route("/bookings/commit", post(commit_booking))
        .route("/bookings/cancel", patch(cancel_booking))
}

// POST /api/bookings/commit
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub hold_token: Uuid,
}

async fn commit_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CommitRequest>,
) -> ReservationResult<(StatusCode, Json<Booking>)> {
    let committed = state
        .bookings
        .commit(HoldToken::from_uuid(req.hold_token), user.user_id)
        .await?;

    let status = match committed {
        Committed::Created(_) => StatusCode::CREATED,
        Committed::AlreadyCommitted(_) => StatusCode::OK,
    };
    Ok((status, Json(committed.into_booking())))
}

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ReservationResult<Json<Vec<Booking>>> {
    let bookings = state.bookings.bookings_for_user(user.user_id).await?;
    Ok(Json(bookings))
}

// PATCH /api/bookings/cancel
#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub booking_id: Uuid,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CancelBookingRequest>,
) -> ReservationResult<Json<Booking>> {
    let booking = state.bookings.cancel_booking(req.booking_id, user.user_id).await?;
    Ok(Json(booking))
}
