use axum::{
    extract::State,
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::ReservationResult;
use crate::middleware::AuthUser;
use crate::models::{HoldToken, SeatId};
use crate::services::HoldReceipt;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/holds", post(create_hold))
        .route("/holds/release", patch(release_hold))
        .route("/holds/renew", patch(renew_hold))
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub hold_token: HoldToken,
    pub showtime_id: i64,
    pub seat_ids: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

impl From<HoldReceipt> for HoldResponse {
    fn from(r: HoldReceipt) -> Self {
        Self {
            hold_token: r.hold_token,
            showtime_id: r.showtime_id,
            seat_ids: r.seat_ids,
            expires_at: r.expires_at,
        }
    }
}

// POST /api/holds
#[derive(Debug, Deserialize, Validate)]
pub struct CreateHoldRequest {
    #[validate(range(min = 1))]
    pub showtime_id: i64,
    #[validate(length(min = 1))]
    pub seat_ids: Vec<String>,
    /// Shorter hold than the configured one, e.g. for a kiosk checkout.
    #[validate(range(min = 1))]
    pub ttl_seconds: Option<i64>,
}

async fn create_hold(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateHoldRequest>,
) -> ReservationResult<(StatusCode, Json<HoldResponse>)> {
    req.validate()?;

    let seat_ids: Vec<SeatId> = req.seat_ids.into_iter().map(SeatId::new).collect();
    let receipt = match req.ttl_seconds {
        Some(ttl) => {
            state
                .ledger
                .hold_for(req.showtime_id, &seat_ids, user.user_id, Duration::seconds(ttl))
                .await?
        }
        None => state.ledger.hold(req.showtime_id, &seat_ids, user.user_id).await?,
    };
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

#[derive(Debug, Deserialize)]
pub struct HoldTokenRequest {
    pub hold_token: Uuid,
}

// PATCH /api/holds/release
async fn release_hold(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<HoldTokenRequest>,
) -> ReservationResult<StatusCode> {
    state
        .ledger
        .release(HoldToken::from_uuid(req.hold_token), user.user_id)
        .await?;
    Ok(StatusCode::OK)
}

// PATCH /api/holds/renew
#[derive(Debug, Deserialize, Validate)]
pub struct RenewHoldRequest {
    pub hold_token: Uuid,
    #[validate(range(min = 1))]
    pub ttl_seconds: Option<i64>,
}

async fn renew_hold(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<RenewHoldRequest>,
) -> ReservationResult<Json<HoldResponse>> {
    req.validate()?;

    let token = HoldToken::from_uuid(req.hold_token);
    let receipt = match req.ttl_seconds {
        Some(ttl) => {
            state
                .ledger
                .renew_for(token, user.user_id, Duration::seconds(ttl))
                .await?
        }
        None => state.ledger.renew(token, user.user_id).await?,
    };
    Ok(Json(receipt.into()))
}
