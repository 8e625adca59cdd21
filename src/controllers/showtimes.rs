use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ReservationError, ReservationResult};
use crate::models::{DisplayStatus, SeatMap, SeatState, SeatType};
use crate::services::pricing;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes/{id}", get(get_showtime))
        .route("/showtimes/{id}/seats", get(get_seats))
}

// GET /api/showtimes/{id}
#[derive(Debug, Serialize)]
pub struct ShowtimeResponse {
    pub id: i64,
    pub movie_id: i64,
    pub theater_id: i64,
    pub show_date: NaiveDate,
    pub show_time: NaiveTime,
    pub starts_at: DateTime<Utc>,
    pub status: DisplayStatus,
    pub base_price: Decimal,
    pub prices: BTreeMap<SeatType, Decimal>,
    pub available_seats_count: i32,
    pub seat_map: SeatMap,
}

async fn get_showtime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ReservationResult<Json<ShowtimeResponse>> {
    let info = state
        .catalog
        .showtime(id)
        .await?
        .ok_or(ReservationError::ShowtimeNotFound(id))?;

    let settings = state.ledger.settings();
    let status = info.display_status(settings.venue_offset, state.ledger.now());
    let seat_map = state.ledger.seat_map(id).await?;
    let showtime = info.showtime;

    Ok(Json(ShowtimeResponse {
        id: showtime.id,
        movie_id: showtime.movie_id,
        theater_id: showtime.theater_id,
        show_date: showtime.show_date,
        show_time: showtime.show_time,
        starts_at: showtime.starts_at(settings.venue_offset),
        status,
        base_price: showtime.base_price,
        prices: pricing::price_list(showtime.base_price, seat_map.pricing())?,
        available_seats_count: showtime.available_seats_count,
        seat_map: SeatMap::clone(&seat_map),
    }))
}

// GET /api/showtimes/{id}/seats?row=&state=
#[derive(Debug, Deserialize)]
pub struct SeatsQuery {
    pub row: Option<String>,
    pub state: Option<SeatState>,
}

async fn get_seats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<SeatsQuery>,
) -> ReservationResult<Json<BTreeMap<String, SeatState>>> {
    let availability = state.ledger.availability(id).await?;
    let seat_map = match &q.row {
        Some(_) => Some(state.ledger.seat_map(id).await?),
        None => None,
    };

    let seats = availability
        .into_iter()
        .filter(|(_, seat_state)| q.state.is_none_or(|wanted| wanted == *seat_state))
        .filter(|(seat_id, _)| match (&q.row, &seat_map) {
            (Some(row), Some(map)) => map.seat(seat_id).is_some_and(|s| &s.row == row),
            _ => true,
        })
        .map(|(seat_id, seat_state)| (seat_id.as_str().to_string(), seat_state))
        .collect();

    Ok(Json(seats))
}
