#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use cinema_seating::models::{
    AdminStatus, Seat, SeatId, SeatKind, SeatMapDocument, SeatType, Showtime, ShowtimeInfo,
};
use cinema_seating::repository::MemoryStore;
use cinema_seating::services::{LedgerSettings, ManualClock};
use cinema_seating::AppState;

pub const THEATER_ID: i64 = 1;
/// 2024-01-15 18:00 venue time, active.
pub const SHOWTIME_ID: i64 = 10;
/// Same slot, cancelled by an admin.
pub const CANCELED_SHOWTIME_ID: i64 = 11;
pub const TOTAL_SEATS: u32 = 10;

pub fn venue_offset() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap()
}

/// One hour before the 18:00 show starts (18:00 +07:00 is 11:00 UTC).
pub fn before_show() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

pub fn settings() -> LedgerSettings {
    LedgerSettings {
        hold_ttl: Duration::minutes(5),
        max_seats_per_hold: 6,
        expired_retention: Duration::minutes(10),
        venue_offset: venue_offset(),
    }
}

pub fn seat(id: &str, row: &str, number: u32, kind: SeatKind) -> Seat {
    Seat { id: SeatId::new(id), row: row.to_string(), number, kind }
}

fn couple(id: &str, number: u32, pair: &str) -> Seat {
    seat(id, "H", number, SeatKind::Couple { pair_with: SeatId::new(pair) })
}

/// Row A: four standard seats. Row B: two VIP. Row H: two couple pairs.
pub fn seat_map_document() -> SeatMapDocument {
    SeatMapDocument {
        rows: vec!["A".into(), "B".into(), "H".into()],
        seats_per_row: 4,
        seats: vec![
            seat("A1", "A", 1, SeatKind::Standard),
            seat("A2", "A", 2, SeatKind::Standard),
            seat("A3", "A", 3, SeatKind::Standard),
            seat("A4", "A", 4, SeatKind::Standard),
            seat("B1", "B", 1, SeatKind::Vip),
            seat("B2", "B", 2, SeatKind::Vip),
            couple("H1", 1, "H2"),
            couple("H2", 2, "H1"),
            couple("H3", 3, "H4"),
            couple("H4", 4, "H3"),
        ],
        pricing: [
            (SeatType::Standard, Decimal::new(10, 1)),
            (SeatType::Vip, Decimal::new(15, 1)),
            (SeatType::Couple, Decimal::new(20, 1)),
        ]
        .into_iter()
        .collect(),
    }
}

pub fn base_price() -> Decimal {
    Decimal::new(100_000, 0)
}

pub fn showtime(id: i64, admin_status: AdminStatus) -> ShowtimeInfo {
    ShowtimeInfo {
        showtime: Showtime {
            id,
            movie_id: 1,
            theater_id: THEATER_ID,
            show_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            show_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            base_price: base_price(),
            admin_status,
            available_seats_count: TOTAL_SEATS as i32,
        },
        movie_duration_minutes: 120,
    }
}

pub fn ids(ids: &[&str]) -> Vec<SeatId> {
    ids.iter().map(|id| SeatId::new(*id)).collect()
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<AppState>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .publish_theater(THEATER_ID, "Hall 1", TOTAL_SEATS, seat_map_document())
            .unwrap();
        store.insert_showtime(showtime(SHOWTIME_ID, AdminStatus::Active));
        store.insert_showtime(showtime(CANCELED_SHOWTIME_ID, AdminStatus::Canceled));

        let clock = Arc::new(ManualClock::new(before_show()));
        let state = AppState::from_parts(store.clone(), store.clone(), clock.clone(), settings());
        Self { store, clock, state }
    }

    /// Fresh services over the same store, as after a process restart.
    pub fn restart(&self) -> Arc<AppState> {
        AppState::from_parts(
            self.store.clone(),
            self.store.clone(),
            self.clock.clone(),
            settings(),
        )
    }

    pub fn app(&self) -> axum::Router {
        cinema_seating::app(self.state.clone())
    }
}

pub async fn send(
    app: axum::Router,
    method: Method,
    uri: &str,
    user_id: Option<i64>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
