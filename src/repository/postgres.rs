use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use super::{BookingRepository, Catalog, RepositoryResult};
use crate::database::Database;
use crate::error::{RepositoryError, ReservationResult};
use crate::models::{
    Booking, BookingStatus, HoldToken, SeatId, SeatMap, SeatMapDocument, Showtime, ShowtimeInfo,
    Theater,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct ShowtimeRow {
    id: i64,
    movie_id: i64,
    theater_id: i64,
    show_date: NaiveDate,
    show_time: NaiveTime,
    base_price: Decimal,
    admin_status: String,
    available_seats_count: i32,
    duration_minutes: i32,
}

impl TryFrom<ShowtimeRow> for ShowtimeInfo {
    type Error = RepositoryError;

    fn try_from(row: ShowtimeRow) -> Result<Self, Self::Error> {
        let admin_status = row
            .admin_status
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("showtime {}: {e}", row.id)))?;
        let movie_duration_minutes = u32::try_from(row.duration_minutes).map_err(|_| {
            RepositoryError::Corrupt(format!("showtime {}: negative movie duration", row.id))
        })?;
        Ok(ShowtimeInfo {
            showtime: Showtime {
                id: row.id,
                movie_id: row.movie_id,
                theater_id: row.theater_id,
                show_date: row.show_date,
                show_time: row.show_time,
                base_price: row.base_price,
                admin_status,
                available_seats_count: row.available_seats_count,
            },
            movie_duration_minutes,
        })
    }
}

#[derive(FromRow)]
struct TheaterRow {
    id: i64,
    name: String,
    total_seats: i32,
    seat_map: Json<SeatMapDocument>,
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    showtime_id: i64,
    user_id: i64,
    hold_token: Uuid,
    seat_ids: Vec<String>,
    total_price: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = RepositoryError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|e| RepositoryError::Corrupt(format!("booking {}: {e}", row.id)))?;
        Ok(Booking {
            id: row.id,
            showtime_id: row.showtime_id,
            user_id: row.user_id,
            hold_token: HoldToken::from_uuid(row.hold_token),
            seat_ids: row.seat_ids.into_iter().map(SeatId::new).collect(),
            total_price: row.total_price,
            status,
            created_at: row.created_at,
        })
    }
}

const BOOKING_COLUMNS: &str =
    "id, showtime_id, user_id, hold_token, seat_ids, total_price, status, created_at";

fn unique_violation(
    err: sqlx::Error,
    conflict: impl FnOnce() -> RepositoryError,
) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => conflict(),
        _ => RepositoryError::Database(err),
    }
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    /// Validates a seat layout and stores a new theater with it.
    pub async fn publish_theater(
        &self,
        name: &str,
        total_seats: u32,
        doc: SeatMapDocument,
    ) -> ReservationResult<Theater> {
        let seat_map = SeatMap::validate(doc)?;
        seat_map.validate_for_theater(total_seats)?;

        let document = SeatMapDocument::from(seat_map.clone());
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO theaters (name, total_seats, seat_map) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(total_seats as i32)
        .bind(Json(document))
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        info!(theater_id = id, seats = total_seats, "theater published");
        Ok(Theater { id, name: name.to_string(), total_seats, seat_map })
    }

    /// Ids of active showtimes from `from` onwards, earliest first.
    pub async fn upcoming_showtime_ids(&self, from: NaiveDate, limit: i64) -> RepositoryResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM showtimes
             WHERE show_date >= $1 AND admin_status = 'active'
             ORDER BY show_date, show_time
             LIMIT $2",
        )
        .bind(from)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn showtime(&self, id: i64) -> RepositoryResult<Option<ShowtimeInfo>> {
        let row = sqlx::query_as::<_, ShowtimeRow>(
            "SELECT s.id, s.movie_id, s.theater_id, s.show_date, s.show_time, s.base_price,
                    s.admin_status, s.available_seats_count, m.duration_minutes
             FROM showtimes s
             JOIN movies m ON m.id = s.movie_id
             WHERE s.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ShowtimeInfo::try_from).transpose()
    }

    async fn theater(&self, id: i64) -> RepositoryResult<Option<Theater>> {
        let row = sqlx::query_as::<_, TheaterRow>(
            "SELECT id, name, total_seats, seat_map FROM theaters WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let total_seats = u32::try_from(row.total_seats)
            .map_err(|_| RepositoryError::Corrupt(format!("theater {id}: negative seat count")))?;
        let seat_map = SeatMap::validate(row.seat_map.0)
            .map_err(|e| RepositoryError::Corrupt(format!("theater {id}: {e}")))?;
        if let Err(e) = seat_map.validate_for_theater(total_seats) {
            warn!(theater_id = id, error = %e, "seat map does not match declared seat count");
        }
        Ok(Some(Theater { id: row.id, name: row.name, total_seats, seat_map }))
    }
}

#[async_trait]
impl BookingRepository for PgStore {
    async fn booked_seats(&self, showtime_id: i64) -> RepositoryResult<Vec<(SeatId, Uuid)>> {
        let rows = sqlx::query_as::<_, (String, Uuid)>(
            "SELECT seat_id, booking_id FROM booked_seats WHERE showtime_id = $1",
        )
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(seat, booking)| (SeatId::new(seat), booking)).collect())
    }

    async fn insert_confirmed(&self, booking: &Booking) -> RepositoryResult<()> {
        let seat_ids: Vec<String> = booking.seat_ids.iter().map(|s| s.as_str().to_string()).collect();

        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO bookings (id, showtime_id, user_id, hold_token, seat_ids, total_price, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(booking.id)
        .bind(booking.showtime_id)
        .bind(booking.user_id)
        .bind(booking.hold_token.as_uuid())
        .bind(&seat_ids)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                RepositoryError::Conflict(format!("hold {} already committed", booking.hold_token))
            })
        })?;

        sqlx::query(
            "INSERT INTO booked_seats (showtime_id, seat_id, booking_id)
             SELECT $1, seat_id, $3 FROM UNNEST($2::text[]) AS seat_id",
        )
        .bind(booking.showtime_id)
        .bind(&seat_ids)
        .bind(booking.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, || RepositoryError::SeatsTaken(seat_ids.join(", "))))?;

        sqlx::query(
            "UPDATE showtimes SET available_seats_count = available_seats_count - $2 WHERE id = $1",
        )
        .bind(booking.showtime_id)
        .bind(seat_ids.len() as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn cancel(&self, booking_id: Uuid) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, (i64, i32)>(
            "UPDATE bookings SET status = 'cancelled'
             WHERE id = $1 AND status = 'confirmed'
             RETURNING showtime_id, cardinality(seat_ids)",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((showtime_id, seat_count)) = updated else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM booked_seats WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE showtimes SET available_seats_count = available_seats_count + $2 WHERE id = $1",
        )
        .bind(showtime_id)
        .bind(seat_count)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn find(&self, booking_id: Uuid) -> RepositoryResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_hold_token(&self, token: HoldToken) -> RepositoryResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE hold_token = $1"
        ))
        .bind(token.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for_user(&self, user_id: i64) -> RepositoryResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
