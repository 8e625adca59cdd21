//! In-process store with the same transactional behaviour as PostgreSQL.
//!
//! Backs tests and benchmarks. One mutex guards all tables, so every
//! repository call is atomic.

use async_trait::async_trait;
use chrono::SubsecRound;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::{BookingRepository, Catalog, RepositoryResult};
use crate::error::{RepositoryError, ReservationResult};
use crate::models::{
    AdminStatus, Booking, BookingStatus, HoldToken, SeatId, SeatMap, SeatMapDocument, ShowtimeInfo,
    Theater,
};
use crate::services::pricing::round_money;

#[derive(Default)]
struct Tables {
    theaters: HashMap<i64, Theater>,
    showtimes: HashMap<i64, ShowtimeInfo>,
    bookings: HashMap<Uuid, Booking>,
    booked_seats: HashMap<(i64, SeatId), Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_write: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validates the layout against the declared seat count and stores the theater.
    pub fn publish_theater(
        &self,
        id: i64,
        name: &str,
        total_seats: u32,
        doc: SeatMapDocument,
    ) -> ReservationResult<Theater> {
        let seat_map = SeatMap::validate(doc)?;
        let theater = Theater { id, name: name.to_string(), total_seats, seat_map };
        theater.validate()?;
        self.tables().theaters.insert(id, theater.clone());
        Ok(theater)
    }

    pub fn insert_showtime(&self, info: ShowtimeInfo) {
        self.tables().showtimes.insert(info.showtime.id, info);
    }

    pub fn set_admin_status(&self, showtime_id: i64, status: AdminStatus) {
        if let Some(info) = self.tables().showtimes.get_mut(&showtime_id) {
            info.showtime.admin_status = status;
        }
    }

    /// Makes the next write transaction fail as if the database went away.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    pub fn booking_count(&self) -> usize {
        self.tables().bookings.len()
    }

    fn injected_failure(&self) -> RepositoryResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn showtime(&self, id: i64) -> RepositoryResult<Option<ShowtimeInfo>> {
        Ok(self.tables().showtimes.get(&id).cloned())
    }

    async fn theater(&self, id: i64) -> RepositoryResult<Option<Theater>> {
        Ok(self.tables().theaters.get(&id).cloned())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn booked_seats(&self, showtime_id: i64) -> RepositoryResult<Vec<(SeatId, Uuid)>> {
        Ok(self
            .tables()
            .booked_seats
            .iter()
            .filter(|((sid, _), _)| *sid == showtime_id)
            .map(|((_, seat), booking)| (seat.clone(), *booking))
            .collect())
    }

    async fn insert_confirmed(&self, booking: &Booking) -> RepositoryResult<()> {
        self.injected_failure()?;
        let mut t = self.tables();

        if let Some(seat) = booking
            .seat_ids
            .iter()
            .find(|seat| t.booked_seats.contains_key(&(booking.showtime_id, (*seat).clone())))
        {
            return Err(RepositoryError::SeatsTaken(seat.to_string()));
        }
        if t.bookings.values().any(|b| b.hold_token == booking.hold_token) {
            return Err(RepositoryError::Conflict(format!(
                "hold {} already committed",
                booking.hold_token
            )));
        }

        for seat in &booking.seat_ids {
            t.booked_seats.insert((booking.showtime_id, seat.clone()), booking.id);
        }
        // Store with the precision of the PostgreSQL columns.
        let mut stored = booking.clone();
        stored.total_price = round_money(stored.total_price);
        stored.created_at = stored.created_at.trunc_subsecs(6);
        if let Some(info) = t.showtimes.get_mut(&booking.showtime_id) {
            info.showtime.available_seats_count -= booking.seat_ids.len() as i32;
        }
        t.bookings.insert(booking.id, stored);
        Ok(())
    }

    async fn cancel(&self, booking_id: Uuid) -> RepositoryResult<bool> {
        self.injected_failure()?;
        let mut t = self.tables();

        let Some(booking) = t.bookings.get_mut(&booking_id) else {
            return Ok(false);
        };
        if booking.status != BookingStatus::Confirmed {
            return Ok(false);
        }
        booking.status = BookingStatus::Cancelled;
        let showtime_id = booking.showtime_id;
        let seats = booking.seat_ids.clone();

        for seat in &seats {
            t.booked_seats.remove(&(showtime_id, seat.clone()));
        }
        if let Some(info) = t.showtimes.get_mut(&showtime_id) {
            info.showtime.available_seats_count += seats.len() as i32;
        }
        Ok(true)
    }

    async fn find(&self, booking_id: Uuid) -> RepositoryResult<Option<Booking>> {
        Ok(self.tables().bookings.get(&booking_id).cloned())
    }

    async fn find_by_hold_token(&self, token: HoldToken) -> RepositoryResult<Option<Booking>> {
        Ok(self
            .tables()
            .bookings
            .values()
            .find(|b| b.hold_token == token)
            .cloned())
    }

    async fn bookings_for_user(&self, user_id: i64) -> RepositoryResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .tables()
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}
