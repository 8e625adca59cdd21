//! Storage seams of the reservation core.
//!
//! `Catalog` answers the static questions (what is showing, in which theater,
//! with which seat layout). `BookingRepository` is the durable side: confirmed
//! bookings and the per-seat uniqueness that backs them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{Booking, HoldToken, SeatId, ShowtimeInfo, Theater};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn showtime(&self, id: i64) -> RepositoryResult<Option<ShowtimeInfo>>;

    async fn theater(&self, id: i64) -> RepositoryResult<Option<Theater>>;

    /// Drops any cached copy of the showtime, e.g. after its seat count moved.
    async fn invalidate_showtime(&self, _id: i64) {}
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Seats already sold for a showtime, with the booking that owns each.
    async fn booked_seats(&self, showtime_id: i64) -> RepositoryResult<Vec<(SeatId, Uuid)>>;

    /// Stores a confirmed booking, marks its seats sold and decrements the
    /// showtime's available count, all in one transaction.
    ///
    /// Fails with [`RepositoryError::SeatsTaken`] if any seat is already sold
    /// and with [`RepositoryError::Conflict`] if the hold token was already
    /// committed.
    async fn insert_confirmed(&self, booking: &Booking) -> RepositoryResult<()>;

    /// Marks a confirmed booking cancelled, frees its seats and gives the
    /// count back, in one transaction. Returns `false` if the booking was not
    /// in the confirmed state.
    async fn cancel(&self, booking_id: Uuid) -> RepositoryResult<bool>;

    async fn find(&self, booking_id: Uuid) -> RepositoryResult<Option<Booking>>;

    async fn find_by_hold_token(&self, token: HoldToken) -> RepositoryResult<Option<Booking>>;

    async fn bookings_for_user(&self, user_id: i64) -> RepositoryResult<Vec<Booking>>;
}
