//! Turns a live hold into a confirmed booking, and back out again on
//! cancellation.
//!
//! The persistence transaction runs while the showtime's ledger lock is held,
//! so expiry reclamation and competing holds cannot interleave with it. Seats
//! are flipped in memory only after the transaction has committed; a failed
//! transaction leaves the hold exactly as it was.

use chrono::SubsecRound;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{RepositoryError, ReservationError, ReservationResult};
use crate::models::{AdminStatus, Booking, BookingStatus, DisplayStatus, HoldToken};
use crate::repository::{BookingRepository, Catalog};
use crate::services::clock::Clock;
use crate::services::ledger::SeatLedger;
use crate::services::pricing;

/// Outcome of a commit. Re-driving a committed hold is not an error: the
/// original booking comes back.
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    Created(Booking),
    AlreadyCommitted(Booking),
}

impl Committed {
    pub fn booking(&self) -> &Booking {
        match self {
            Committed::Created(b) | Committed::AlreadyCommitted(b) => b,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            Committed::Created(b) | Committed::AlreadyCommitted(b) => b,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Committed::AlreadyCommitted(_))
    }
}

pub struct BookingService {
    ledger: Arc<SeatLedger>,
    catalog: Arc<dyn Catalog>,
    bookings: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(
        ledger: Arc<SeatLedger>,
        catalog: Arc<dyn Catalog>,
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { ledger, catalog, bookings, clock }
    }

    pub async fn commit(&self, token: HoldToken, user_id: i64) -> ReservationResult<Committed> {
        let Some(showtime_id) = self.ledger.showtime_of(token) else {
            return self.replay(token, user_id).await;
        };

        let info = self
            .catalog
            .showtime(showtime_id)
            .await?
            .ok_or(ReservationError::ShowtimeNotFound(showtime_id))?;
        if info.showtime.admin_status == AdminStatus::Canceled {
            return Err(ReservationError::ShowtimeNotBookable {
                showtime_id,
                status: DisplayStatus::Canceled,
            });
        }

        let mut inv = self.ledger.lock_showtime(showtime_id).await?;
        // TIMESTAMPTZ keeps microseconds
        let now = self.clock.now().trunc_subsecs(6);

        let Some(hold) = inv.holds.get(&token).cloned() else {
            // Released, expired and swept, or committed by a concurrent request.
            if let Some(booking) = self.bookings.find_by_hold_token(token).await? {
                return owned_replay(booking, token, user_id);
            }
            if inv.expired.contains_key(&token) {
                return Err(ReservationError::HoldExpired(token));
            }
            return Err(ReservationError::HoldNotFound(token));
        };

        if hold.user_id != user_id {
            return Err(ReservationError::HoldOwnedByOtherUser(token));
        }
        if hold.expires_at <= now {
            self.ledger.reclaim(&mut inv, now);
            info!(showtime_id, hold_token = %token, "commit rejected, hold expired");
            return Err(ReservationError::HoldExpired(token));
        }

        let seats = hold
            .seat_ids
            .iter()
            .map(|id| inv.seat_map.seat(id).ok_or_else(|| ReservationError::UnknownSeat(id.clone())))
            .collect::<ReservationResult<Vec<_>>>()?;
        let quote = pricing::quote(seats, info.showtime.base_price, inv.seat_map.pricing())
            .inspect_err(|e| error!(showtime_id, error = %e, "pricing table incomplete"))?;

        let booking = Booking {
            id: Uuid::new_v4(),
            showtime_id,
            user_id,
            hold_token: token,
            seat_ids: hold.seat_ids.clone(),
            total_price: quote.total,
            status: BookingStatus::Confirmed,
            created_at: now,
        };

        match self.bookings.insert_confirmed(&booking).await {
            Ok(()) => {}
            Err(RepositoryError::SeatsTaken(seats)) => {
                warn!(showtime_id, hold_token = %token, seats = %seats, "held seats already sold in the store");
                return Err(ReservationError::SeatsUnavailable(booking.seat_ids));
            }
            Err(RepositoryError::Conflict(detail)) => {
                if let Some(existing) = self.bookings.find_by_hold_token(token).await? {
                    return owned_replay(existing, token, user_id);
                }
                error!(showtime_id, hold_token = %token, detail = %detail, "booking transaction conflicted");
                return Err(RepositoryError::Conflict(detail).into());
            }
            Err(e) => {
                error!(showtime_id, hold_token = %token, error = %e, "booking transaction failed");
                return Err(e.into());
            }
        }

        inv.mark_booked(&booking.seat_ids, booking.id);
        inv.holds.remove(&token);
        drop(inv);
        self.ledger.forget(&[token]);
        self.catalog.invalidate_showtime(showtime_id).await;

        info!(
            showtime_id,
            user_id,
            booking_id = %booking.id,
            seats = booking.seat_ids.len(),
            total = %booking.total_price,
            "booking confirmed"
        );
        Ok(Committed::Created(booking))
    }

    /// Cancels a confirmed booking of `user_id` and returns its seats to sale.
    pub async fn cancel_booking(&self, booking_id: Uuid, user_id: i64) -> ReservationResult<Booking> {
        let mut booking = self
            .bookings
            .find(booking_id)
            .await?
            .ok_or(ReservationError::BookingNotFound(booking_id))?;
        if booking.user_id != user_id {
            return Err(ReservationError::BookingOwnedByOtherUser(booking_id));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(ReservationError::BookingNotCancellable(booking_id));
        }

        let mut inv = self.ledger.lock_showtime(booking.showtime_id).await?;
        if !self.bookings.cancel(booking_id).await? {
            return Err(ReservationError::BookingNotCancellable(booking_id));
        }
        let freed = inv.free_booked(&booking.seat_ids, booking_id);
        drop(inv);

        if freed != booking.seat_ids.len() {
            warn!(
                booking_id = %booking_id,
                freed,
                expected = booking.seat_ids.len(),
                "cancelled booking had seats not marked booked"
            );
        }
        self.catalog.invalidate_showtime(booking.showtime_id).await;

        booking.status = BookingStatus::Cancelled;
        info!(booking_id = %booking_id, showtime_id = booking.showtime_id, seats = freed, "booking cancelled");
        Ok(booking)
    }

    pub async fn find_booking(&self, booking_id: Uuid) -> ReservationResult<Booking> {
        self.bookings
            .find(booking_id)
            .await?
            .ok_or(ReservationError::BookingNotFound(booking_id))
    }

    pub async fn bookings_for_user(&self, user_id: i64) -> ReservationResult<Vec<Booking>> {
        Ok(self.bookings.bookings_for_user(user_id).await?)
    }

    async fn replay(&self, token: HoldToken, user_id: i64) -> ReservationResult<Committed> {
        match self.bookings.find_by_hold_token(token).await? {
            Some(booking) => owned_replay(booking, token, user_id),
            None => Err(ReservationError::HoldNotFound(token)),
        }
    }
}

fn owned_replay(booking: Booking, token: HoldToken, user_id: i64) -> ReservationResult<Committed> {
    if booking.user_id != user_id {
        return Err(ReservationError::HoldOwnedByOtherUser(token));
    }
    info!(booking_id = %booking.id, hold_token = %token, "duplicate commit, returning existing booking");
    Ok(Committed::AlreadyCommitted(booking))
}
