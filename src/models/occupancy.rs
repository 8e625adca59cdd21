use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::HoldToken;

/// Public view of a seat's state, as listed by the availability endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Free,
    Held,
    Booked,
}

/// Occupancy of one seat for one showtime.
///
/// The hold token and expiry exist only while held, the booking id only while
/// booked; the enum shape enforces this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatOccupancy {
    Free,
    Held {
        hold_token: HoldToken,
        hold_expires_at: DateTime<Utc>,
    },
    Booked {
        booking_id: Uuid,
    },
}

impl SeatOccupancy {
    pub fn state(&self) -> SeatState {
        match self {
            SeatOccupancy::Free => SeatState::Free,
            SeatOccupancy::Held { .. } => SeatState::Held,
            SeatOccupancy::Booked { .. } => SeatState::Booked,
        }
    }

    /// Free, or held by a hold that has run out at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self {
            SeatOccupancy::Free => true,
            SeatOccupancy::Held { hold_expires_at, .. } => *hold_expires_at <= now,
            SeatOccupancy::Booked { .. } => false,
        }
    }
}
