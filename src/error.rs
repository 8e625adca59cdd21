use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::models::{DisplayStatus, HoldToken, SeatId, SeatMapError, SeatType};

/// Failures of the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A seat of the booking is already sold in the store.
    #[error("seats already booked: {0}")]
    SeatsTaken(String),

    /// Another uniqueness guarantee of the store fired, e.g. a hold token
    /// already committed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("invalid seat map: {0}")]
    InvalidSeatMap(#[from] SeatMapError),

    #[error("no pricing multiplier for seat type {0}")]
    UnknownSeatType(SeatType),

    #[error("price of a {0} seat does not fit a decimal")]
    PriceOverflow(SeatType),

    #[error("seats not available: {}", join(.0))]
    SeatsUnavailable(Vec<SeatId>),

    #[error("couple seat {seat} must be selected together with {pair}")]
    IncompleteCouplePair { seat: SeatId, pair: SeatId },

    #[error("unknown seat {0}")]
    UnknownSeat(SeatId),

    #[error("no seats selected")]
    EmptySelection,

    #[error("too many seats selected: {requested} (max {max})")]
    TooManySeats { requested: usize, max: usize },

    #[error("showtime {0} not found")]
    ShowtimeNotFound(i64),

    #[error("theater {0} not found")]
    TheaterNotFound(i64),

    #[error("showtime {showtime_id} is {status:?} and cannot be booked")]
    ShowtimeNotBookable { showtime_id: i64, status: DisplayStatus },

    #[error("hold {0} not found")]
    HoldNotFound(HoldToken),

    #[error("hold {0} has expired")]
    HoldExpired(HoldToken),

    #[error("hold {0} belongs to another user")]
    HoldOwnedByOtherUser(HoldToken),

    #[error("booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("booking {0} cannot be cancelled")]
    BookingNotCancellable(Uuid),

    #[error("booking {0} belongs to another user")]
    BookingOwnedByOtherUser(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn join(ids: &[SeatId]) -> String {
    ids.iter().map(SeatId::as_str).collect::<Vec<_>>().join(", ")
}

pub type ReservationResult<T> = Result<T, ReservationError>;

/// Seat conflicts answer with 419, like the rest of the booking API.
pub fn status_419() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::CONFLICT)
}

impl ReservationError {
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::InvalidSeatMap(_) => "INVALID_SEAT_MAP",
            ReservationError::UnknownSeatType(_) => "UNKNOWN_SEAT_TYPE",
            ReservationError::PriceOverflow(_) => "PRICE_OVERFLOW",
            ReservationError::SeatsUnavailable(_) => "SEATS_UNAVAILABLE",
            ReservationError::IncompleteCouplePair { .. } => "INCOMPLETE_COUPLE_PAIR",
            ReservationError::UnknownSeat(_) => "UNKNOWN_SEAT",
            ReservationError::EmptySelection => "EMPTY_SELECTION",
            ReservationError::TooManySeats { .. } => "TOO_MANY_SEATS",
            ReservationError::ShowtimeNotFound(_) => "SHOWTIME_NOT_FOUND",
            ReservationError::TheaterNotFound(_) => "THEATER_NOT_FOUND",
            ReservationError::ShowtimeNotBookable { .. } => "SHOWTIME_NOT_BOOKABLE",
            ReservationError::HoldNotFound(_) => "HOLD_NOT_FOUND",
            ReservationError::HoldExpired(_) => "HOLD_EXPIRED",
            ReservationError::HoldOwnedByOtherUser(_) => "FORBIDDEN",
            ReservationError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            ReservationError::BookingNotCancellable(_) => "BOOKING_NOT_CANCELLABLE",
            ReservationError::BookingOwnedByOtherUser(_) => "FORBIDDEN",
            ReservationError::InvalidRequest(_) => "INVALID_REQUEST",
            ReservationError::Repository(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ReservationError::SeatsUnavailable(_)
            | ReservationError::IncompleteCouplePair { .. } => status_419(),
            ReservationError::UnknownSeat(_)
            | ReservationError::EmptySelection
            | ReservationError::TooManySeats { .. }
            | ReservationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ReservationError::ShowtimeNotFound(_)
            | ReservationError::TheaterNotFound(_)
            | ReservationError::HoldNotFound(_)
            | ReservationError::BookingNotFound(_) => StatusCode::NOT_FOUND,
            ReservationError::ShowtimeNotBookable { .. }
            | ReservationError::BookingNotCancellable(_) => StatusCode::CONFLICT,
            ReservationError::HoldExpired(_) => StatusCode::GONE,
            ReservationError::HoldOwnedByOtherUser(_)
            | ReservationError::BookingOwnedByOtherUser(_) => StatusCode::FORBIDDEN,
            ReservationError::InvalidSeatMap(_)
            | ReservationError::UnknownSeatType(_)
            | ReservationError::PriceOverflow(_)
            | ReservationError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for ReservationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ReservationError::InvalidRequest(errors.to_string())
    }
}

impl IntoResponse for ReservationError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "reservation request failed");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}
