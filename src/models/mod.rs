pub mod booking;
pub mod occupancy;
pub mod seat_map;
pub mod showtime;
pub mod theater;

pub use booking::{Booking, BookingStatus, HoldToken};
pub use occupancy::{SeatOccupancy, SeatState};
pub use seat_map::{PricingTable, Seat, SeatId, SeatKind, SeatMap, SeatMapDocument, SeatMapError, SeatType};
pub use showtime::{AdminStatus, DisplayStatus, Showtime, ShowtimeInfo};
pub use theater::Theater;
