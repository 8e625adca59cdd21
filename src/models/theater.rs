use serde::{Deserialize, Serialize};

use super::seat_map::{SeatMap, SeatMapError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theater {
    pub id: i64,
    pub name: String,
    pub total_seats: u32,
    pub seat_map: SeatMap,
}

impl Theater {
    /// Publish-time check: the layout must account for every declared seat.
    pub fn validate(&self) -> Result<(), SeatMapError> {
        self.seat_map.validate_for_theater(self.total_seats)
    }
}
