pub mod bookings;
pub mod holds;
pub mod showtimes;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(showtimes::routes())
        .merge(holds::routes())
        .merge(bookings::routes())
}
