pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod repository;
pub mod services;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::cache::CacheService;
use crate::config::Config;
use crate::database::Database;
use crate::redis_client::RedisClient;
use crate::repository::{BookingRepository, Catalog, PgStore};
use crate::services::{BookingService, Clock, LedgerSettings, SeatLedger, SystemClock};

/// Showtimes pre-loaded into Redis at startup.
const WARMUP_SHOWTIMES: i64 = 200;

// Shared state for the whole application
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub ledger: Arc<SeatLedger>,
    pub bookings: Arc<BookingService>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Arc<Self>> {
        let db = Database::connect(&config.database).await?;
        db.run_migrations().await?;

        let redis = RedisClient::new(&config.redis.url).await?;
        redis.ping().await?;
        info!("Redis connected");

        let store = PgStore::new(&db);
        let cache = CacheService::new(redis, store.clone(), config.redis.cache_ttl_seconds);

        let settings = config.reservation.ledger_settings()?;
        let state = Self::from_parts(
            Arc::new(cache.clone()),
            Arc::new(store),
            Arc::new(SystemClock),
            settings,
        );

        // Warmup cache in the background
        task::spawn(async move {
            cache.warmup_cache(WARMUP_SHOWTIMES).await;
        });

        Ok(state)
    }

    /// Wires the services over the given stores and clock.
    pub fn from_parts(
        catalog: Arc<dyn Catalog>,
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Arc<Self> {
        let ledger = Arc::new(SeatLedger::new(
            catalog.clone(),
            bookings.clone(),
            clock.clone(),
            settings,
        ));
        let booking_service = Arc::new(BookingService::new(
            ledger.clone(),
            catalog.clone(),
            bookings,
            clock,
        ));
        Arc::new(Self { catalog, ledger, bookings: booking_service })
    }
}

/// The full HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
