use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::{ShowtimeInfo, Theater};
use crate::redis_client::RedisClient;
use crate::repository::{Catalog, PgStore, RepositoryResult};

pub mod showtimes;

/// Catalog reads through Redis, falling back to PostgreSQL on a miss or when
/// Redis is unavailable.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    store: PgStore,
    ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, store: PgStore, ttl_seconds: u64) -> Self {
        Self { redis, store, ttl_seconds }
    }

    // Warm up at startup: upcoming showtimes and their theaters
    pub async fn warmup_cache(&self, limit: i64) {
        info!("Starting cache warmup...");

        let today = chrono::Utc::now().date_naive();
        let ids = match self.store.upcoming_showtime_ids(today, limit).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "cache warmup skipped");
                return;
            }
        };

        let mut warmed = 0;
        for id in ids {
            if let Ok(Some(info)) = self.showtime(id).await {
                let _ = self.theater(info.showtime.theater_id).await;
                warmed += 1;
            }
        }

        info!(showtimes = warmed, "Cache warmup done");
    }
}

#[async_trait]
impl Catalog for CacheService {
    async fn showtime(&self, id: i64) -> RepositoryResult<Option<ShowtimeInfo>> {
        if let Ok(Some(info)) = self.get_showtime_from_cache(id).await {
            return Ok(Some(info));
        }

        let info = self.store.showtime(id).await?;
        if let Some(info) = &info {
            if let Err(e) = self.save_showtime_to_cache(info).await {
                warn!(showtime_id = id, error = %e, "failed to cache showtime");
            }
        }
        Ok(info)
    }

    async fn theater(&self, id: i64) -> RepositoryResult<Option<Theater>> {
        if let Ok(Some(theater)) = self.get_theater_from_cache(id).await {
            return Ok(Some(theater));
        }

        let theater = self.store.theater(id).await?;
        if let Some(theater) = &theater {
            if let Err(e) = self.save_theater_to_cache(theater).await {
                warn!(theater_id = id, error = %e, "failed to cache theater");
            }
        }
        Ok(theater)
    }

    async fn invalidate_showtime(&self, id: i64) {
        self.invalidate_showtime_entry(id).await;
    }
}
