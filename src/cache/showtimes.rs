use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::cache::CacheService;
use crate::models::{ShowtimeInfo, Theater};

fn showtime_key(id: i64) -> String {
    format!("showtime:{}", id)
}

// Seat maps only change through an admin republish, which also clears this key
fn theater_key(id: i64) -> String {
    format!("theater:{}", id)
}

fn decode<T: DeserializeOwned>(data: Option<String>) -> Result<Option<T>, redis::RedisError> {
    match data {
        None => Ok(None),
        Some(data) => serde_json::from_str(&data).map(Some).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))
        }),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, redis::RedisError> {
    serde_json::to_string(value)
        .map_err(|_| redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error")))
}

impl CacheService {
    pub(crate) async fn get_showtime_from_cache(
        &self,
        id: i64,
    ) -> Result<Option<ShowtimeInfo>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn.get(showtime_key(id)).await?;
        decode(data)
    }

    pub(crate) async fn save_showtime_to_cache(&self, info: &ShowtimeInfo) -> Result<(), redis::RedisError> {
        let data = encode(info)?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(showtime_key(info.showtime.id), data, self.ttl_seconds).await
    }

    pub(crate) async fn get_theater_from_cache(&self, id: i64) -> Result<Option<Theater>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn.get(theater_key(id)).await?;
        decode(data)
    }

    pub(crate) async fn save_theater_to_cache(&self, theater: &Theater) -> Result<(), redis::RedisError> {
        let data = encode(theater)?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(theater_key(theater.id), data, self.ttl_seconds).await
    }

    pub(crate) async fn invalidate_showtime_entry(&self, id: i64) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(showtime_key(id)).await;
        debug!("Invalidated cache for showtime {}", id);
    }
}
