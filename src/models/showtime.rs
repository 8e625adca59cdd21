use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Status set by an administrator. The only status that is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminStatus {
    Active,
    Canceled,
}

impl AdminStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AdminStatus::Active => "active",
            AdminStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for AdminStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AdminStatus::Active),
            "canceled" => Ok(AdminStatus::Canceled),
            other => Err(format!("unknown admin status {other:?}")),
        }
    }
}

/// User-facing lifecycle label, always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Scheduled,
    Showing,
    Completed,
    Canceled,
}

impl DisplayStatus {
    /// Derives the display status of a showtime at `now`.
    ///
    /// A canceled showtime stays canceled regardless of the clock. Otherwise the
    /// showtime is scheduled before `start`, showing during
    /// `[start, start + duration)`, and completed afterwards.
    pub fn resolve(
        admin_status: AdminStatus,
        start: DateTime<Utc>,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        if admin_status == AdminStatus::Canceled {
            return DisplayStatus::Canceled;
        }
        let end = start + Duration::minutes(i64::from(duration_minutes));
        if now < start {
            DisplayStatus::Scheduled
        } else if now < end {
            DisplayStatus::Showing
        } else {
            DisplayStatus::Completed
        }
    }

    pub fn is_bookable(self) -> bool {
        self == DisplayStatus::Scheduled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: i64,
    pub movie_id: i64,
    pub theater_id: i64,
    pub show_date: NaiveDate,
    pub show_time: NaiveTime,
    pub base_price: Decimal,
    pub admin_status: AdminStatus,
    pub available_seats_count: i32,
}

impl Showtime {
    /// Venue-local date and time of the showing.
    pub fn local_start(&self) -> NaiveDateTime {
        self.show_date.and_time(self.show_time)
    }

    /// Start instant, interpreting date + time in the venue's fixed offset.
    pub fn starts_at(&self, venue_offset: FixedOffset) -> DateTime<Utc> {
        // Fixed offsets never produce ambiguous or skipped local times.
        (self.local_start() - Duration::seconds(i64::from(venue_offset.local_minus_utc())))
            .and_utc()
    }
}

/// Showtime joined with the duration of its movie, as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowtimeInfo {
    pub showtime: Showtime,
    pub movie_duration_minutes: u32,
}

impl ShowtimeInfo {
    /// End of the showing; from here on the showtime is completed.
    pub fn ends_at(&self, venue_offset: FixedOffset) -> DateTime<Utc> {
        self.showtime.starts_at(venue_offset)
            + Duration::minutes(i64::from(self.movie_duration_minutes))
    }

    pub fn display_status(&self, venue_offset: FixedOffset, now: DateTime<Utc>) -> DisplayStatus {
        DisplayStatus::resolve(
            self.showtime.admin_status,
            self.showtime.starts_at(venue_offset),
            self.movie_duration_minutes,
            now,
        )
    }
}
