//! Seat reservation ledger.
//!
//! Tracks, per showtime, which seats are free, held by an in-progress checkout,
//! or sold. Each showtime's state sits behind its own async mutex; every
//! operation that reads or changes seats of a showtime takes that lock, so
//! multi-seat holds and commits are atomic while unrelated showtimes proceed in
//! parallel. Inside a showtime, seats are visited in ascending seat-id order.
//!
//! Expired holds are reclaimed lazily by every operation that takes the lock
//! and eagerly by [`SeatLedger::sweep_expired`]. The sweep also retires the
//! inventory of a showtime that has finished and has no live holds; a later
//! access reloads it from the stores.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ReservationError, ReservationResult};
use crate::models::{HoldToken, SeatId, SeatMap, SeatOccupancy, SeatState};
use crate::repository::{BookingRepository, Catalog};
use crate::services::clock::Clock;

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub hold_ttl: Duration,
    pub max_seats_per_hold: usize,
    /// How long an expired token is still recognised as expired.
    pub expired_retention: Duration,
    pub venue_offset: FixedOffset,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::minutes(5),
            max_seats_per_hold: 10,
            expired_retention: Duration::minutes(10),
            venue_offset: Utc.fix(),
        }
    }
}

/// Result of a successful hold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldReceipt {
    pub hold_token: HoldToken,
    pub showtime_id: i64,
    pub seat_ids: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub holds_expired: usize,
    pub seats_freed: usize,
    pub showtimes_evicted: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ActiveHold {
    pub user_id: i64,
    /// Ascending.
    pub seat_ids: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

/// Seat state of one showtime. Only ever touched under its mutex.
pub(crate) struct ShowtimeInventory {
    pub showtime_id: i64,
    pub seat_map: Arc<SeatMap>,
    /// End of the showing; after it no hold can be placed.
    pub ends_at: DateTime<Utc>,
    /// Set once evicted from the registry. A task that was waiting on the
    /// lock of a retired inventory must look the showtime up again.
    pub retired: bool,
    pub seats: BTreeMap<SeatId, SeatOccupancy>,
    pub holds: HashMap<HoldToken, ActiveHold>,
    /// Tokens reclaimed by expiry, with the time they were reclaimed.
    pub expired: HashMap<HoldToken, DateTime<Utc>>,
}

impl ShowtimeInventory {
    fn new(showtime_id: i64, seat_map: Arc<SeatMap>, ends_at: DateTime<Utc>) -> Self {
        let seats = seat_map.seats().map(|s| (s.id.clone(), SeatOccupancy::Free)).collect();
        Self {
            showtime_id,
            seat_map,
            ends_at,
            retired: false,
            seats,
            holds: HashMap::new(),
            expired: HashMap::new(),
        }
    }

    /// Frees the seats of every hold that has run out at `now` and forgets
    /// expired tokens older than `retention`. Returns the forgotten tokens.
    pub fn reclaim_expired(
        &mut self,
        now: DateTime<Utc>,
        retention: Duration,
        stats: &mut SweepStats,
    ) -> Vec<HoldToken> {
        let due: Vec<HoldToken> = self
            .holds
            .iter()
            .filter(|(_, hold)| hold.expires_at <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in due {
            if let Some(hold) = self.holds.remove(&token) {
                let freed = self.free_held(&token, &hold.seat_ids);
                stats.holds_expired += 1;
                stats.seats_freed += freed;
                self.expired.insert(token, now);
                info!(
                    showtime_id = self.showtime_id,
                    hold_token = %token,
                    seats = freed,
                    "hold expired"
                );
            }
        }

        let cutoff = now - retention;
        let forgotten: Vec<HoldToken> = self
            .expired
            .iter()
            .filter(|(_, at)| **at <= cutoff)
            .map(|(token, _)| *token)
            .collect();
        for token in &forgotten {
            self.expired.remove(token);
        }
        forgotten
    }

    /// Returns seats still held under `token` to free. Seats that moved on
    /// (booked, or re-held under another token) are left alone.
    pub fn free_held(&mut self, token: &HoldToken, seat_ids: &[SeatId]) -> usize {
        let mut freed = 0;
        for id in seat_ids {
            if let Some(seat) = self.seats.get_mut(id) {
                if matches!(seat, SeatOccupancy::Held { hold_token, .. } if hold_token == token) {
                    *seat = SeatOccupancy::Free;
                    freed += 1;
                }
            }
        }
        freed
    }

    pub fn mark_booked(&mut self, seat_ids: &[SeatId], booking_id: Uuid) {
        for id in seat_ids {
            if let Some(seat) = self.seats.get_mut(id) {
                *seat = SeatOccupancy::Booked { booking_id };
            }
        }
    }

    pub fn free_booked(&mut self, seat_ids: &[SeatId], booking_id: Uuid) -> usize {
        let mut freed = 0;
        for id in seat_ids {
            if let Some(seat) = self.seats.get_mut(id) {
                if *seat == (SeatOccupancy::Booked { booking_id }) {
                    *seat = SeatOccupancy::Free;
                    freed += 1;
                }
            }
        }
        freed
    }
}

type InventorySlot = Arc<OnceCell<Arc<Mutex<ShowtimeInventory>>>>;

pub struct SeatLedger {
    catalog: Arc<dyn Catalog>,
    bookings: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
    inventories: RwLock<HashMap<i64, InventorySlot>>,
    tokens: StdMutex<HashMap<HoldToken, i64>>,
}

impl SeatLedger {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            catalog,
            bookings,
            clock,
            settings,
            inventories: RwLock::new(HashMap::new()),
            tokens: StdMutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Places an all-or-nothing hold on `seat_ids` for `user_id`, for the
    /// configured TTL.
    pub async fn hold(
        &self,
        showtime_id: i64,
        seat_ids: &[SeatId],
        user_id: i64,
    ) -> ReservationResult<HoldReceipt> {
        self.hold_for(showtime_id, seat_ids, user_id, self.settings.hold_ttl).await
    }

    /// Like [`SeatLedger::hold`] with a caller-chosen TTL. The TTL is capped
    /// at the configured one.
    pub async fn hold_for(
        &self,
        showtime_id: i64,
        seat_ids: &[SeatId],
        user_id: i64,
        ttl: Duration,
    ) -> ReservationResult<HoldReceipt> {
        let ttl = self.capped_ttl(ttl)?;
        let requested: BTreeSet<SeatId> = seat_ids.iter().cloned().collect();
        if requested.is_empty() {
            return Err(ReservationError::EmptySelection);
        }
        if requested.len() > self.settings.max_seats_per_hold {
            return Err(ReservationError::TooManySeats {
                requested: requested.len(),
                max: self.settings.max_seats_per_hold,
            });
        }

        let info = self
            .catalog
            .showtime(showtime_id)
            .await?
            .ok_or(ReservationError::ShowtimeNotFound(showtime_id))?;
        let status = info.display_status(self.settings.venue_offset, self.clock.now());
        if !status.is_bookable() {
            return Err(ReservationError::ShowtimeNotBookable { showtime_id, status });
        }

        let mut inv = self.lock_showtime(showtime_id).await?;
        let now = self.clock.now();
        self.reclaim(&mut inv, now);

        for id in &requested {
            if inv.seat_map.seat(id).is_none() {
                return Err(ReservationError::UnknownSeat(id.clone()));
            }
            if let Some(pair) = inv.seat_map.pair_of(id) {
                if !requested.contains(pair) {
                    return Err(ReservationError::IncompleteCouplePair {
                        seat: id.clone(),
                        pair: pair.clone(),
                    });
                }
            }
        }

        let taken: Vec<SeatId> = requested
            .iter()
            .filter(|id| !inv.seats.get(*id).is_some_and(|seat| seat.is_available(now)))
            .cloned()
            .collect();
        if !taken.is_empty() {
            debug!(showtime_id, seats = ?taken, "hold rejected, seats taken");
            return Err(ReservationError::SeatsUnavailable(taken));
        }

        let hold_token = HoldToken::generate();
        let expires_at = now + ttl;
        for id in &requested {
            if let Some(seat) = inv.seats.get_mut(id) {
                *seat = SeatOccupancy::Held { hold_token, hold_expires_at: expires_at };
            }
        }
        let seat_ids: Vec<SeatId> = requested.into_iter().collect();
        inv.holds.insert(
            hold_token,
            ActiveHold { user_id, seat_ids: seat_ids.clone(), expires_at },
        );
        self.tokens().insert(hold_token, showtime_id);

        info!(
            showtime_id,
            user_id,
            hold_token = %hold_token,
            seats = seat_ids.len(),
            %expires_at,
            "seats held"
        );
        Ok(HoldReceipt { hold_token, showtime_id, seat_ids, expires_at })
    }

    /// Gives the seats of a hold of `user_id` back. Unknown, expired or
    /// already released tokens are ignored.
    pub async fn release(&self, token: HoldToken, user_id: i64) -> ReservationResult<()> {
        let Some(showtime_id) = self.showtime_of(token) else {
            return Ok(());
        };
        let mut inv = self.lock_showtime(showtime_id).await?;
        let now = self.clock.now();
        self.reclaim(&mut inv, now);

        match inv.holds.get(&token) {
            None => return Ok(()),
            Some(hold) if hold.user_id != user_id => {
                return Err(ReservationError::HoldOwnedByOtherUser(token));
            }
            Some(_) => {}
        }
        if let Some(hold) = inv.holds.remove(&token) {
            let freed = inv.free_held(&token, &hold.seat_ids);
            self.tokens().remove(&token);
            info!(showtime_id, user_id, hold_token = %token, seats = freed, "hold released");
        }
        Ok(())
    }

    /// Pushes the expiry of a live hold of `user_id` to one configured TTL
    /// from now.
    pub async fn renew(&self, token: HoldToken, user_id: i64) -> ReservationResult<HoldReceipt> {
        self.renew_for(token, user_id, self.settings.hold_ttl).await
    }

    /// Like [`SeatLedger::renew`] with a caller-chosen TTL, capped at the
    /// configured one.
    pub async fn renew_for(
        &self,
        token: HoldToken,
        user_id: i64,
        ttl: Duration,
    ) -> ReservationResult<HoldReceipt> {
        let ttl = self.capped_ttl(ttl)?;
        let showtime_id = self.showtime_of(token).ok_or(ReservationError::HoldNotFound(token))?;
        let mut inv = self.lock_showtime(showtime_id).await?;
        let now = self.clock.now();
        self.reclaim(&mut inv, now);

        let expires_at = now + ttl;
        let seat_ids = {
            let hold = inv.holds.get_mut(&token).ok_or(ReservationError::HoldNotFound(token))?;
            if hold.user_id != user_id {
                return Err(ReservationError::HoldOwnedByOtherUser(token));
            }
            hold.expires_at = expires_at;
            hold.seat_ids.clone()
        };
        for id in &seat_ids {
            if let Some(SeatOccupancy::Held { hold_token, hold_expires_at }) = inv.seats.get_mut(id) {
                if *hold_token == token {
                    *hold_expires_at = expires_at;
                }
            }
        }

        debug!(showtime_id, hold_token = %token, %expires_at, "hold renewed");
        Ok(HoldReceipt { hold_token: token, showtime_id, seat_ids, expires_at })
    }

    /// Reclaims expired holds on every loaded showtime, and evicts showtimes
    /// that have finished and hold nothing any more.
    pub async fn sweep_expired(&self) -> SweepStats {
        let loaded: Vec<(i64, InventorySlot, Arc<Mutex<ShowtimeInventory>>)> = self
            .read_inventories()
            .iter()
            .filter_map(|(id, slot)| slot.get().map(|inv| (*id, slot.clone(), inv.clone())))
            .collect();

        let mut stats = SweepStats::default();
        for (showtime_id, slot, inventory) in loaded {
            let mut inv = inventory.lock().await;
            if inv.retired {
                continue;
            }
            let now = self.clock.now();
            let forgotten =
                inv.reclaim_expired(now, self.settings.expired_retention, &mut stats);
            self.forget(&forgotten);

            if inv.holds.is_empty() && now >= inv.ends_at {
                inv.retired = true;
                let remembered: Vec<HoldToken> = inv.expired.drain().map(|(token, _)| token).collect();
                self.forget(&remembered);
                self.evict(showtime_id, &slot);
                stats.showtimes_evicted += 1;
                debug!(showtime_id, "finished showtime evicted from the ledger");
            }
        }
        stats
    }

    /// Number of showtimes whose seat state is currently in memory.
    pub fn loaded_showtimes(&self) -> usize {
        self.read_inventories().len()
    }

    /// Current state of every seat of a showtime, keyed by seat id.
    pub async fn availability(&self, showtime_id: i64) -> ReservationResult<BTreeMap<SeatId, SeatState>> {
        let mut inv = self.lock_showtime(showtime_id).await?;
        let now = self.clock.now();
        self.reclaim(&mut inv, now);
        Ok(inv.seats.iter().map(|(id, seat)| (id.clone(), seat.state())).collect())
    }

    /// Seat layout of a showtime, as loaded by the ledger.
    pub async fn seat_map(&self, showtime_id: i64) -> ReservationResult<Arc<SeatMap>> {
        let inv = self.lock_showtime(showtime_id).await?;
        Ok(inv.seat_map.clone())
    }

    pub(crate) fn showtime_of(&self, token: HoldToken) -> Option<i64> {
        self.tokens().get(&token).copied()
    }

    pub(crate) fn forget(&self, tokens: &[HoldToken]) {
        if tokens.is_empty() {
            return;
        }
        let mut index = self.tokens();
        for token in tokens {
            index.remove(token);
        }
    }

    pub(crate) fn reclaim(&self, inv: &mut ShowtimeInventory, now: DateTime<Utc>) {
        let mut stats = SweepStats::default();
        let forgotten = inv.reclaim_expired(now, self.settings.expired_retention, &mut stats);
        self.forget(&forgotten);
    }

    /// Locks the seat state of a showtime, loading it on first use.
    pub(crate) async fn lock_showtime(
        &self,
        showtime_id: i64,
    ) -> ReservationResult<OwnedMutexGuard<ShowtimeInventory>> {
        loop {
            let slot = self.slot(showtime_id);
            let loaded = slot.get_or_try_init(|| self.load(showtime_id)).await;
            match loaded {
                Ok(inventory) => {
                    let guard = inventory.clone().lock_owned().await;
                    if !guard.retired {
                        return Ok(guard);
                    }
                }
                Err(e) => {
                    if !slot.initialized() {
                        self.evict(showtime_id, &slot);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Drops `slot` from the registry unless it was already replaced.
    fn evict(&self, showtime_id: i64, slot: &InventorySlot) {
        let mut inventories = self.write_inventories();
        if inventories.get(&showtime_id).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            inventories.remove(&showtime_id);
        }
    }

    fn capped_ttl(&self, ttl: Duration) -> ReservationResult<Duration> {
        if ttl <= Duration::zero() {
            return Err(ReservationError::InvalidRequest(format!(
                "hold ttl must be positive, got {}s",
                ttl.num_seconds()
            )));
        }
        Ok(ttl.min(self.settings.hold_ttl))
    }

    fn slot(&self, showtime_id: i64) -> InventorySlot {
        if let Some(slot) = self.read_inventories().get(&showtime_id) {
            return slot.clone();
        }
        self.write_inventories().entry(showtime_id).or_default().clone()
    }

    async fn load(&self, showtime_id: i64) -> ReservationResult<Arc<Mutex<ShowtimeInventory>>> {
        let info = self
            .catalog
            .showtime(showtime_id)
            .await?
            .ok_or(ReservationError::ShowtimeNotFound(showtime_id))?;
        let theater_id = info.showtime.theater_id;
        let theater = self
            .catalog
            .theater(theater_id)
            .await?
            .ok_or(ReservationError::TheaterNotFound(theater_id))?;

        let ends_at = info.ends_at(self.settings.venue_offset);
        let mut inventory = ShowtimeInventory::new(showtime_id, Arc::new(theater.seat_map), ends_at);
        let sold = self.bookings.booked_seats(showtime_id).await?;
        for (seat_id, booking_id) in &sold {
            match inventory.seats.get_mut(seat_id) {
                Some(seat) => *seat = SeatOccupancy::Booked { booking_id: *booking_id },
                None => warn!(showtime_id, seat_id = %seat_id, "booked seat missing from seat map"),
            }
        }

        info!(
            showtime_id,
            theater_id,
            seats = inventory.seats.len(),
            booked = sold.len(),
            "showtime inventory loaded"
        );
        Ok(Arc::new(Mutex::new(inventory)))
    }

    fn tokens(&self) -> std::sync::MutexGuard<'_, HashMap<HoldToken, i64>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_inventories(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, InventorySlot>> {
        self.inventories.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inventories(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i64, InventorySlot>> {
        self.inventories.write().unwrap_or_else(|e| e.into_inner())
    }
}
