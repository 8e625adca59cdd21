//! Per-seat pricing.
//!
//! Every physical seat is a billable unit: a couple pair costs twice the
//! couple price, never a flat pair price. Prices are rounded to the scale of
//! the money columns so a booking reads back exactly as it was written.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{ReservationError, ReservationResult};
use crate::models::{PricingTable, Seat, SeatId, SeatType};

/// Fractional digits of every stored amount (`NUMERIC(.., 2)`).
pub const MONEY_SCALE: u32 = 2;

/// Rounds the way PostgreSQL rounds on insert into a `NUMERIC(.., 2)` column.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn price_for(seat: &Seat, base_price: Decimal, pricing: &PricingTable) -> ReservationResult<Decimal> {
    price_for_type(seat.seat_type(), base_price, pricing)
}

pub fn price_for_type(
    seat_type: SeatType,
    base_price: Decimal,
    pricing: &PricingTable,
) -> ReservationResult<Decimal> {
    let multiplier = pricing
        .get(&seat_type)
        .ok_or(ReservationError::UnknownSeatType(seat_type))?;
    base_price
        .checked_mul(*multiplier)
        .map(round_money)
        .ok_or(ReservationError::PriceOverflow(seat_type))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteLine {
    pub seat_id: SeatId,
    pub seat_type: SeatType,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub total: Decimal,
}

/// Prices a selection seat by seat and sums it.
pub fn quote<'a>(
    seats: impl IntoIterator<Item = &'a Seat>,
    base_price: Decimal,
    pricing: &PricingTable,
) -> ReservationResult<Quote> {
    let mut lines = Vec::new();
    let mut total = Decimal::ZERO;
    for seat in seats {
        let price = price_for(seat, base_price, pricing)?;
        total = total
            .checked_add(price)
            .ok_or(ReservationError::PriceOverflow(seat.seat_type()))?;
        lines.push(QuoteLine { seat_id: seat.id.clone(), seat_type: seat.seat_type(), price });
    }
    Ok(Quote { lines, total })
}

/// Unit price of every type in the table, for display next to a seat map.
pub fn price_list(
    base_price: Decimal,
    pricing: &PricingTable,
) -> ReservationResult<BTreeMap<SeatType, Decimal>> {
    pricing
        .keys()
        .map(|&seat_type| Ok((seat_type, price_for_type(seat_type, base_price, pricing)?)))
        .collect()
}
