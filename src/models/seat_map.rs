//! Static seat layout of a theater.
//!
//! A layout arrives as a JSON document (`SeatMapDocument`) and is turned into a
//! [`SeatMap`] exactly once, at publish/load time. Everything downstream works
//! with the validated form only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Seat identifier within one theater, e.g. `"A1"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(String);

impl SeatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeatId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Seat category used as the key of the pricing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatType {
    Standard,
    Vip,
    Couple,
}

impl fmt::Display for SeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeatType::Standard => "standard",
            SeatType::Vip => "vip",
            SeatType::Couple => "couple",
        };
        f.write_str(s)
    }
}

/// Per-type part of a seat. Only couple seats carry a partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SeatKind {
    Standard,
    Vip,
    Couple {
        #[serde(rename = "pairWith")]
        pair_with: SeatId,
    },
}

impl SeatKind {
    pub fn seat_type(&self) -> SeatType {
        match self {
            SeatKind::Standard => SeatType::Standard,
            SeatKind::Vip => SeatType::Vip,
            SeatKind::Couple { .. } => SeatType::Couple,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub row: String,
    pub number: u32,
    #[serde(flatten)]
    pub kind: SeatKind,
}

impl Seat {
    pub fn seat_type(&self) -> SeatType {
        self.kind.seat_type()
    }

    pub fn pair_with(&self) -> Option<&SeatId> {
        match &self.kind {
            SeatKind::Couple { pair_with } => Some(pair_with),
            _ => None,
        }
    }
}

/// Multiplier applied to a showtime's base price, per seat type.
pub type PricingTable = BTreeMap<SeatType, Decimal>;

/// Wire/storage form of a seat map, as found in `theaters.seat_map`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMapDocument {
    pub rows: Vec<String>,
    pub seats_per_row: u32,
    pub seats: Vec<Seat>,
    pub pricing: PricingTable,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeatMapError {
    #[error("duplicate seat id {0}")]
    DuplicateSeatId(SeatId),

    #[error("seat {0} references unknown row {1}")]
    UnknownRow(SeatId, String),

    #[error("seat {0} is paired with itself")]
    SelfPaired(SeatId),

    #[error("seat {seat} is paired with missing seat {target}")]
    PairTargetMissing { seat: SeatId, target: SeatId },

    #[error("seat {seat} is paired with {target}, which is not a couple seat")]
    PairNotCouple { seat: SeatId, target: SeatId },

    #[error("seat {seat} is paired with {target}, but {target} is paired with {back}")]
    AsymmetricPair { seat: SeatId, target: SeatId, back: SeatId },

    #[error("no pricing multiplier for seat type {0}")]
    MissingMultiplier(SeatType),

    #[error("negative pricing multiplier {multiplier} for seat type {seat_type}")]
    NegativeMultiplier { seat_type: SeatType, multiplier: Decimal },

    #[error("seat map has {actual} seats but the theater declares {declared}")]
    SeatCountMismatch { declared: u32, actual: usize },
}

/// Validated seat layout keyed by seat id.
///
/// Construct through [`SeatMap::validate`] (or deserialize, which validates).
/// Seats iterate in ascending seat-id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeatMapDocument", into = "SeatMapDocument")]
pub struct SeatMap {
    rows: Vec<String>,
    seats_per_row: u32,
    seats: BTreeMap<SeatId, Seat>,
    pricing: PricingTable,
}

impl SeatMap {
    pub fn validate(doc: SeatMapDocument) -> Result<Self, SeatMapError> {
        let rows: HashSet<&str> = doc.rows.iter().map(String::as_str).collect();

        let mut seats = BTreeMap::new();
        for seat in doc.seats {
            if !rows.contains(seat.row.as_str()) {
                return Err(SeatMapError::UnknownRow(seat.id, seat.row));
            }
            if seats.contains_key(&seat.id) {
                return Err(SeatMapError::DuplicateSeatId(seat.id));
            }
            seats.insert(seat.id.clone(), seat);
        }

        for seat in seats.values() {
            let Some(target) = seat.pair_with() else {
                continue;
            };
            if target == &seat.id {
                return Err(SeatMapError::SelfPaired(seat.id.clone()));
            }
            let partner = seats.get(target).ok_or_else(|| SeatMapError::PairTargetMissing {
                seat: seat.id.clone(),
                target: target.clone(),
            })?;
            match partner.pair_with() {
                None => {
                    return Err(SeatMapError::PairNotCouple {
                        seat: seat.id.clone(),
                        target: target.clone(),
                    })
                }
                Some(back) if back != &seat.id => {
                    return Err(SeatMapError::AsymmetricPair {
                        seat: seat.id.clone(),
                        target: target.clone(),
                        back: back.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        let used: BTreeSet<SeatType> = seats.values().map(Seat::seat_type).collect();
        for seat_type in used {
            if !doc.pricing.contains_key(&seat_type) {
                return Err(SeatMapError::MissingMultiplier(seat_type));
            }
        }
        for (&seat_type, &multiplier) in &doc.pricing {
            if multiplier < Decimal::ZERO {
                return Err(SeatMapError::NegativeMultiplier { seat_type, multiplier });
            }
        }

        Ok(Self {
            rows: doc.rows,
            seats_per_row: doc.seats_per_row,
            seats,
            pricing: doc.pricing,
        })
    }

    /// Checks the layout against the seat count declared by the owning theater.
    pub fn validate_for_theater(&self, declared_total: u32) -> Result<(), SeatMapError> {
        if self.seats.len() != declared_total as usize {
            return Err(SeatMapError::SeatCountMismatch {
                declared: declared_total,
                actual: self.seats.len(),
            });
        }
        Ok(())
    }

    pub fn total_seats(&self) -> usize {
        self.seats.len()
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn seats_per_row(&self) -> u32 {
        self.seats_per_row
    }

    pub fn seat(&self, id: &SeatId) -> Option<&Seat> {
        self.seats.get(id)
    }

    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.seats.values()
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Partner of a couple seat, `None` for other types or unknown ids.
    pub fn pair_of(&self, id: &SeatId) -> Option<&SeatId> {
        self.seats.get(id).and_then(Seat::pair_with)
    }

    /// True when every row holds exactly `seats_per_row` seats.
    pub fn is_regular(&self) -> bool {
        let mut per_row: BTreeMap<&str, u32> = BTreeMap::new();
        for seat in self.seats.values() {
            *per_row.entry(seat.row.as_str()).or_default() += 1;
        }
        self.rows
            .iter()
            .all(|row| per_row.get(row.as_str()).copied().unwrap_or(0) == self.seats_per_row)
    }
}

impl TryFrom<SeatMapDocument> for SeatMap {
    type Error = SeatMapError;

    fn try_from(doc: SeatMapDocument) -> Result<Self, Self::Error> {
        SeatMap::validate(doc)
    }
}

impl From<SeatMap> for SeatMapDocument {
    fn from(map: SeatMap) -> Self {
        SeatMapDocument {
            rows: map.rows,
            seats_per_row: map.seats_per_row,
            seats: map.seats.into_values().collect(),
            pricing: map.pricing,
        }
    }
}
