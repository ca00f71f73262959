//! Line history model.
//!
//! Immutable, time-ordered snapshots of one market (`game_id` + bet type)
//! across books. Everything above this layer reads prices through
//! [`LineHistory`], which enforces the ordering invariant once at
//! construction and offers point-in-time lookups that never look ahead.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::types::{BetType, EngineError, LineSnapshot, PickSide};

// ---------------------------------------------------------------------------
// Market key
// ---------------------------------------------------------------------------

/// Identifies one market: a game and a bet type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    pub game_id: String,
    pub bet_type: BetType,
}

impl MarketKey {
    pub fn new(game_id: impl Into<String>, bet_type: BetType) -> Self {
        Self {
            game_id: game_id.into(),
            bet_type,
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game_id, self.bet_type)
    }
}

// ---------------------------------------------------------------------------
// Price normalisation
// ---------------------------------------------------------------------------

/// Implied win probability (0–1) of an American price, vig included.
pub fn implied_probability(price: i32) -> f64 {
    let p = price as f64;
    if price < 0 {
        -p / (-p + 100.0)
    } else if price > 0 {
        100.0 / (p + 100.0)
    } else {
        0.5
    }
}

/// The snapshot expressed on a single reference scale per bet type:
/// the home handicap for spreads, the number for totals, and the home
/// implied probability in percentage points for moneylines.
pub fn market_value(snapshot: &LineSnapshot) -> f64 {
    match snapshot.bet_type {
        BetType::Spread => {
            let v = snapshot.line_value.to_f64().unwrap_or(0.0);
            if snapshot.side == PickSide::Away {
                -v
            } else {
                v
            }
        }
        BetType::Total => snapshot.line_value.to_f64().unwrap_or(0.0),
        BetType::Moneyline => {
            let p = implied_probability(snapshot.price) * 100.0;
            if snapshot.side == PickSide::Away {
                100.0 - p
            } else {
                p
            }
        }
    }
}

/// Re-express a reference-scale value from `side`'s point of view, oriented
/// so that an increase means the market moved against `side`.
///
/// Spread: that side's handicap grows (home -7 → -6 is +1 against home).
/// Total: the number moves away from the side (over: total drops).
/// Moneyline: that side's implied probability shrinks.
pub fn against_side(bet_type: BetType, side: PickSide, value: f64) -> f64 {
    match (bet_type, side) {
        (BetType::Spread, PickSide::Away) => -value,
        (BetType::Spread, _) => value,
        (BetType::Total, PickSide::Over) => -value,
        (BetType::Total, _) => value,
        (BetType::Moneyline, PickSide::Away) => -(100.0 - value),
        (BetType::Moneyline, _) => -value,
    }
}

// ---------------------------------------------------------------------------
// Line history
// ---------------------------------------------------------------------------

/// Validated snapshot history for one market.
#[derive(Debug, Clone)]
pub struct LineHistory {
    key: MarketKey,
    /// All snapshots ordered by `(captured_at, book_id, side)`.
    snapshots: Vec<LineSnapshot>,
}

impl LineHistory {
    /// Build a history, rejecting snapshots from another market and any
    /// `(book, side)` series whose timestamps are not strictly increasing.
    pub fn new(key: MarketKey, mut snapshots: Vec<LineSnapshot>) -> Result<Self, EngineError> {
        if let Some(stray) = snapshots
            .iter()
            .find(|s| s.game_id != key.game_id || s.bet_type != key.bet_type)
        {
            return Err(EngineError::InvalidSeries {
                context: key.to_string(),
                reason: format!("snapshot for {}/{} in series", stray.game_id, stray.bet_type),
            });
        }

        snapshots.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.book_id.cmp(&b.book_id))
                .then_with(|| a.side.cmp(&b.side))
        });

        let mut last_seen: HashMap<(&str, PickSide), DateTime<Utc>> = HashMap::new();
        for s in &snapshots {
            if let Some(prev) = last_seen.insert((s.book_id.as_str(), s.side), s.captured_at) {
                if prev >= s.captured_at {
                    return Err(EngineError::InvalidSeries {
                        context: key.to_string(),
                        reason: format!(
                            "book {} has two {} snapshots at {}",
                            s.book_id, s.side, s.captured_at
                        ),
                    });
                }
            }
        }

        Ok(Self { key, snapshots })
    }

    pub fn key(&self) -> &MarketKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &[LineSnapshot] {
        &self.snapshots
    }

    /// Distinct books, sorted.
    pub fn books(&self) -> Vec<&str> {
        let mut books: Vec<&str> = self.snapshots.iter().map(|s| s.book_id.as_str()).collect();
        books.sort_unstable();
        books.dedup();
        books
    }

    /// One book's quotes on one side, in time order.
    pub fn quotes<'a>(
        &'a self,
        book_id: &'a str,
        side: PickSide,
    ) -> impl Iterator<Item = &'a LineSnapshot> + 'a {
        self.snapshots
            .iter()
            .filter(move |s| s.book_id == book_id && s.side == side)
    }

    /// Earliest snapshot across all books.
    pub fn opening(&self) -> Option<&LineSnapshot> {
        self.snapshots.first()
    }

    /// Latest snapshot across all books.
    pub fn latest(&self) -> Option<&LineSnapshot> {
        self.snapshots.last()
    }

    /// Latest snapshot captured at or before `at`, optionally restricted to
    /// one book and one side. Never returns anything captured after `at`.
    pub fn as_of(
        &self,
        at: DateTime<Utc>,
        book_id: Option<&str>,
        side: Option<PickSide>,
    ) -> Option<&LineSnapshot> {
        self.snapshots
            .iter()
            .take_while(|s| s.captured_at <= at)
            .filter(|s| book_id.map_or(true, |b| s.book_id == b))
            .filter(|s| side.map_or(true, |sd| s.side == sd))
            .last()
    }

    /// Per-book series on the reference scale (see [`market_value`]).
    /// Each book is read from a single side so the moneyline margin never
    /// shows up as movement: home/over when the book quotes it, else the
    /// other side.
    pub fn book_series(&self) -> BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> {
        let mut series: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for book in self.books() {
            let primary = match self.key.bet_type {
                BetType::Total => PickSide::Over,
                _ => PickSide::Home,
            };
            let side = if self.quotes(book, primary).next().is_some() {
                primary
            } else {
                primary.opposite()
            };
            let points = self
                .quotes(book, side)
                .map(|s| (s.captured_at, market_value(s)))
                .collect();
            series.insert(book, points);
        }
        series
    }
}

/// Group raw snapshots into per-market buckets (unvalidated).
pub fn group_by_market(snapshots: &[LineSnapshot]) -> BTreeMap<MarketKey, Vec<LineSnapshot>> {
    let mut grouped: BTreeMap<MarketKey, Vec<LineSnapshot>> = BTreeMap::new();
    for s in snapshots {
        grouped
            .entry(MarketKey::new(s.game_id.clone(), s.bet_type))
            .or_default()
            .push(s.clone());
    }
    grouped
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
