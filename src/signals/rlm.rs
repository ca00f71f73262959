//! Reverse line movement.
//!
//! The public piles onto one side, yet the number moves in the other
//! direction. Each book's open and current quotes are compared on the same
//! side, then re-expressed on the majority side's terms via
//! [`against_side`], so one threshold check covers every bet type. The
//! book with the largest move against the majority carries the signal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::SignalConfig;
use crate::lines::{against_side, market_value, LineHistory, MarketKey};
use crate::types::{BetType, EngineError, LineSnapshot, PickSide, PublicSplit};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReverseLineMovement {
    pub game_id: String,
    pub bet_type: BetType,
    /// Side holding the ticket majority.
    pub majority_side: PickSide,
    pub ticket_pct: f64,
    pub handle_pct: Option<f64>,
    /// Opening and current numbers on the reference scale.
    pub open_value: f64,
    pub current_value: f64,
    /// Size of the move against the majority (always positive).
    pub delta: f64,
    pub strength: f64,
    /// Book whose open and current quotes were compared.
    pub book: String,
    pub detected_at: DateTime<Utc>,
}

impl ReverseLineMovement {
    /// The side the market is leaning toward.
    pub fn sharp_side(&self) -> PickSide {
        self.majority_side.opposite()
    }
}

/// Latest split per side, with the side holding the ticket majority.
///
/// Returns `Ok(None)` when nobody is above 50% (or the configured floor).
pub fn majority_side<'a>(
    market: &MarketKey,
    splits: &'a [PublicSplit],
    min_ticket_pct: f64,
) -> Result<Option<&'a PublicSplit>, EngineError> {
    let mut latest: HashMap<PickSide, &PublicSplit> = HashMap::new();
    for split in splits
        .iter()
        .filter(|s| s.game_id == market.game_id && s.bet_type == market.bet_type)
    {
        if !split.ticket_pct.is_finite() || !(0.0..=100.0).contains(&split.ticket_pct) {
            return Err(EngineError::InvalidSeries {
                context: market.to_string(),
                reason: format!("ticket_pct {} out of range", split.ticket_pct),
            });
        }
        let prev_at = latest.get(&split.side).map(|p| p.observed_at);
        match prev_at {
            Some(at) if at == split.observed_at => {
                return Err(EngineError::InvalidSeries {
                    context: market.to_string(),
                    reason: format!("two {} splits at {}", split.side, split.observed_at),
                });
            }
            Some(at) if at > split.observed_at => {}
            _ => {
                latest.insert(split.side, split);
            }
        }
    }

    let floor = min_ticket_pct.max(50.0);
    let majority = latest
        .into_values()
        .filter(|s| s.ticket_pct > floor)
        .max_by(|a, b| {
            a.ticket_pct
                .total_cmp(&b.ticket_pct)
                .then_with(|| b.side.cmp(&a.side))
        });
    Ok(majority)
}

/// Check one market for reverse line movement.
pub fn detect_rlm(
    history: &LineHistory,
    splits: &[PublicSplit],
    config: &SignalConfig,
) -> Result<Option<ReverseLineMovement>, EngineError> {
    if history.len() < 2 {
        return Ok(None);
    }
    let market = history.key();
    let Some(majority) = majority_side(market, splits, config.rlm_min_ticket_pct)? else {
        return Ok(None);
    };
    let bet_type = market.bet_type;

    // Largest same-book, same-side move against the majority.
    let mut best: Option<(f64, &LineSnapshot, &LineSnapshot)> = None;
    for book in history.books() {
        let quotes = [majority.side, majority.side.opposite()]
            .into_iter()
            .map(|side| history.quotes(book, side).collect::<Vec<_>>())
            .find(|quotes| quotes.len() >= 2);
        let Some(quotes) = quotes else { continue };
        let (open, current) = (quotes[0], quotes[quotes.len() - 1]);
        let delta = against_side(bet_type, majority.side, market_value(current))
            - against_side(bet_type, majority.side, market_value(open));
        if best.map_or(true, |(d, _, _)| delta > d) {
            best = Some((delta, open, current));
        }
    }
    let Some((delta, open, current)) = best else {
        return Ok(None);
    };
    let open_value = market_value(open);
    let current_value = market_value(current);
    let threshold = config.rlm_threshold_for(bet_type);

    if delta + f64::EPSILON < threshold {
        return Ok(None);
    }

    let skew = (majority.ticket_pct - 50.0) / 50.0;
    let strength = (delta / threshold) * skew;

    debug!(
        market = %market,
        majority = %majority.side,
        ticket_pct = majority.ticket_pct,
        delta,
        strength,
        book = %current.book_id,
        "Reverse line movement"
    );

    Ok(Some(ReverseLineMovement {
        game_id: market.game_id.clone(),
        bet_type,
        majority_side: majority.side,
        ticket_pct: majority.ticket_pct,
        handle_pct: majority.handle_pct,
        open_value,
        current_value,
        delta,
        strength,
        book: current.book_id.clone(),
        detected_at: current.captured_at.max(majority.observed_at),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
