//! Closing line value.
//!
//! Compares the line frozen on a pick with the last line before kickoff.
//! Positive CLV means the pick beat the close.

use rust_decimal::prelude::ToPrimitive;

use crate::lines::{against_side, implied_probability, market_value, LineHistory};
use crate::types::{BetType, EngineError, LineSnapshot, Pick, PickSide};

/// CLV of `pick` against `closing`, in points for spreads and totals and
/// in implied-probability points for moneylines.
///
/// For moneylines the pick's own price is not frozen, so `pick_price` must
/// be supplied; it is ignored for other bet types.
pub fn closing_line_value(
    pick: &Pick,
    closing: &LineSnapshot,
    pick_price: Option<i32>,
) -> Result<f64, EngineError> {
    if closing.game_id != pick.game_id || closing.bet_type != pick.bet_type {
        return Err(EngineError::InvalidPick {
            pick_id: pick.id.clone(),
            reason: format!(
                "closing line is for {}/{}, pick is on {}/{}",
                closing.game_id, closing.bet_type, pick.game_id, pick.bet_type
            ),
        });
    }

    let picked = pick.line_value_at_pick().to_f64().unwrap_or(0.0);
    let clv = match pick.bet_type {
        BetType::Spread => {
            // Express the closing number as the picked side's handicap.
            let close_home = market_value(closing);
            let close = if pick.side == PickSide::Home { close_home } else { -close_home };
            picked - close
        }
        BetType::Total => {
            let close = closing.line_value.to_f64().unwrap_or(0.0);
            if pick.side == PickSide::Over {
                close - picked
            } else {
                picked - close
            }
        }
        BetType::Moneyline => {
            let price = pick_price.ok_or_else(|| EngineError::InsufficientData {
                context: pick.id.clone(),
                reason: "moneyline CLV needs the price taken".into(),
            })?;
            let close_home = market_value(closing);
            let at_pick = implied_probability(price) * 100.0;
            // Larger closing probability for our side than what we paid = beat the close.
            let home_at_pick = if pick.side == PickSide::Home { at_pick } else { 100.0 - at_pick };
            against_side(BetType::Moneyline, pick.side, home_at_pick)
                - against_side(BetType::Moneyline, pick.side, close_home)
        }
    };
    Ok(clv)
}

/// The closing snapshot for a book: the last quote on the picked side (or
/// its mirror) captured before `starts_at`.
pub fn closing_snapshot<'a>(
    history: &'a LineHistory,
    book_id: &str,
    side: PickSide,
    starts_at: chrono::DateTime<chrono::Utc>,
) -> Option<&'a LineSnapshot> {
    let before = starts_at - chrono::Duration::nanoseconds(1);
    history
        .as_of(before, Some(book_id), Some(side))
        .or_else(|| history.as_of(before, Some(book_id), Some(side.opposite())))
}
