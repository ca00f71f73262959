//! Outcome grading.
//!
//! Settles a pick against the line frozen when it was placed. Grading is a
//! pure function of `(Pick, GameResult)`: no clock, no market lookups, no
//! persistence. Callers own the `pending → graded` transition.

pub mod clv;
pub mod record;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tracing::debug;

use crate::lines::LineHistory;
use crate::types::{
    BetType, EngineError, GameResult, GameStatus, GradeOutcome, GradeResult, Pick, PickSide, Sport,
};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How a moneyline pick settles when the game ends level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieSettlement {
    /// Stake returned; the default for two-way markets.
    Void,
    /// Both sides lose; three-way markets where the draw is its own outcome.
    Loss,
}

/// Explicit settlement policy. Ties are never silently defaulted: every
/// sport resolves through `moneyline_ties` or the documented `Void` rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GradingPolicy {
    /// Per-sport exceptions to the void-on-tie rule. A configured table is
    /// layered over the defaults; it does not replace them.
    #[serde(deserialize_with = "over_default_ties")]
    pub moneyline_ties: HashMap<Sport, TieSettlement>,
}

fn default_ties() -> HashMap<Sport, TieSettlement> {
    HashMap::from([(Sport::Soccer, TieSettlement::Loss)])
}

fn over_default_ties<'de, D>(deserializer: D) -> Result<HashMap<Sport, TieSettlement>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = HashMap::<Sport, TieSettlement>::deserialize(deserializer)?;
    let mut ties = default_ties();
    ties.extend(configured);
    Ok(ties)
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            moneyline_ties: default_ties(),
        }
    }
}

impl GradingPolicy {
    pub fn tie_settlement(&self, sport: Sport) -> TieSettlement {
        self.moneyline_ties
            .get(&sport)
            .copied()
            .unwrap_or(TieSettlement::Void)
    }
}

// ---------------------------------------------------------------------------
// Grader
// ---------------------------------------------------------------------------

pub struct OutcomeGrader {
    policy: GradingPolicy,
}

impl OutcomeGrader {
    pub fn new(policy: GradingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    /// Grade one pick.
    ///
    /// Postponed and cancelled games void. Scheduled and in-progress games
    /// return `IncompleteResult` so the caller can retry later.
    pub fn grade(&self, pick: &Pick, result: &GameResult) -> Result<GradeOutcome, EngineError> {
        if pick.game_id != result.game_id {
            return Err(EngineError::InvalidPick {
                pick_id: pick.id.clone(),
                reason: format!("result is for game {}, pick is on {}", result.game_id, pick.game_id),
            });
        }
        if !pick.bet_type.accepts(pick.side) {
            return Err(EngineError::InvalidPick {
                pick_id: pick.id.clone(),
                reason: format!("side {} is not valid for a {} bet", pick.side, pick.bet_type),
            });
        }

        match result.status {
            GameStatus::Final => {}
            GameStatus::Postponed | GameStatus::Cancelled => {
                return Ok(GradeOutcome {
                    pick_id: pick.id.clone(),
                    result: GradeResult::Void,
                    margin: Decimal::ZERO,
                });
            }
            status @ (GameStatus::Scheduled | GameStatus::InProgress) => {
                return Err(EngineError::IncompleteResult {
                    game_id: result.game_id.clone(),
                    status,
                });
            }
        }

        let home = Decimal::from(result.home_score);
        let away = Decimal::from(result.away_score);
        let line = pick.line_value_at_pick();

        let (grade, margin) = match pick.bet_type {
            BetType::Spread => {
                let diff = if pick.side == PickSide::Home { home - away } else { away - home };
                let margin = diff + line;
                (settle(margin), margin)
            }
            BetType::Total => {
                let combined = home + away;
                let margin = if pick.side == PickSide::Over {
                    combined - line
                } else {
                    line - combined
                };
                (settle(margin), margin)
            }
            BetType::Moneyline => {
                let margin = if pick.side == PickSide::Home { home - away } else { away - home };
                let grade = if margin.is_zero() {
                    match self.policy.tie_settlement(result.sport) {
                        TieSettlement::Void => GradeResult::Void,
                        TieSettlement::Loss => GradeResult::Loss,
                    }
                } else {
                    settle(margin)
                };
                (grade, margin)
            }
        };

        debug!(
            pick_id = %pick.id,
            game_id = %pick.game_id,
            bet_type = %pick.bet_type,
            side = %pick.side,
            line = %line,
            margin = %margin,
            result = %grade,
            "Pick graded"
        );

        Ok(GradeOutcome {
            pick_id: pick.id.clone(),
            result: grade,
            margin,
        })
    }
}

fn settle(margin: Decimal) -> GradeResult {
    if margin > Decimal::ZERO {
        GradeResult::Win
    } else if margin < Decimal::ZERO {
        GradeResult::Loss
    } else {
        GradeResult::Push
    }
}

/// Whether a line can produce a push: only whole numbers can.
pub fn can_push(line: Decimal) -> bool {
    line.fract().is_zero()
}

/// Create a pick whose line is frozen from the latest snapshot at or
/// before `placed_at` on the chosen book and side.
pub fn freeze_pick(
    id: impl Into<String>,
    history: &LineHistory,
    book_id: &str,
    side: PickSide,
    placed_at: DateTime<Utc>,
) -> Result<Pick, EngineError> {
    let id = id.into();
    let key = history.key();
    if !key.bet_type.accepts(side) {
        return Err(EngineError::InvalidPick {
            pick_id: id,
            reason: format!("side {side} is not valid for a {} bet", key.bet_type),
        });
    }

    // A spread quote on the other side converts by sign; totals share one number.
    let (snapshot, mirrored) = match history.as_of(placed_at, Some(book_id), Some(side)) {
        Some(s) => (s, false),
        None => match history.as_of(placed_at, Some(book_id), Some(side.opposite())) {
            Some(s) => (s, true),
            None => {
                return Err(EngineError::InsufficientData {
                    context: key.to_string(),
                    reason: format!("no {book_id} quote at or before {placed_at}"),
                })
            }
        },
    };

    let line = match (key.bet_type, mirrored) {
        (BetType::Spread, true) => -snapshot.line_value,
        _ => snapshot.line_value,
    };

    Ok(Pick::new(id, key.game_id.clone(), key.bet_type, side, line, placed_at))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
