//! Situational trend matching.
//!
//! A game is described by a small set of features, seen from one team's
//! side. Each catalog rule carries a predicate over those features and a
//! historical record. Matching rules are scored by the shrunk lower bound
//! of their win rate, so thin records rank below deep ones.

pub mod confidence;
pub mod predicate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::grading::record::RecordSummary;
use crate::types::{EdgeSignal, EngineError, PickSide, SignalType, Sport};

pub use confidence::{wilson_lower_bound, TrendConfig};
pub use predicate::{Clause, CompiledPredicate, Op, Predicate, Truth};

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn side(&self) -> PickSide {
        match self {
            Venue::Home => PickSide::Home,
            Venue::Away => PickSide::Away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Favorite,
    Underdog,
    PickEm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Early,
    Mid,
    Late,
    Postseason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Dome,
    Clear,
    Rain,
    Snow,
    Wind,
    Cold,
}

/// Situational attributes of one team in one game. Optional fields the
/// feed could not supply are `None` and make clauses on them unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameFeatures {
    pub game_id: String,
    pub sport: Sport,
    pub team: String,
    pub venue: Venue,
    #[serde(default)]
    pub role: Option<Role>,
    /// Team rest days minus opponent rest days.
    #[serde(default)]
    pub rest_days_diff: Option<i32>,
    #[serde(default)]
    pub divisional: Option<bool>,
    #[serde(default)]
    pub season: Option<Season>,
    #[serde(default)]
    pub weather: Option<Weather>,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRule {
    pub id: String,
    pub sport: Sport,
    pub predicate: Predicate,
    pub historical_record: RecordSummary,
    /// Return on investment per unit staked over the record.
    pub roi: f64,
    pub sample_size: u32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendMatch {
    pub rule: TrendRule,
    /// Team the rule matched for.
    pub team: String,
    pub venue: Venue,
    pub confidence: f64,
}

impl TrendMatch {
    pub fn to_edge_signal(&self, game_id: &str, detected_at: DateTime<Utc>) -> EdgeSignal {
        let record = &self.rule.historical_record;
        let description = format!(
            "{} ({}) fits {}: {} ATS, ROI {:+.1}% over {} games",
            self.team,
            self.venue.side(),
            self.rule.id,
            record,
            self.rule.roi * 100.0,
            self.rule.sample_size
        );
        EdgeSignal::new(
            SignalType::Time,
            game_id,
            format!("trend:{}:{}", self.rule.id, self.venue.side()),
            description,
            self.confidence,
            self.rule.roi,
            detected_at,
        )
        .with_sources(vec![self.rule.id.clone()])
    }
}

#[derive(Debug, Default)]
pub struct MatchReport {
    /// Ordered best first.
    pub matches: Vec<TrendMatch>,
    /// Rules skipped for malformed predicates.
    pub invalid: Vec<EngineError>,
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

pub struct TrendMatcher {
    config: TrendConfig,
}

impl TrendMatcher {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn confidence(&self, record: &RecordSummary) -> f64 {
        wilson_lower_bound(record.wins, record.losses, &self.config)
    }

    /// Evaluate every rule for the game's sport against `game`.
    pub fn match_game(&self, game: &GameFeatures, rules: &[TrendRule]) -> MatchReport {
        let mut report = MatchReport::default();

        for rule in rules.iter().filter(|r| r.sport == game.sport) {
            let compiled = match rule.predicate.compile(&rule.id) {
                Ok(c) => c,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Skipping invalid trend rule");
                    report.invalid.push(e);
                    continue;
                }
            };
            if !compiled.matches(game) {
                continue;
            }
            let confidence = self.confidence(&rule.historical_record);
            debug!(
                game_id = %game.game_id,
                team = %game.team,
                rule_id = %rule.id,
                record = %rule.historical_record,
                confidence,
                "Trend match"
            );
            report.matches.push(TrendMatch {
                rule: rule.clone(),
                team: game.team.clone(),
                venue: game.venue,
                confidence,
            });
        }

        report.matches.sort_by(rank);
        report
    }
}

fn rank(a: &TrendMatch, b: &TrendMatch) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.rule.sample_size.cmp(&a.rule.sample_size))
        .then_with(|| b.rule.last_updated.cmp(&a.rule.last_updated))
        .then_with(|| a.rule.id.cmp(&b.rule.id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
