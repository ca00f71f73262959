//! Shared types for the SHARPLINE engine.
//!
//! These types form the data model used across all modules. Grading,
//! signal detection, trend matching and the feed aggregator all depend on
//! them, never on each other's internals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Market type a snapshot or pick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Spread,
    Total,
    Moneyline,
}

impl BetType {
    pub const ALL: &'static [BetType] = &[BetType::Spread, BetType::Total, BetType::Moneyline];

    /// Whether `side` is a legal side for this bet type.
    pub fn accepts(&self, side: PickSide) -> bool {
        match self {
            BetType::Spread | BetType::Moneyline => side.is_team(),
            BetType::Total => !side.is_team(),
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Spread => write!(f, "spread"),
            BetType::Total => write!(f, "total"),
            BetType::Moneyline => write!(f, "moneyline"),
        }
    }
}

impl std::str::FromStr for BetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spread" | "ats" => Ok(BetType::Spread),
            "total" | "totals" | "ou" => Ok(BetType::Total),
            "moneyline" | "ml" => Ok(BetType::Moneyline),
            _ => Err(anyhow::anyhow!("Unknown bet type: {s}")),
        }
    }
}

/// The side of a market: a team for spread/moneyline, over/under for totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickSide {
    Home,
    Away,
    Over,
    Under,
}

impl PickSide {
    /// The opposite side of the same market.
    pub fn opposite(&self) -> Self {
        match self {
            PickSide::Home => PickSide::Away,
            PickSide::Away => PickSide::Home,
            PickSide::Over => PickSide::Under,
            PickSide::Under => PickSide::Over,
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, PickSide::Home | PickSide::Away)
    }
}

impl fmt::Display for PickSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickSide::Home => write!(f, "home"),
            PickSide::Away => write!(f, "away"),
            PickSide::Over => write!(f, "over"),
            PickSide::Under => write!(f, "under"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Nfl,
    Ncaaf,
    Nba,
    Ncaab,
    Mlb,
    Nhl,
    Soccer,
    Other,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Nfl => "nfl",
            Sport::Ncaaf => "ncaaf",
            Sport::Nba => "nba",
            Sport::Ncaab => "ncaab",
            Sport::Mlb => "mlb",
            Sport::Nhl => "nhl",
            Sport::Soccer => "soccer",
            Sport::Other => "other",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempt to parse a string into a Sport (case-insensitive).
impl std::str::FromStr for Sport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nfl" => Ok(Sport::Nfl),
            "ncaaf" | "cfb" => Ok(Sport::Ncaaf),
            "nba" => Ok(Sport::Nba),
            "ncaab" | "cbb" => Ok(Sport::Ncaab),
            "mlb" => Ok(Sport::Mlb),
            "nhl" => Ok(Sport::Nhl),
            "soccer" | "football" | "epl" | "mls" => Ok(Sport::Soccer),
            "other" => Ok(Sport::Other),
            _ => Err(anyhow::anyhow!("Unknown sport: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A single observed price for one side of one market at one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub game_id: String,
    pub bet_type: BetType,
    pub side: PickSide,
    pub book_id: String,
    /// Handicap for spreads, the number for totals, unused (0) for moneylines.
    pub line_value: Decimal,
    /// American odds, e.g. -110 or +145.
    pub price: i32,
    pub captured_at: DateTime<Utc>,
}

impl fmt::Display for LineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} ({:+}) @ {}",
            self.book_id,
            self.game_id,
            self.bet_type,
            self.side,
            self.line_value,
            self.price,
            self.captured_at.format("%Y-%m-%d %H:%M"),
        )
    }
}

/// Public betting percentages for one side of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicSplit {
    pub game_id: String,
    pub bet_type: BetType,
    pub side: PickSide,
    /// Share of tickets on this side (0–100).
    pub ticket_pct: f64,
    /// Share of money on this side (0–100), when the source publishes it.
    #[serde(default)]
    pub handle_pct: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Cancelled,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Scheduled => write!(f, "scheduled"),
            GameStatus::InProgress => write!(f, "in_progress"),
            GameStatus::Final => write!(f, "final"),
            GameStatus::Postponed => write!(f, "postponed"),
            GameStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Score and status of a game, owned by the results collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub game_id: String,
    pub sport: Sport,
    pub home_score: u32,
    pub away_score: u32,
    pub status: GameStatus,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}-{} ({})",
            self.game_id, self.sport, self.home_score, self.away_score, self.status
        )
    }
}

// ---------------------------------------------------------------------------
// Picks & grading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStatus {
    #[default]
    Pending,
    Graded,
}

/// A wager recommendation. The line is captured once, when the pick is
/// created, and can never be rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub id: String,
    pub game_id: String,
    pub bet_type: BetType,
    pub side: PickSide,
    line_value_at_pick: Decimal,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    status: PickStatus,
}

impl Pick {
    pub fn new(
        id: impl Into<String>,
        game_id: impl Into<String>,
        bet_type: BetType,
        side: PickSide,
        line_value_at_pick: Decimal,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            game_id: game_id.into(),
            bet_type,
            side,
            line_value_at_pick,
            placed_at,
            status: PickStatus::Pending,
        }
    }

    /// The line frozen at creation time.
    pub fn line_value_at_pick(&self) -> Decimal {
        self.line_value_at_pick
    }

    pub fn status(&self) -> PickStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == PickStatus::Pending
    }

    /// One-way `pending → graded` transition. The caller persists the
    /// outcome; a second call is rejected.
    pub fn mark_graded(&mut self, outcome: &GradeOutcome) -> Result<(), EngineError> {
        if outcome.pick_id != self.id {
            return Err(EngineError::InvalidPick {
                pick_id: self.id.clone(),
                reason: format!("outcome belongs to pick {}", outcome.pick_id),
            });
        }
        if self.status == PickStatus::Graded {
            return Err(EngineError::AlreadyGraded(self.id.clone()));
        }
        self.status = PickStatus::Graded;
        Ok(())
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} @ {} ({:?})",
            self.id, self.game_id, self.bet_type, self.side, self.line_value_at_pick, self.status
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeResult {
    Win,
    Loss,
    Push,
    Void,
}

impl fmt::Display for GradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeResult::Win => write!(f, "WIN"),
            GradeResult::Loss => write!(f, "LOSS"),
            GradeResult::Push => write!(f, "PUSH"),
            GradeResult::Void => write!(f, "VOID"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub pick_id: String,
    pub result: GradeResult,
    /// Distance from the line on the picked side's terms (positive = won by).
    pub margin: Decimal,
}

impl fmt::Display for GradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (margin {})", self.pick_id, self.result, self.margin)
    }
}

// ---------------------------------------------------------------------------
// Edge signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Public bias against the market (reverse line movement).
    Bias,
    /// Coordinated volume across books (steam).
    Volume,
    News,
    Arbitrage,
    /// Situational / schedule trend.
    Time,
}

impl SignalType {
    pub const ALL: &'static [SignalType] = &[
        SignalType::Bias,
        SignalType::Volume,
        SignalType::News,
        SignalType::Arbitrage,
        SignalType::Time,
    ];
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Bias => write!(f, "bias"),
            SignalType::Volume => write!(f, "volume"),
            SignalType::News => write!(f, "news"),
            SignalType::Arbitrage => write!(f, "arbitrage"),
            SignalType::Time => write!(f, "time"),
        }
    }
}

impl std::str::FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bias" | "rlm" => Ok(SignalType::Bias),
            "volume" | "steam" => Ok(SignalType::Volume),
            "news" => Ok(SignalType::News),
            "arbitrage" | "arb" => Ok(SignalType::Arbitrage),
            "time" | "trend" => Ok(SignalType::Time),
            _ => Err(anyhow::anyhow!("Unknown signal type: {s}")),
        }
    }
}

/// One ranked entry of the edge feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSignal {
    pub id: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub game_id: String,
    /// Identifies the underlying cause; signals sharing
    /// `(game_id, type, cause)` are duplicates.
    pub cause: String,
    pub description: String,
    /// 0.0–1.0
    pub confidence: f64,
    /// Expected value per unit staked.
    pub expected_value: f64,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub source_ids: Vec<String>,
}

impl fmt::Display for EdgeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} conf={:.0}% ev={:+.3} | {}",
            self.signal_type,
            self.game_id,
            self.confidence * 100.0,
            self.expected_value,
            self.description,
        )
    }
}

impl EdgeSignal {
    pub fn new(
        signal_type: SignalType,
        game_id: impl Into<String>,
        cause: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        expected_value: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signal_type,
            game_id: game_id.into(),
            cause: cause.into(),
            description: description.into(),
            confidence,
            expected_value,
            detected_at,
            source_ids: Vec::new(),
        }
    }

    pub fn with_sources(mut self, source_ids: Vec<String>) -> Self {
        self.source_ids = source_ids;
        self
    }

    /// Key used to collapse duplicates of the same underlying cause.
    pub fn dedupe_key(&self) -> (String, SignalType, String) {
        (self.game_id.clone(), self.signal_type, self.cause.clone())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SHARPLINE.
///
/// Cloneable so failures can be carried inside batch reports.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Result for {game_id} is not final (status: {status})")]
    IncompleteResult { game_id: String, status: GameStatus },

    #[error("Insufficient data for {context}: {reason}")]
    InsufficientData { context: String, reason: String },

    #[error("Data source unavailable ({data_source}): {message}")]
    DataSourceUnavailable { data_source: String, message: String },

    #[error("Invalid predicate in rule {rule_id}: {reason}")]
    InvalidPredicate { rule_id: String, reason: String },

    #[error("Invalid line series for {context}: {reason}")]
    InvalidSeries { context: String, reason: String },

    #[error("Invalid pick {pick_id}: {reason}")]
    InvalidPick { pick_id: String, reason: String },

    #[error("Pick already graded: {0}")]
    AlreadyGraded(String),

    #[error("Work unit panicked: {0}")]
    UnitPanicked(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn unavailable(data_source: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::DataSourceUnavailable {
            data_source: data_source.into(),
            message: message.into(),
        }
    }

    /// Whether retrying later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::IncompleteResult { .. } | EngineError::DataSourceUnavailable { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
