//! Collaborator boundary.
//!
//! `HistoricalStore` is the read side of whatever holds lines, splits,
//! results and the trend catalog. `SignalSource` is the common capability
//! every signal producer implements so the engine can fan out over them
//! without knowing what they are.

pub mod feed;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::trends::{GameFeatures, TrendRule};
use crate::types::{BetType, EdgeSignal, EngineError, GameResult, LineSnapshot, PublicSplit, Sport};

pub use feed::StaticSignalFeed;
pub use memory::InMemoryStore;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Read access to historical and live market data.
///
/// Implementations report outages as `DataSourceUnavailable`; the engine
/// isolates them to the unit that made the call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    async fn fetch_lines(&self, game_id: &str, bet_type: BetType) -> Result<Vec<LineSnapshot>, EngineError>;

    async fn fetch_splits(&self, game_id: &str, bet_type: BetType) -> Result<Vec<PublicSplit>, EngineError>;

    async fn fetch_result(&self, game_id: &str) -> Result<GameResult, EngineError>;

    async fn fetch_trend_catalog(&self, sport: Sport) -> Result<Vec<TrendRule>, EngineError>;
}

// ---------------------------------------------------------------------------
// Slate
// ---------------------------------------------------------------------------

fn all_bet_types() -> Vec<BetType> {
    BetType::ALL.to_vec()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlateGame {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    #[serde(default = "all_bet_types")]
    pub bet_types: Vec<BetType>,
    /// One feature set per team the trend catalog should be checked for.
    #[serde(default)]
    pub features: Vec<GameFeatures>,
}

/// The games a scan covers, evaluated as of `as_of`. Nothing captured
/// after `as_of` is considered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slate {
    pub as_of: DateTime<Utc>,
    pub games: Vec<SlateGame>,
}

impl Slate {
    pub fn game(&self, game_id: &str) -> Option<&SlateGame> {
        self.games.iter().find(|g| g.game_id == game_id)
    }
}

// ---------------------------------------------------------------------------
// Signal sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UnitScope {
    Market(BetType),
    Sport(Sport),
    Feed,
}

/// One independent piece of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkUnit {
    pub source: String,
    pub game_id: String,
    pub scope: UnitScope,
}

impl WorkUnit {
    pub fn new(source: impl Into<String>, game_id: impl Into<String>, scope: UnitScope) -> Self {
        Self {
            source: source.into(),
            game_id: game_id.into(),
            scope,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            UnitScope::Market(bt) => write!(f, "{}:{}/{}", self.source, self.game_id, bt),
            UnitScope::Sport(s) => write!(f, "{}:{}/{}", self.source, self.game_id, s),
            UnitScope::Feed if self.game_id.is_empty() => write!(f, "{}", self.source),
            UnitScope::Feed => write!(f, "{}:{}", self.source, self.game_id),
        }
    }
}

/// What one unit produced. `skipped` lists inputs the unit left out
/// (malformed trend rules, for instance) without failing as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOutput {
    pub signals: Vec<EdgeSignal>,
    pub skipped: Vec<EngineError>,
}

impl From<Vec<EdgeSignal>> for UnitOutput {
    fn from(signals: Vec<EdgeSignal>) -> Self {
        Self {
            signals,
            skipped: Vec::new(),
        }
    }
}

/// A producer of edge signals.
///
/// `units` splits the slate into independent pieces; `produce` handles one
/// of them. Each call runs as its own task and a failure only loses that
/// unit's output.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    fn units(&self, slate: &Slate) -> Vec<WorkUnit>;

    async fn produce(&self, unit: &WorkUnit, slate: &Slate) -> Result<UnitOutput, EngineError>;
}
