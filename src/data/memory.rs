//! `HistoricalStore` over an in-memory dataset.

use async_trait::async_trait;
use std::collections::HashMap;

use super::HistoricalStore;
use crate::storage::Dataset;
use crate::trends::TrendRule;
use crate::types::{BetType, EngineError, GameResult, LineSnapshot, PublicSplit, Sport};

const SOURCE: &str = "memory";

/// Indexed copy of a [`Dataset`]. Immutable once built.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    lines: HashMap<(String, BetType), Vec<LineSnapshot>>,
    splits: HashMap<(String, BetType), Vec<PublicSplit>>,
    results: HashMap<String, GameResult>,
    rules: HashMap<Sport, Vec<TrendRule>>,
}

impl InMemoryStore {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut store = Self::default();
        for s in &dataset.lines {
            store
                .lines
                .entry((s.game_id.clone(), s.bet_type))
                .or_default()
                .push(s.clone());
        }
        for s in &dataset.splits {
            store
                .splits
                .entry((s.game_id.clone(), s.bet_type))
                .or_default()
                .push(s.clone());
        }
        for r in &dataset.results {
            store.results.insert(r.game_id.clone(), r.clone());
        }
        for rule in &dataset.trend_rules {
            store.rules.entry(rule.sport).or_default().push(rule.clone());
        }
        store
    }
}

#[async_trait]
impl HistoricalStore for InMemoryStore {
    async fn fetch_lines(&self, game_id: &str, bet_type: BetType) -> Result<Vec<LineSnapshot>, EngineError> {
        Ok(self
            .lines
            .get(&(game_id.to_string(), bet_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_splits(&self, game_id: &str, bet_type: BetType) -> Result<Vec<PublicSplit>, EngineError> {
        Ok(self
            .splits
            .get(&(game_id.to_string(), bet_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_result(&self, game_id: &str) -> Result<GameResult, EngineError> {
        self.results
            .get(game_id)
            .cloned()
            .ok_or_else(|| EngineError::unavailable(SOURCE, format!("no result for game {game_id}")))
    }

    async fn fetch_trend_catalog(&self, sport: Sport) -> Result<Vec<TrendRule>, EngineError> {
        Ok(self.rules.get(&sport).cloned().unwrap_or_default())
    }
}
