//! Mock historical store for integration testing.
//!
//! Wraps a fixed dataset and can be told to fail or stall for specific
//! games, so partial failure and cancellation can be exercised end to end.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sharpline::data::{HistoricalStore, InMemoryStore};
use sharpline::storage::Dataset;
use sharpline::trends::TrendRule;
use sharpline::types::*;

pub struct MockStore {
    inner: InMemoryStore,
    failing: Arc<Mutex<HashSet<String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockStore {
    pub fn new(dataset: &Dataset) -> Self {
        Self {
            inner: InMemoryStore::from_dataset(dataset),
            failing: Arc::new(Mutex::new(HashSet::new())),
            delays: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Every call touching `game_id` returns `DataSourceUnavailable`.
    pub fn fail_game(&self, game_id: &str) {
        self.failing.lock().unwrap().insert(game_id.to_string());
    }

    /// Every call touching `game_id` sleeps first.
    pub fn delay_game(&self, game_id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(game_id.to_string(), delay);
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    async fn enter(&self, game_id: &str) -> Result<(), EngineError> {
        *self.calls.lock().unwrap() += 1;
        let delay = self.delays.lock().unwrap().get(game_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(game_id) {
            return Err(EngineError::unavailable("mock", format!("forced outage for {game_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoricalStore for MockStore {
    async fn fetch_lines(&self, game_id: &str, bet_type: BetType) -> Result<Vec<LineSnapshot>, EngineError> {
        self.enter(game_id).await?;
        self.inner.fetch_lines(game_id, bet_type).await
    }

    async fn fetch_splits(&self, game_id: &str, bet_type: BetType) -> Result<Vec<PublicSplit>, EngineError> {
        self.enter(game_id).await?;
        self.inner.fetch_splits(game_id, bet_type).await
    }

    async fn fetch_result(&self, game_id: &str) -> Result<GameResult, EngineError> {
        self.enter(game_id).await?;
        self.inner.fetch_result(game_id).await
    }

    async fn fetch_trend_catalog(&self, sport: Sport) -> Result<Vec<TrendRule>, EngineError> {
        *self.calls.lock().unwrap() += 1;
        self.inner.fetch_trend_catalog(sport).await
    }
}
