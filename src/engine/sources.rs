//! Built-in signal sources backed by the historical store.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::data::{HistoricalStore, SignalSource, Slate, UnitOutput, UnitScope, WorkUnit};
use crate::lines::MarketKey;
use crate::signals::SignalDetector;
use crate::trends::TrendMatcher;
use crate::types::{EdgeSignal, EngineError};

fn unexpected_scope(unit: &WorkUnit) -> EngineError {
    EngineError::InsufficientData {
        context: unit.to_string(),
        reason: "unit scope does not belong to this source".into(),
    }
}

// ---------------------------------------------------------------------------
// Line movement
// ---------------------------------------------------------------------------

/// RLM and steam, one unit per `(game, bet_type)`.
pub struct LineMovementSource {
    store: Arc<dyn HistoricalStore>,
    detector: SignalDetector,
}

impl LineMovementSource {
    pub const NAME: &'static str = "line_movement";

    pub fn new(store: Arc<dyn HistoricalStore>, detector: SignalDetector) -> Self {
        Self { store, detector }
    }
}

#[async_trait]
impl SignalSource for LineMovementSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn units(&self, slate: &Slate) -> Vec<WorkUnit> {
        slate
            .games
            .iter()
            .flat_map(|g| {
                g.bet_types
                    .iter()
                    .map(|bt| WorkUnit::new(Self::NAME, &g.game_id, UnitScope::Market(*bt)))
            })
            .collect()
    }

    async fn produce(&self, unit: &WorkUnit, slate: &Slate) -> Result<UnitOutput, EngineError> {
        let UnitScope::Market(bet_type) = unit.scope else {
            return Err(unexpected_scope(unit));
        };

        let (mut lines, mut splits) = futures::future::try_join(
            self.store.fetch_lines(&unit.game_id, bet_type),
            self.store.fetch_splits(&unit.game_id, bet_type),
        )
        .await?;

        // No lookahead past the slate's clock.
        lines.retain(|s| s.captured_at <= slate.as_of);
        splits.retain(|s| s.observed_at <= slate.as_of);

        let key = MarketKey::new(&unit.game_id, bet_type);
        let found = self.detector.detect_market(&key, lines, &splits)?;
        debug!(unit = %unit, signals = found.len(), "Line movement scanned");

        let signals: Vec<EdgeSignal> = found
            .iter()
            .map(|s| s.to_edge_signal(self.detector.config()))
            .collect();
        Ok(signals.into())
    }
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Trend catalog matches, one unit per `(game, sport)`.
pub struct TrendSource {
    store: Arc<dyn HistoricalStore>,
    matcher: TrendMatcher,
}

impl TrendSource {
    pub const NAME: &'static str = "trends";

    pub fn new(store: Arc<dyn HistoricalStore>, matcher: TrendMatcher) -> Self {
        Self { store, matcher }
    }
}

#[async_trait]
impl SignalSource for TrendSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn units(&self, slate: &Slate) -> Vec<WorkUnit> {
        slate
            .games
            .iter()
            .filter(|g| !g.features.is_empty())
            .map(|g| WorkUnit::new(Self::NAME, &g.game_id, UnitScope::Sport(g.sport)))
            .collect()
    }

    async fn produce(&self, unit: &WorkUnit, slate: &Slate) -> Result<UnitOutput, EngineError> {
        let UnitScope::Sport(sport) = unit.scope else {
            return Err(unexpected_scope(unit));
        };
        let game = slate.game(&unit.game_id).ok_or_else(|| EngineError::InsufficientData {
            context: unit.to_string(),
            reason: "game is not on the slate".into(),
        })?;

        let catalog = self.store.fetch_trend_catalog(sport).await?;

        let mut output = UnitOutput::default();
        for features in &game.features {
            let report = self.matcher.match_game(features, &catalog);
            output.signals.extend(
                report
                    .matches
                    .iter()
                    .map(|m| m.to_edge_signal(&game.game_id, slate.as_of)),
            );
            // Each bad rule is found once per team; report it once per unit.
            for error in report.invalid {
                if !output.skipped.contains(&error) {
                    output.skipped.push(error);
                }
            }
        }
        if !output.skipped.is_empty() {
            warn!(unit = %unit, skipped = output.skipped.len(), "Trend rules skipped");
        }
        debug!(unit = %unit, rules = catalog.len(), signals = output.signals.len(), "Trends matched");
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
