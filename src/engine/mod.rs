//! Core engine: fan out over signal sources, join, rank.
//!
//! A scan splits the slate into independent units (one per market for
//! line movement, one per game for trends, one per external feed), runs
//! them concurrently and aggregates only once every unit has reported or
//! the scan was cancelled. Grading follows the same shape with one unit
//! per `(game, bet_type)`.

pub mod aggregator;
pub mod batch;
pub mod sources;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::data::{HistoricalStore, SignalSource, Slate, UnitScope, WorkUnit};
use crate::grading::record::RecordSummary;
use crate::grading::{GradingPolicy, OutcomeGrader};
use crate::signals::{SignalConfig, SignalDetector};
use crate::trends::{TrendConfig, TrendMatcher};
use crate::types::{BetType, EdgeSignal, EngineError, GradeOutcome, Pick};

use aggregator::{Aggregator, FeedConfig, FeedFilter};
use batch::{run_units, SkippedInput, UnitFailure};
use sources::{LineMovementSource, TrendSource};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between rescans in the binary; 0 scans once.
    pub scan_interval_secs: u64,
    /// Upper bound on units running at the same time.
    pub max_concurrent_units: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 300,
            max_concurrent_units: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    pub signals: Vec<EdgeSignal>,
    pub failures: Vec<UnitFailure>,
    /// Inputs completed units left out, with the reason.
    pub skipped: Vec<SkippedInput>,
    pub cancelled: bool,
    pub units: usize,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradedPick {
    pub pick: Pick,
    pub outcome: GradeOutcome,
}

/// A pick left pending, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct DeferredPick {
    pub pick_id: String,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GradingReport {
    pub graded: Vec<GradedPick>,
    pub deferred: Vec<DeferredPick>,
    pub failures: Vec<UnitFailure>,
    pub cancelled: bool,
}

impl GradingReport {
    pub fn record(&self) -> RecordSummary {
        RecordSummary::from_outcomes(self.graded.iter().map(|g| &g.outcome))
    }
}

#[derive(Debug, Default)]
struct GroupGrades {
    graded: Vec<GradedPick>,
    deferred: Vec<DeferredPick>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct EdgeEngine {
    store: Arc<dyn HistoricalStore>,
    sources: Vec<Arc<dyn SignalSource>>,
    aggregator: Aggregator,
    grader: Arc<OutcomeGrader>,
    config: EngineConfig,
}

impl EdgeEngine {
    /// Engine with the built-in line movement and trend sources.
    pub fn new(
        store: Arc<dyn HistoricalStore>,
        signals: SignalConfig,
        trends: TrendConfig,
        feed: FeedConfig,
        grading: GradingPolicy,
        config: EngineConfig,
    ) -> Self {
        let sources: Vec<Arc<dyn SignalSource>> = vec![
            Arc::new(LineMovementSource::new(store.clone(), SignalDetector::new(signals))),
            Arc::new(TrendSource::new(store.clone(), TrendMatcher::new(trends))),
        ];
        Self {
            store,
            sources,
            aggregator: Aggregator::new(feed),
            grader: Arc::new(OutcomeGrader::new(grading)),
            config,
        }
    }

    /// Add another producer (news, arbitrage, ...).
    pub fn with_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Scan the slate and return the full ranked feed, unfiltered.
    pub async fn scan_ranked(&self, slate: Arc<Slate>, cancel: watch::Receiver<bool>) -> FeedReport {
        let mut jobs = Vec::new();
        for source in &self.sources {
            for unit in source.units(&slate) {
                let source = source.clone();
                let slate = slate.clone();
                let job_unit = unit.clone();
                jobs.push((unit, async move { source.produce(&job_unit, &slate).await }));
            }
        }
        let units = jobs.len();
        info!(games = slate.games.len(), units, "Scanning slate");

        let outcome = run_units(jobs, self.config.max_concurrent_units, cancel).await;
        let mut batches: Vec<Vec<EdgeSignal>> = Vec::with_capacity(outcome.completed.len());
        let mut skipped = Vec::new();
        for (unit, output) in outcome.completed {
            skipped.extend(output.skipped.into_iter().map(|error| SkippedInput {
                unit: unit.clone(),
                error,
            }));
            batches.push(output.signals);
        }
        let signals = self.aggregator.rank(batches);

        if outcome.failures.is_empty() {
            info!(signals = signals.len(), skipped = skipped.len(), "Scan complete");
        } else {
            warn!(
                signals = signals.len(),
                failed_units = outcome.failures.len(),
                cancelled = outcome.cancelled,
                "Scan complete with failures"
            );
        }

        FeedReport {
            signals,
            failures: outcome.failures,
            skipped,
            cancelled: outcome.cancelled,
            units,
            as_of: slate.as_of,
        }
    }

    /// Scan and apply `filter`.
    pub async fn scan(&self, slate: Arc<Slate>, filter: &FeedFilter, cancel: watch::Receiver<bool>) -> FeedReport {
        let mut report = self.scan_ranked(slate, cancel).await;
        report.signals = self.aggregator.filter(&report.signals, filter);
        report
    }

    /// Grade every pending pick. Picks whose game is not final yet, or whose
    /// unit failed, stay pending and can be passed again later.
    pub async fn grade_picks(&self, picks: Vec<Pick>, cancel: watch::Receiver<bool>) -> GradingReport {
        let mut groups: BTreeMap<(String, BetType), Vec<Pick>> = BTreeMap::new();
        for pick in picks {
            if !pick.is_pending() {
                debug!(pick_id = %pick.id, "Skipping already graded pick");
                continue;
            }
            groups
                .entry((pick.game_id.clone(), pick.bet_type))
                .or_default()
                .push(pick);
        }

        let jobs: Vec<_> = groups
            .into_iter()
            .map(|((game_id, bet_type), picks)| {
                let unit = WorkUnit::new("grading", &game_id, UnitScope::Market(bet_type));
                let store = self.store.clone();
                let grader = self.grader.clone();
                (unit, async move { grade_group(store, grader, game_id, picks).await })
            })
            .collect();

        let outcome = run_units(jobs, self.config.max_concurrent_units, cancel).await;
        let mut report = GradingReport {
            failures: outcome.failures,
            cancelled: outcome.cancelled,
            ..GradingReport::default()
        };
        for (_, mut group) in outcome.completed {
            report.graded.append(&mut group.graded);
            report.deferred.append(&mut group.deferred);
        }

        info!(
            graded = report.graded.len(),
            deferred = report.deferred.len(),
            failed_units = report.failures.len(),
            record = %report.record(),
            "Grading complete"
        );
        report
    }
}

async fn grade_group(
    store: Arc<dyn HistoricalStore>,
    grader: Arc<OutcomeGrader>,
    game_id: String,
    picks: Vec<Pick>,
) -> Result<GroupGrades, EngineError> {
    let result = store.fetch_result(&game_id).await?;
    let mut group = GroupGrades::default();

    for mut pick in picks {
        let graded = grader
            .grade(&pick, &result)
            .and_then(|outcome| pick.mark_graded(&outcome).map(|_| outcome));
        match graded {
            Ok(outcome) => group.graded.push(GradedPick { pick, outcome }),
            Err(e) => {
                debug!(pick_id = %pick.id, error = %e, "Pick left pending");
                group.deferred.push(DeferredPick {
                    pick_id: pick.id.clone(),
                    reason: e.to_string(),
                    retryable: e.is_transient(),
                });
            }
        }
    }
    Ok(group)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
