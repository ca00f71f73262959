//! Edge feed aggregation.
//!
//! Merges every producer's output into one feed: sanitise, collapse
//! duplicates of the same cause, rank, then filter. Filtering runs after
//! ranking, so `limit` always keeps a prefix of the full ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::types::{EdgeSignal, SignalType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Threshold `high_confidence_only` filters at.
    pub high_confidence_threshold: f64,
    /// Applied when a request does not set `limit`.
    pub default_limit: Option<usize>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.7,
            default_limit: None,
        }
    }
}

/// Request-side filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedFilter {
    #[serde(rename = "type")]
    pub signal_type: Option<SignalType>,
    pub min_confidence: Option<f64>,
    pub high_confidence_only: bool,
    pub limit: Option<usize>,
}

impl FeedFilter {
    pub fn of_type(signal_type: SignalType) -> Self {
        Self {
            signal_type: Some(signal_type),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct Aggregator {
    config: FeedConfig,
}

impl Aggregator {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Merge producer outputs into one ranked, unfiltered feed.
    pub fn rank(&self, batches: Vec<Vec<EdgeSignal>>) -> Vec<EdgeSignal> {
        let mut best: HashMap<(String, SignalType, String), EdgeSignal> = HashMap::new();
        let mut dropped = 0usize;

        for signal in batches.into_iter().flatten() {
            let Some(signal) = sanitise(signal) else {
                dropped += 1;
                continue;
            };
            let key = signal.dedupe_key();
            match best.get(&key) {
                Some(existing) if !supersedes(&signal, existing) => {}
                _ => {
                    best.insert(key, signal);
                }
            }
        }

        let mut ranked: Vec<EdgeSignal> = best.into_values().collect();
        ranked.sort_by(rank_order);
        debug!(signals = ranked.len(), dropped, "Feed ranked");
        ranked
    }

    /// Apply a request filter to a ranked feed.
    pub fn filter(&self, ranked: &[EdgeSignal], filter: &FeedFilter) -> Vec<EdgeSignal> {
        let min_confidence = self.effective_min_confidence(filter);
        let limit = filter.limit.or(self.config.default_limit).unwrap_or(usize::MAX);

        ranked
            .iter()
            .filter(|s| filter.signal_type.map_or(true, |t| s.signal_type == t))
            .filter(|s| min_confidence.map_or(true, |m| s.confidence >= m))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn aggregate(&self, batches: Vec<Vec<EdgeSignal>>, filter: &FeedFilter) -> Vec<EdgeSignal> {
        self.filter(&self.rank(batches), filter)
    }

    /// The stricter of the explicit floor and the high-confidence threshold.
    fn effective_min_confidence(&self, filter: &FeedFilter) -> Option<f64> {
        let high = filter
            .high_confidence_only
            .then_some(self.config.high_confidence_threshold);
        match (filter.min_confidence, high) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

fn sanitise(mut signal: EdgeSignal) -> Option<EdgeSignal> {
    if !signal.confidence.is_finite() || !signal.expected_value.is_finite() {
        warn!(
            game_id = %signal.game_id,
            cause = %signal.cause,
            confidence = signal.confidence,
            expected_value = signal.expected_value,
            "Dropping signal with non-finite score"
        );
        return None;
    }
    signal.confidence = signal.confidence.clamp(0.0, 1.0);
    Some(signal)
}

/// Whether `candidate` should replace `existing` as the feed's copy of a cause.
fn supersedes(candidate: &EdgeSignal, existing: &EdgeSignal) -> bool {
    candidate
        .confidence
        .total_cmp(&existing.confidence)
        .then_with(|| candidate.expected_value.total_cmp(&existing.expected_value))
        .then_with(|| existing.detected_at.cmp(&candidate.detected_at))
        .then_with(|| existing.id.cmp(&candidate.id))
        == Ordering::Greater
}

fn rank_order(a: &EdgeSignal, b: &EdgeSignal) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.expected_value.total_cmp(&a.expected_value))
        .then_with(|| a.detected_at.cmp(&b.detected_at))
        .then_with(|| a.game_id.cmp(&b.game_id))
        .then_with(|| a.signal_type.cmp(&b.signal_type))
        .then_with(|| a.cause.cmp(&b.cause))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    // ---- helpers -----------------------------------------------------------

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 13, 12, 0, 0).unwrap()
    }

    fn sig(t: SignalType, game: &str, cause: &str, conf: f64, ev: f64) -> EdgeSignal {
        EdgeSignal::new(t, game, cause, "test", conf, ev, t0())
    }

    fn feed() -> Vec<Vec<EdgeSignal>> {
        vec![
            vec![
                sig(SignalType::Bias, "g1", "rlm:spread:away", 0.62, 0.03),
                sig(SignalType::Bias, "g2", "rlm:total:under", 0.81, 0.02),
            ],
            vec![sig(SignalType::Volume, "g1", "steam:spread:away:1", 0.74, 0.05)],
            vec![
                sig(SignalType::Time, "g1", "trend:r1:away", 0.55, 0.08),
                sig(SignalType::Time, "g3", "trend:r2:home", 0.74, 0.09),
            ],
            vec![sig(SignalType::News, "g2", "qb_out", 0.9, 0.01)],
        ]
    }

    fn agg() -> Aggregator {
        Aggregator::new(FeedConfig::default())
    }

    fn causes(signals: &[EdgeSignal]) -> Vec<&str> {
        signals.iter().map(|s| s.cause.as_str()).collect()
    }

    // ---- tests -------------------------------------------------------------

    #[test]
    fn test_ranked_by_confidence_then_ev() {
        let ranked = agg().rank(feed());
        assert_eq!(
            causes(&ranked),
            vec![
                "qb_out",
                "rlm:total:under",
                "trend:r2:home",
                "steam:spread:away:1",
                "rlm:spread:away",
                "trend:r1:away",
            ]
        );
    }

    #[test]
    fn test_earlier_detection_wins_full_tie() {
        let mut late = sig(SignalType::News, "g1", "a", 0.5, 0.1);
        late.detected_at = t0() + Duration::minutes(5);
        let early = sig(SignalType::News, "g2", "b", 0.5, 0.1);
        let ranked = agg().rank(vec![vec![late, early]]);
        assert_eq!(causes(&ranked), vec!["b", "a"]);
    }

    #[test]
    fn test_duplicates_collapse_to_best() {
        let batches = vec![
            vec![sig(SignalType::Volume, "g1", "steam:x", 0.6, 0.02)],
            vec![sig(SignalType::Volume, "g1", "steam:x", 0.8, 0.01)],
            vec![sig(SignalType::Volume, "g1", "steam:x", 0.8, 0.00)],
            // Same cause, other type: distinct
            vec![sig(SignalType::Bias, "g1", "steam:x", 0.3, 0.0)],
        ];
        let ranked = agg().rank(batches);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].confidence, 0.8);
        assert_eq!(ranked[0].expected_value, 0.01);
    }

    #[test]
    fn test_limit_is_prefix_of_unlimited() {
        let a = agg();
        let ranked = a.rank(feed());
        for n in 0..=ranked.len() + 1 {
            let limited = a.filter(&ranked, &FeedFilter::default().with_limit(n));
            assert_eq!(limited.as_slice(), &ranked[..n.min(ranked.len())]);
        }
    }

    #[test]
    fn test_type_filter() {
        let out = agg().aggregate(feed(), &FeedFilter::of_type(SignalType::Time));
        assert_eq!(causes(&out), vec!["trend:r2:home", "trend:r1:away"]);
    }

    #[test]
    fn test_min_confidence_is_inclusive() {
        let filter = FeedFilter {
            min_confidence: Some(0.74),
            ..FeedFilter::default()
        };
        let out = agg().aggregate(feed(), &filter);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|s| s.confidence >= 0.74));
    }

    #[test]
    fn test_high_confidence_only_uses_stricter_floor() {
        let a = agg();
        let high = FeedFilter {
            high_confidence_only: true,
            ..FeedFilter::default()
        };
        assert_eq!(a.aggregate(feed(), &high).len(), 4);

        let both = FeedFilter {
            high_confidence_only: true,
            min_confidence: Some(0.8),
            ..FeedFilter::default()
        };
        assert_eq!(causes(&a.aggregate(feed(), &both)), vec!["qb_out", "rlm:total:under"]);

        let loose = FeedFilter {
            high_confidence_only: true,
            min_confidence: Some(0.1),
            ..FeedFilter::default()
        };
        assert_eq!(a.aggregate(feed(), &loose).len(), 4);
    }

    #[test]
    fn test_filters_apply_before_limit() {
        let filter = FeedFilter {
            signal_type: Some(SignalType::Bias),
            limit: Some(1),
            ..FeedFilter::default()
        };
        assert_eq!(causes(&agg().aggregate(feed(), &filter)), vec!["rlm:total:under"]);
    }

    #[test]
    fn test_sanitises_scores() {
        let batches = vec![vec![
            sig(SignalType::News, "g1", "over", 1.7, 0.02),
            sig(SignalType::News, "g1", "under", -0.2, 0.02),
            sig(SignalType::News, "g1", "nan", f64::NAN, 0.02),
            sig(SignalType::News, "g1", "inf_ev", 0.5, f64::INFINITY),
        ]];
        let ranked = agg().rank(batches);
        assert_eq!(causes(&ranked), vec!["over", "under"]);
        assert_eq!(ranked[0].confidence, 1.0);
        assert_eq!(ranked[1].confidence, 0.0);
    }

    #[test]
    fn test_default_limit_from_config() {
        let a = Aggregator::new(FeedConfig {
            default_limit: Some(2),
            ..FeedConfig::default()
        });
        assert_eq!(a.aggregate(feed(), &FeedFilter::default()).len(), 2);
        assert_eq!(a.aggregate(feed(), &FeedFilter::default().with_limit(3)).len(), 3);
    }

    #[test]
    fn test_filter_deserializes_from_query_shape() {
        let f: FeedFilter =
            serde_json::from_str(r#"{"type":"volume","min_confidence":0.5,"limit":10}"#).unwrap();
        assert_eq!(f.signal_type, Some(SignalType::Volume));
        assert_eq!(f.limit, Some(10));
        assert!(!f.high_confidence_only);
    }
}
