//! Line-movement signal detection.
//!
//! Snapshots and public splits are grouped per market and each market is
//! evaluated on its own. A market with a broken series lands in
//! [`DetectionReport::skipped`]; the rest of the slate still runs.

pub mod rlm;
pub mod steam;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::lines::{group_by_market, LineHistory, MarketKey};
use crate::types::{BetType, EdgeSignal, EngineError, LineSnapshot, PublicSplit, SignalType};

pub use rlm::{detect_rlm, ReverseLineMovement};
pub use steam::{detect_steam, LineDirection, SteamMove};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Minimum move against the public, in points (spread/total).
    pub rlm_threshold: f64,
    /// Same, in implied-probability points.
    pub rlm_moneyline_threshold: f64,
    /// Ticket share the majority must exceed (never below 50).
    pub rlm_min_ticket_pct: f64,
    pub steam_window_secs: i64,
    pub steam_threshold: f64,
    pub steam_moneyline_threshold: f64,
    pub min_books: usize,
    /// EV per point of line moved.
    pub ev_per_point: f64,
    /// EV per implied-probability point moved.
    pub ev_per_probability_point: f64,
    /// Maps strength to confidence: `1 - exp(-scale * strength)`.
    pub confidence_scale: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rlm_threshold: 1.0,
            rlm_moneyline_threshold: 3.0,
            rlm_min_ticket_pct: 50.0,
            steam_window_secs: 1800,
            steam_threshold: 0.5,
            steam_moneyline_threshold: 2.0,
            min_books: 3,
            ev_per_point: 0.03,
            ev_per_probability_point: 0.01,
            confidence_scale: 1.0,
        }
    }
}

impl SignalConfig {
    pub fn rlm_threshold_for(&self, bet_type: BetType) -> f64 {
        match bet_type {
            BetType::Moneyline => self.rlm_moneyline_threshold,
            _ => self.rlm_threshold,
        }
    }

    pub fn steam_threshold_for(&self, bet_type: BetType) -> f64 {
        match bet_type {
            BetType::Moneyline => self.steam_moneyline_threshold,
            _ => self.steam_threshold,
        }
    }

    pub fn steam_window(&self) -> Duration {
        Duration::seconds(self.steam_window_secs.max(0))
    }

    fn ev_per_unit(&self, bet_type: BetType) -> f64 {
        match bet_type {
            BetType::Moneyline => self.ev_per_probability_point,
            _ => self.ev_per_point,
        }
    }

    fn confidence(&self, strength: f64) -> f64 {
        (1.0 - (-self.confidence_scale * strength.max(0.0)).exp()).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketSignal {
    Rlm(ReverseLineMovement),
    Steam(SteamMove),
}

impl MarketSignal {
    pub fn game_id(&self) -> &str {
        match self {
            MarketSignal::Rlm(r) => &r.game_id,
            MarketSignal::Steam(s) => &s.game_id,
        }
    }

    pub fn strength(&self) -> f64 {
        match self {
            MarketSignal::Rlm(r) => r.strength,
            MarketSignal::Steam(s) => s.strength,
        }
    }

    /// Convert to a feed entry. RLM is a `bias` signal, steam a `volume` one.
    pub fn to_edge_signal(&self, config: &SignalConfig) -> EdgeSignal {
        let confidence = config.confidence(self.strength());
        match self {
            MarketSignal::Rlm(r) => {
                let sharp = r.sharp_side();
                let ev = r.delta * config.ev_per_unit(r.bet_type) * confidence;
                let description = format!(
                    "{:.0}% of tickets on {} {} but the line moved {:.1} the other way ({:.1} -> {:.1})",
                    r.ticket_pct, r.majority_side, r.bet_type, r.delta, r.open_value, r.current_value
                );
                EdgeSignal::new(
                    SignalType::Bias,
                    &r.game_id,
                    format!("rlm:{}:{}", r.bet_type, sharp),
                    description,
                    confidence,
                    ev,
                    r.detected_at,
                )
                .with_sources(vec![r.book.clone()])
            }
            MarketSignal::Steam(s) => {
                let side = s.side_backed();
                let ev = s.avg_move * config.ev_per_unit(s.bet_type) * confidence;
                let description = format!(
                    "{} books moved {} {} {:.1} within {}m",
                    s.books.len(),
                    s.bet_type,
                    s.direction,
                    s.avg_move,
                    (s.window_end - s.window_start).num_minutes()
                );
                EdgeSignal::new(
                    SignalType::Volume,
                    &s.game_id,
                    format!("steam:{}:{}:{}", s.bet_type, side, s.window_start.timestamp()),
                    description,
                    confidence,
                    ev,
                    s.window_end,
                )
                .with_sources(s.books.clone())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DetectionReport {
    pub signals: Vec<MarketSignal>,
    /// Markets whose inputs were malformed, with the reason.
    pub skipped: Vec<(MarketKey, EngineError)>,
}

impl DetectionReport {
    pub fn edge_signals(&self, config: &SignalConfig) -> Vec<EdgeSignal> {
        self.signals.iter().map(|s| s.to_edge_signal(config)).collect()
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct SignalDetector {
    config: SignalConfig,
}

impl SignalDetector {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Run RLM and steam over every market present in `lines`.
    pub fn detect(&self, lines: &[LineSnapshot], splits: &[PublicSplit]) -> DetectionReport {
        let mut report = DetectionReport::default();
        for (key, snapshots) in group_by_market(lines) {
            match self.detect_market(&key, snapshots, splits) {
                Ok(mut found) => report.signals.append(&mut found),
                Err(e) => {
                    warn!(market = %key, error = %e, "Skipping market");
                    report.skipped.push((key, e));
                }
            }
        }
        debug!(
            signals = report.signals.len(),
            skipped = report.skipped.len(),
            "Line-movement detection complete"
        );
        report
    }

    /// Evaluate a single market. Splits for other markets are ignored.
    pub fn detect_market(
        &self,
        key: &MarketKey,
        snapshots: Vec<LineSnapshot>,
        splits: &[PublicSplit],
    ) -> Result<Vec<MarketSignal>, EngineError> {
        let history = LineHistory::new(key.clone(), snapshots)?;
        if history.len() < 2 {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        if let Some(r) = detect_rlm(&history, splits, &self.config)? {
            found.push(MarketSignal::Rlm(r));
        }
        found.extend(detect_steam(&history, &self.config).into_iter().map(MarketSignal::Steam));
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PickSide;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    // ---- helpers -----------------------------------------------------------

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 13, 12, 0, 0).unwrap()
    }

    fn snap(game: &str, book: &str, line: Decimal, mins: i64) -> LineSnapshot {
        LineSnapshot {
            game_id: game.into(),
            bet_type: BetType::Spread,
            side: PickSide::Home,
            book_id: book.into(),
            line_value: line,
            price: -110,
            captured_at: t0() + Duration::minutes(mins),
        }
    }

    fn split(game: &str, side: PickSide, pct: f64) -> PublicSplit {
        PublicSplit {
            game_id: game.into(),
            bet_type: BetType::Spread,
            side,
            ticket_pct: pct,
            handle_pct: Some(pct - 10.0),
            observed_at: t0() + Duration::minutes(30),
        }
    }

    // ---- tests -------------------------------------------------------------

    #[test]
    fn test_config_thresholds_by_bet_type() {
        let config = SignalConfig::default();
        assert_eq!(config.rlm_threshold_for(BetType::Spread), 1.0);
        assert_eq!(config.rlm_threshold_for(BetType::Moneyline), 3.0);
        assert_eq!(config.steam_threshold_for(BetType::Total), 0.5);
        assert_eq!(config.steam_window(), Duration::minutes(30));
    }

    #[test]
    fn test_confidence_is_bounded_and_monotonic() {
        let config = SignalConfig::default();
        assert_eq!(config.confidence(0.0), 0.0);
        assert!(config.confidence(0.5) < config.confidence(1.0));
        assert!(config.confidence(100.0) <= 1.0);
    }

    #[test]
    fn test_detect_rlm_into_bias_signal() {
        let detector = SignalDetector::new(SignalConfig::default());
        let lines = vec![snap("g1", "a", dec!(-7), 0), snap("g1", "a", dec!(-5.5), 60)];
        let splits = vec![split("g1", PickSide::Home, 72.0), split("g1", PickSide::Away, 28.0)];
        let report = detector.detect(&lines, &splits);

        assert!(report.skipped.is_empty());
        assert_eq!(report.signals.len(), 1);
        let edges = report.edge_signals(detector.config());
        assert_eq!(edges[0].signal_type, SignalType::Bias);
        assert_eq!(edges[0].cause, "rlm:spread:away");
        assert_eq!(edges[0].source_ids, vec!["a"]);
        assert!(edges[0].confidence > 0.0 && edges[0].confidence < 1.0);
        assert!(edges[0].expected_value > 0.0);
    }

    #[test]
    fn test_steam_into_volume_signal() {
        let detector = SignalDetector::new(SignalConfig::default());
        let mut lines = Vec::new();
        for (i, book) in ["a", "b", "c"].iter().enumerate() {
            lines.push(snap("g1", book, dec!(-3), 0));
            lines.push(snap("g1", book, dec!(-4), 60 + i as i64));
        }
        let report = detector.detect(&lines, &[]);
        let edges = report.edge_signals(detector.config());
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].signal_type, SignalType::Volume);
        assert!(edges[0].cause.starts_with("steam:spread:home:"));
        assert_eq!(edges[0].source_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_bad_market_is_skipped_others_continue() {
        let detector = SignalDetector::new(SignalConfig::default());
        let lines = vec![
            // g1: two quotes at the same instant from one book
            snap("g1", "a", dec!(-7), 0),
            snap("g1", "a", dec!(-6), 0),
            // g2: clean RLM
            snap("g2", "a", dec!(-7), 0),
            snap("g2", "a", dec!(-5), 60),
        ];
        let splits = vec![split("g2", PickSide::Home, 80.0)];
        let report = detector.detect(&lines, &splits);

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0.game_id, "g1");
        assert!(matches!(report.skipped[0].1, EngineError::InvalidSeries { .. }));
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].game_id(), "g2");
    }

    #[test]
    fn test_single_snapshot_yields_nothing() {
        let detector = SignalDetector::new(SignalConfig::default());
        let report = detector.detect(&[snap("g1", "a", dec!(-7), 0)], &[split("g1", PickSide::Home, 90.0)]);
        assert!(report.signals.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_config_deserializes_partial_toml() {
        let config: SignalConfig = toml::from_str("min_books = 4\nsteam_window_secs = 600").unwrap();
        assert_eq!(config.min_books, 4);
        assert_eq!(config.steam_window(), Duration::minutes(10));
        assert_eq!(config.rlm_threshold, 1.0);
    }
}
