//! End-to-end pipeline tests: dataset → store → engine → feed / grades.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

use sharpline::data::{SignalSource, Slate, SlateGame, StaticSignalFeed};
use sharpline::engine::aggregator::{FeedConfig, FeedFilter};
use sharpline::engine::batch::cancel_channel;
use sharpline::engine::{EdgeEngine, EngineConfig};
use sharpline::grading::record::RecordSummary;
use sharpline::grading::{freeze_pick, GradingPolicy, OutcomeGrader};
use sharpline::lines::{LineHistory, MarketKey};
use sharpline::signals::SignalConfig;
use sharpline::storage::{self, Dataset};
use sharpline::trends::{GameFeatures, Predicate, Role, TrendConfig, TrendRule, Venue};
use sharpline::types::*;

use crate::mock_store::MockStore;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 13, 12, 0, 0).unwrap()
}

fn at(mins: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(mins)
}

fn snap(game: &str, bet_type: BetType, side: PickSide, book: &str, line: Decimal, mins: i64) -> LineSnapshot {
    LineSnapshot {
        game_id: game.into(),
        bet_type,
        side,
        book_id: book.into(),
        line_value: line,
        price: -110,
        captured_at: at(mins),
    }
}

fn result(game: &str, sport: Sport, home: u32, away: u32, status: GameStatus) -> GameResult {
    GameResult {
        game_id: game.into(),
        sport,
        home_score: home,
        away_score: away,
        status,
    }
}

fn features(game: &str, team: &str, venue: Venue) -> GameFeatures {
    GameFeatures {
        game_id: game.into(),
        sport: Sport::Nfl,
        team: team.into(),
        venue,
        role: None,
        rest_days_diff: None,
        divisional: None,
        season: None,
        weather: None,
    }
}

fn rule(id: &str, predicate: serde_json::Value, wins: u32, losses: u32) -> TrendRule {
    TrendRule {
        id: id.into(),
        sport: Sport::Nfl,
        predicate: serde_json::from_value::<Predicate>(predicate).unwrap(),
        historical_record: RecordSummary {
            wins,
            losses,
            pushes: 2,
            voids: 0,
        },
        roi: 0.07,
        sample_size: wins + losses + 2,
        last_updated: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
    }
}

/// g1: reverse line movement on the spread.
/// g2: three-book steam on the total.
/// g3: trend matches only; its moneyline never moves despite a 70% public.
fn dataset() -> Dataset {
    let mut lines = vec![
        snap("g1", BetType::Spread, PickSide::Home, "book_a", dec!(-7), 0),
        snap("g1", BetType::Spread, PickSide::Home, "book_a", dec!(-5.5), 180),
    ];
    for (i, book) in ["book_a", "book_b", "book_c"].iter().enumerate() {
        lines.push(snap("g2", BetType::Total, PickSide::Over, book, dec!(220), 0));
        lines.push(snap("g2", BetType::Total, PickSide::Over, book, dec!(218.5), 120 + 5 * i as i64));
    }
    // g3 moneyline: both sides quoted twice at unchanged prices.
    for mins in [0, 120] {
        let mut home = snap("g3", BetType::Moneyline, PickSide::Home, "book_a", dec!(0), mins);
        home.price = -150;
        let mut away = snap("g3", BetType::Moneyline, PickSide::Away, "book_a", dec!(0), mins);
        away.price = 130;
        lines.extend([home, away]);
    }
    // Captured after the slate's clock; must never be seen.
    lines.push(snap("g1", BetType::Spread, PickSide::Home, "book_a", dec!(-9), 600));

    let splits = vec![
        PublicSplit {
            game_id: "g3".into(),
            bet_type: BetType::Moneyline,
            side: PickSide::Home,
            ticket_pct: 70.0,
            handle_pct: None,
            observed_at: at(60),
        },
        PublicSplit {
            game_id: "g1".into(),
            bet_type: BetType::Spread,
            side: PickSide::Home,
            ticket_pct: 72.0,
            handle_pct: Some(48.0),
            observed_at: at(60),
        },
        PublicSplit {
            game_id: "g1".into(),
            bet_type: BetType::Spread,
            side: PickSide::Away,
            ticket_pct: 28.0,
            handle_pct: Some(52.0),
            observed_at: at(60),
        },
    ];

    let mut home_kc = features("g3", "KC", Venue::Home);
    home_kc.divisional = Some(true);
    let mut road_den = features("g3", "DEN", Venue::Away);
    road_den.role = Some(Role::Underdog);

    let trend_rules = vec![
        rule(
            "div_home",
            json!({"all": [
                {"feature": "venue", "op": "eq", "value": "home"},
                {"feature": "divisional", "op": "eq", "value": true}
            ]}),
            140,
            100,
        ),
        // DEN has no rest data: unknown, so no match.
        rule(
            "rested_road_dog",
            json!({"all": [
                {"feature": "role", "op": "eq", "value": "underdog"},
                {"feature": "rest_days_diff", "op": "gte", "value": 2}
            ]}),
            60,
            40,
        ),
        rule("broken", json!({"feature": "moon", "op": "eq", "value": "full"}), 10, 0),
    ];

    let slate = Slate {
        as_of: at(360),
        games: vec![
            SlateGame {
                game_id: "g1".into(),
                sport: Sport::Nfl,
                home_team: "BUF".into(),
                away_team: "MIA".into(),
                bet_types: vec![BetType::Spread],
                features: vec![],
            },
            SlateGame {
                game_id: "g2".into(),
                sport: Sport::Nba,
                home_team: "BOS".into(),
                away_team: "NYK".into(),
                bet_types: vec![BetType::Total],
                features: vec![],
            },
            SlateGame {
                game_id: "g3".into(),
                sport: Sport::Nfl,
                home_team: "KC".into(),
                away_team: "DEN".into(),
                bet_types: vec![BetType::Spread, BetType::Moneyline],
                features: vec![home_kc, road_den],
            },
        ],
    };

    let picks = vec![
        Pick::new("p1", "g1", BetType::Spread, PickSide::Home, dec!(-3.5), at(0)),
        Pick::new("p2", "g1", BetType::Spread, PickSide::Away, dec!(3.5), at(0)),
        Pick::new("p3", "g4", BetType::Moneyline, PickSide::Home, dec!(0), at(0)),
        Pick::new("p4", "g5", BetType::Moneyline, PickSide::Away, dec!(0), at(0)),
        Pick::new("p5", "g6", BetType::Total, PickSide::Under, dec!(45), at(0)),
        Pick::new("p6", "g2", BetType::Total, PickSide::Under, dec!(218.5), at(0)),
    ];

    Dataset {
        lines,
        splits,
        results: vec![
            result("g1", Sport::Nfl, 24, 21, GameStatus::Final),
            result("g2", Sport::Nba, 55, 60, GameStatus::InProgress),
            result("g4", Sport::Soccer, 1, 1, GameStatus::Final),
            result("g5", Sport::Nhl, 2, 2, GameStatus::Final),
            result("g6", Sport::Nfl, 27, 18, GameStatus::Final),
        ],
        trend_rules,
        slate: Some(slate),
        picks,
        external_signals: vec![EdgeSignal::new(
            SignalType::News,
            "g1",
            "injury:buf_qb",
            "BUF QB questionable",
            0.66,
            0.02,
            at(200),
        )],
    }
}

fn engine(store: Arc<MockStore>, dataset: &Dataset) -> EdgeEngine {
    EdgeEngine::new(
        store,
        SignalConfig::default(),
        TrendConfig::default(),
        FeedConfig::default(),
        GradingPolicy::default(),
        EngineConfig::default(),
    )
    .with_source(Arc::new(StaticSignalFeed::new("news", dataset.external_signals.clone())))
}

fn slate_of(dataset: &Dataset) -> Arc<Slate> {
    Arc::new(dataset.slate.clone().unwrap())
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_scan_produces_every_signal_type() {
    let ds = dataset();
    let store = Arc::new(MockStore::new(&ds));
    let engine = engine(store.clone(), &ds);
    let (_tx, rx) = cancel_channel();

    let report = engine.scan_ranked(slate_of(&ds), rx).await;

    // 1 + 1 + 2 line units, 1 trend unit, 1 feed unit
    assert_eq!(report.units, 6);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert!(!report.cancelled);

    let causes: Vec<&str> = report.signals.iter().map(|s| s.cause.as_str()).collect();
    assert!(causes.contains(&"rlm:spread:away"), "{causes:?}");
    assert!(causes.iter().any(|c| c.starts_with("steam:total:under:")), "{causes:?}");
    assert!(causes.contains(&"trend:div_home:home"), "{causes:?}");
    assert!(causes.contains(&"injury:buf_qb"), "{causes:?}");
    assert_eq!(report.signals.len(), 4);

    // The malformed rule is listed against the trend unit that skipped it.
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].unit.source, "trends");
    assert_eq!(report.skipped[0].unit.game_id, "g3");
    assert!(matches!(
        &report.skipped[0].error,
        EngineError::InvalidPredicate { rule_id, .. } if rule_id == "broken"
    ));

    for pair in report.signals.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    assert!(store.call_count() > 0);
}

#[tokio::test]
async fn test_rlm_uses_only_lines_up_to_as_of() {
    let ds = dataset();
    let engine = engine(Arc::new(MockStore::new(&ds)), &ds);
    let (_tx, rx) = cancel_channel();
    let report = engine
        .scan(slate_of(&ds), &FeedFilter::of_type(SignalType::Bias), rx)
        .await;

    assert_eq!(report.signals.len(), 1);
    // -7 → -5.5; the later -9 is past as_of
    assert!(report.signals[0].description.contains("-7.0 -> -5.5"), "{}", report.signals[0].description);
}

#[tokio::test]
async fn test_limit_returns_prefix_of_full_ranking() {
    let ds = dataset();
    let engine = engine(Arc::new(MockStore::new(&ds)), &ds);

    let (_tx, rx) = cancel_channel();
    let full = engine.scan_ranked(slate_of(&ds), rx).await.signals;
    for n in 0..=full.len() {
        let limited = engine.aggregator().filter(&full, &FeedFilter::default().with_limit(n));
        let ids: Vec<&str> = limited.iter().map(|s| s.id.as_str()).collect();
        let expect: Vec<&str> = full[..n].iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, expect);
    }
}

#[tokio::test]
async fn test_failing_game_is_isolated() {
    let ds = dataset();
    let store = Arc::new(MockStore::new(&ds));
    store.fail_game("g2");
    let engine = engine(store, &ds);
    let (_tx, rx) = cancel_channel();

    let report = engine.scan_ranked(slate_of(&ds), rx).await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].unit.game_id, "g2");
    assert!(matches!(report.failures[0].error, EngineError::DataSourceUnavailable { .. }));
    assert_eq!(report.signals.len(), 3);
    assert!(report.signals.iter().all(|s| s.game_id != "g2"));
}

#[tokio::test]
async fn test_cancelled_scan_keeps_completed_units() {
    let ds = dataset();
    let store = Arc::new(MockStore::new(&ds));
    store.delay_game("g2", std::time::Duration::from_secs(30));
    let engine = engine(store, &ds);
    let (tx, rx) = cancel_channel();

    let (report, _) = tokio::join!(engine.scan_ranked(slate_of(&ds), rx), async {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        tx.send(true).unwrap();
    });

    assert!(report.cancelled);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].unit.game_id, "g2");
    assert_eq!(report.failures[0].error, EngineError::Cancelled);
    assert_eq!(report.signals.len(), 3);
}

#[tokio::test]
async fn test_high_confidence_filter_over_scan() {
    let ds = dataset();
    let engine = engine(Arc::new(MockStore::new(&ds)), &ds);
    let (_tx, rx) = cancel_channel();
    let filter = FeedFilter {
        high_confidence_only: true,
        ..FeedFilter::default()
    };
    let report = engine.scan(slate_of(&ds), &filter, rx).await;
    assert!(report.signals.iter().all(|s| s.confidence >= 0.7));
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_grade_pending_picks() {
    let ds = dataset();
    let engine = engine(Arc::new(MockStore::new(&ds)), &ds);
    let (_tx, rx) = cancel_channel();

    let report = engine.grade_picks(ds.picks.clone(), rx).await;
    let result_of = |id: &str| {
        report
            .graded
            .iter()
            .find(|g| g.pick.id == id)
            .map(|g| g.outcome.result)
    };

    // BUF won 24-21: -3.5 loses, +3.5 wins
    assert_eq!(result_of("p1"), Some(GradeResult::Loss));
    assert_eq!(result_of("p2"), Some(GradeResult::Win));
    // Soccer draw loses, hockey tie voids
    assert_eq!(result_of("p3"), Some(GradeResult::Loss));
    assert_eq!(result_of("p4"), Some(GradeResult::Void));
    // 27 + 18 = 45 on a 45 total
    assert_eq!(result_of("p5"), Some(GradeResult::Push));
    // g2 still in progress
    assert_eq!(result_of("p6"), None);
    assert_eq!(report.deferred.len(), 1);
    assert_eq!(report.deferred[0].pick_id, "p6");
    assert!(report.deferred[0].retryable);

    assert_eq!(report.record().to_string(), "1-2-1");
    assert!(report.graded.iter().all(|g| g.pick.status() == PickStatus::Graded));
}

#[tokio::test]
async fn test_grading_is_idempotent_across_runs() {
    let ds = dataset();
    let engine = engine(Arc::new(MockStore::new(&ds)), &ds);

    let (_tx, rx) = cancel_channel();
    let first = engine.grade_picks(ds.picks.clone(), rx.clone()).await;
    let second = engine.grade_picks(ds.picks.clone(), rx).await;
    let outcomes = |r: &sharpline::engine::GradingReport| {
        let mut v: Vec<GradeOutcome> = r.graded.iter().map(|g| g.outcome.clone()).collect();
        v.sort_by(|a, b| a.pick_id.cmp(&b.pick_id));
        v
    };
    assert_eq!(outcomes(&first), outcomes(&second));

    // Feeding graded picks back in grades nothing.
    let graded: Vec<Pick> = first.graded.iter().map(|g| g.pick.clone()).collect();
    let (_tx, rx) = cancel_channel();
    let third = engine.grade_picks(graded, rx).await;
    assert!(third.graded.is_empty());
}

#[tokio::test]
async fn test_frozen_pick_ignores_later_moves() {
    let ds = dataset();
    let history = LineHistory::new(
        MarketKey::new("g1", BetType::Spread),
        ds.lines.iter().filter(|s| s.game_id == "g1").cloned().collect(),
    )
    .unwrap();

    // Placed between the open and the move: the frozen line is -7.
    let pick = freeze_pick("p9", &history, "book_a", PickSide::Home, at(90)).unwrap();
    assert_eq!(pick.line_value_at_pick(), dec!(-7));

    let grader = OutcomeGrader::new(GradingPolicy::default());
    let outcome = grader.grade(&pick, &ds.results[0]).unwrap();
    assert_eq!(outcome.result, GradeResult::Loss);
    assert_eq!(outcome.margin, dec!(-4));
}

// ---------------------------------------------------------------------------
// Dataset file
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dataset_file_round_trip_drives_same_scan() {
    let ds = dataset();
    let mut path = std::env::temp_dir();
    path.push(format!("sharpline_pipeline_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    storage::save_dataset(&ds, Some(&path)).unwrap();
    let loaded = storage::load_dataset(Some(&path)).unwrap().unwrap();
    std::fs::remove_file(&path).unwrap();

    let engine = engine(Arc::new(MockStore::new(&loaded)), &loaded);
    let (_tx, rx) = cancel_channel();
    let report = engine.scan_ranked(slate_of(&loaded), rx).await;
    assert_eq!(report.signals.len(), 4);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_feed_source_units() {
    let ds = dataset();
    let feed = StaticSignalFeed::new("news", ds.external_signals.clone());
    let slate = slate_of(&ds);
    let units = feed.units(&slate);
    assert_eq!(units.len(), 1);
    assert_eq!(feed.produce(&units[0], &slate).await.unwrap().signals.len(), 1);
}
