//! Steam moves.
//!
//! Several books moving the same number the same way inside a short
//! window. Moves are scanned in `(time, book)` order so the result does not
//! depend on how the input was ordered, and windows never overlap: once a
//! window qualifies the scan resumes after its end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::SignalConfig;
use crate::lines::LineHistory;
use crate::types::{BetType, PickSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineDirection {
    Up,
    Down,
}

impl LineDirection {
    fn of(delta: f64) -> Option<Self> {
        if delta > 0.0 {
            Some(LineDirection::Up)
        } else if delta < 0.0 {
            Some(LineDirection::Down)
        } else {
            None
        }
    }

    /// The side money is moving toward. Reference scales are the home
    /// handicap (spread), the total, and the home implied probability
    /// (moneyline).
    pub fn side_backed(&self, bet_type: BetType) -> PickSide {
        match (bet_type, self) {
            (BetType::Spread, LineDirection::Down) => PickSide::Home,
            (BetType::Spread, LineDirection::Up) => PickSide::Away,
            (BetType::Total, LineDirection::Up) => PickSide::Over,
            (BetType::Total, LineDirection::Down) => PickSide::Under,
            (BetType::Moneyline, LineDirection::Up) => PickSide::Home,
            (BetType::Moneyline, LineDirection::Down) => PickSide::Away,
        }
    }
}

impl fmt::Display for LineDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineDirection::Up => write!(f, "up"),
            LineDirection::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SteamMove {
    pub game_id: String,
    pub bet_type: BetType,
    pub direction: LineDirection,
    /// Books that moved, sorted.
    pub books: Vec<String>,
    pub window_start: DateTime<Utc>,
    /// Time of the last qualifying move inside the window.
    pub window_end: DateTime<Utc>,
    /// Mean absolute net move per book.
    pub avg_move: f64,
    pub strength: f64,
}

impl SteamMove {
    pub fn side_backed(&self) -> PickSide {
        self.direction.side_backed(self.bet_type)
    }
}

#[derive(Debug, Clone)]
struct BookMove<'a> {
    at: DateTime<Utc>,
    book: &'a str,
    delta: f64,
}

/// Scan one market for steam.
pub fn detect_steam(history: &LineHistory, config: &SignalConfig) -> Vec<SteamMove> {
    if history.len() < 2 || config.min_books == 0 {
        return Vec::new();
    }

    let market = history.key();
    let threshold = config.steam_threshold_for(market.bet_type);
    let window = config.steam_window();

    let series = history.book_series();
    let mut moves: Vec<BookMove<'_>> = series
        .iter()
        .flat_map(|(&book, points)| {
            points.windows(2).filter_map(move |pair| {
                let delta = pair[1].1 - pair[0].1;
                (delta != 0.0).then_some(BookMove {
                    at: pair[1].0,
                    book,
                    delta,
                })
            })
        })
        .collect();
    moves.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.book.cmp(b.book)));

    let mut found = Vec::new();
    let mut i = 0;
    while i < moves.len() {
        let start = moves[i].at;
        let limit = start + window;
        let in_window: Vec<&BookMove<'_>> = moves[i..].iter().take_while(|m| m.at <= limit).collect();

        // Net move and last move time per book inside the window.
        let mut net: BTreeMap<&str, (f64, DateTime<Utc>)> = BTreeMap::new();
        for m in &in_window {
            let entry = net.entry(m.book).or_insert((0.0, m.at));
            entry.0 += m.delta;
            entry.1 = m.at;
        }

        let mut qualified = false;
        for direction in [LineDirection::Up, LineDirection::Down] {
            let movers: Vec<(&str, f64, DateTime<Utc>)> = net
                .iter()
                .filter(|(_, (delta, _))| {
                    LineDirection::of(*delta) == Some(direction) && delta.abs() + f64::EPSILON >= threshold
                })
                .map(|(book, (delta, at))| (*book, delta.abs(), *at))
                .collect();

            if movers.len() < config.min_books {
                continue;
            }

            let avg_move = movers.iter().map(|(_, d, _)| d).sum::<f64>() / movers.len() as f64;
            let strength = (movers.len() as f64 / config.min_books as f64) * (avg_move / threshold);
            let window_end = movers.iter().map(|(_, _, at)| *at).max().unwrap_or(start);
            let books: Vec<String> = movers.iter().map(|(b, _, _)| b.to_string()).collect();

            debug!(
                market = %market,
                direction = %direction,
                books = ?books,
                avg_move,
                "Steam move"
            );

            found.push(SteamMove {
                game_id: market.game_id.clone(),
                bet_type: market.bet_type,
                direction,
                books,
                window_start: start,
                window_end,
                avg_move,
                strength,
            });
            qualified = true;
        }

        if qualified {
            i += in_window.len();
        } else {
            i += 1;
        }
    }

    found
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
