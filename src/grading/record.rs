//! Win/loss/push tallies over graded outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{GradeOutcome, GradeResult};

/// A settled record, the same shape trend rules carry as their history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    #[serde(default)]
    pub voids: u32,
}

impl RecordSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a GradeOutcome>) -> Self {
        let mut record = Self::default();
        for o in outcomes {
            record.add(o.result);
        }
        record
    }

    pub fn add(&mut self, result: GradeResult) {
        match result {
            GradeResult::Win => self.wins += 1,
            GradeResult::Loss => self.losses += 1,
            GradeResult::Push => self.pushes += 1,
            GradeResult::Void => self.voids += 1,
        }
    }

    /// Games with a winner against the line.
    pub fn decided(&self) -> u32 {
        self.wins + self.losses
    }

    /// Win rate over decided games; `None` before any are decided.
    pub fn win_rate(&self) -> Option<f64> {
        match self.decided() {
            0 => None,
            n => Some(self.wins as f64 / n as f64),
        }
    }
}

impl fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.wins, self.losses, self.pushes)
    }
}
