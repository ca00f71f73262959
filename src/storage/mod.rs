//! Dataset files.
//!
//! A dataset is a JSON dump of everything the engine reads: line
//! snapshots, public splits, results, the trend catalog, the slate to scan,
//! picks awaiting grading and externally produced signals. It backs
//! [`InMemoryStore`](crate::data::InMemoryStore) for the binary and tests.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::data::Slate;
use crate::trends::TrendRule;
use crate::types::{EdgeSignal, GameResult, LineSnapshot, Pick, PublicSplit};

/// Default dataset file path.
pub const DEFAULT_DATASET_FILE: &str = "data/slate.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub lines: Vec<LineSnapshot>,
    pub splits: Vec<PublicSplit>,
    pub results: Vec<GameResult>,
    pub trend_rules: Vec<TrendRule>,
    pub slate: Option<Slate>,
    pub picks: Vec<Pick>,
    pub external_signals: Vec<EdgeSignal>,
}

/// Save a dataset as pretty JSON.
pub fn save_dataset(dataset: &Dataset, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_DATASET_FILE);
    let json = serde_json::to_string_pretty(dataset).context("Failed to serialise dataset")?;

    std::fs::write(path, &json).context(format!("Failed to write dataset to {path}"))?;

    debug!(path, lines = dataset.lines.len(), "Dataset saved");
    Ok(())
}

/// Load a dataset. Returns `None` if the file doesn't exist.
pub fn load_dataset(path: Option<&str>) -> Result<Option<Dataset>> {
    let path = path.unwrap_or(DEFAULT_DATASET_FILE);

    if !Path::new(path).exists() {
        info!(path, "No dataset found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read dataset from {path}"))?;

    let dataset: Dataset =
        serde_json::from_str(&json).context(format!("Failed to parse dataset from {path}"))?;

    info!(
        path,
        lines = dataset.lines.len(),
        splits = dataset.splits.len(),
        results = dataset.results.len(),
        rules = dataset.trend_rules.len(),
        picks = dataset.picks.len(),
        "Dataset loaded"
    );

    Ok(Some(dataset))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
