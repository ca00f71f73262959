//! Shrinkage confidence for historical records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Pseudo-losses added before scoring. The shrink is toward zero, never
    /// toward a fixed rate, so a bigger sample at the same win rate can only
    /// raise confidence.
    pub prior_losses: f64,
    /// Standard score for the Wilson interval (1.96 ≈ 95%).
    pub z: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            prior_losses: 2.0,
            z: 1.96,
        }
    }
}

/// Lower bound of the Wilson score interval after adding the configured
/// pseudo-losses. Pushes are decided by neither side and are excluded.
///
/// Always in `[0, 1]`; 0 for a record without wins.
pub fn wilson_lower_bound(wins: u32, losses: u32, config: &TrendConfig) -> f64 {
    if wins == 0 {
        return 0.0;
    }
    let w = wins as f64;
    let n = w + losses as f64 + config.prior_losses.max(0.0);
    let z = config.z.max(0.0);
    let p = w / n;
    let z2 = z * z;
    let centre = p + z2 / (2.0 * n);
    let spread = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    ((centre - spread) / (1.0 + z2 / n)).clamp(0.0, 1.0)
}
