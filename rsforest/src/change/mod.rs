//! Cross-epoch tree matching and change classification.

use serde::{Deserialize, Serialize};

pub mod classify;
pub mod matching;
pub mod series;

/// Change of one tree between two epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Growth,
    Stable,
    Decline,
    /// Present in the first epoch only
    Mortality,
    /// Present in the second epoch only
    Ingrowth,
}

/// Match quality, from the distance relative to the match threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// `< 0.3` high, `< 0.7` medium, low otherwise.
    pub fn from_distance(distance: f64, threshold: f64) -> Self {
        let normalized = distance / threshold;
        if normalized < 0.3 {
            Confidence::High
        } else if normalized < 0.7 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}
