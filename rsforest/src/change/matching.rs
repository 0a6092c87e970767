//! Greedy nearest-neighbour matching of trees between two epochs.
//!
//! Epoch-1 trees are visited in input order and each takes the nearest
//! compatible epoch-2 tree still available. The result depends on input
//! order and is not a globally optimal assignment.

use std::collections::{HashMap, HashSet};

use geo::EuclideanDistance;
use serde::{Deserialize, Serialize};

use crate::change::classify::classify_height_change;
use crate::change::{ChangeType, Confidence};
use crate::config::MatchingConfig;
use crate::error::Result;
use crate::geometric::trees::TreeRecord;

/// A matched pair of trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMatch {
    pub tree_id_t1: u32,
    pub tree_id_t2: Option<u32>,
    /// Positions in the input slices
    pub index_t1: usize,
    pub index_t2: Option<usize>,
    pub distance: f64,
    /// `h2 - h1`
    pub height_diff: f64,
    pub change_type: ChangeType,
    pub confidence: Confidence,
}

/// Matches per confidence tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResult {
    pub matches: Vec<TreeMatch>,
    /// Indices of valid epoch-1 trees without a partner
    pub unmatched_t1: Vec<usize>,
    /// Indices of valid epoch-2 trees without a partner
    pub unmatched_t2: Vec<usize>,
    /// Records ignored for a non-finite position or height
    pub skipped_t1: usize,
    pub skipped_t2: usize,
}

impl MatchResult {
    pub fn confidence_summary(&self) -> ConfidenceSummary {
        let mut summary = ConfidenceSummary::default();
        for m in &self.matches {
            match m.confidence {
                Confidence::High => summary.high += 1,
                Confidence::Medium => summary.medium += 1,
                Confidence::Low => summary.low += 1,
            }
        }
        summary
    }
}

type CellKey = (i32, i32);

/// Uniform grid over epoch-2 trees.
struct GridIndex {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl GridIndex {
    fn build(trees: &[TreeRecord], valid: &[usize], cell_size: f64) -> Self {
        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for &i in valid {
            let key = Self::key(trees[i].x, trees[i].y, cell_size);
            cells.entry(key).or_default().push(i);
        }
        GridIndex { cell_size, cells }
    }

    fn key(x: f64, y: f64, cell_size: f64) -> CellKey {
        ((x / cell_size).floor() as i32, (y / cell_size).floor() as i32)
    }

    /// Candidates in the 3x3 block of cells around a position.
    fn neighbourhood(&self, x: f64, y: f64) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy) = Self::key(x, y, self.cell_size);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (cx.saturating_add(dx), cy.saturating_add(dy))))
            .filter_map(move |key| self.cells.get(&key))
            .flatten()
            .copied()
    }
}

pub struct TreeMatcher<'a> {
    config: &'a MatchingConfig,
}

impl<'a> TreeMatcher<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        TreeMatcher { config }
    }

    /// Pair epoch-1 trees with epoch-2 trees one-to-one.
    pub fn match_epochs(&self, t1: &[TreeRecord], t2: &[TreeRecord]) -> Result<MatchResult> {
        self.config.validate()?;
        let threshold = self.config.match_distance_threshold;
        let tolerance = self.config.height_tolerance_pct / 100.0;

        let valid_t1 = valid_indices(t1, "epoch 1");
        let valid_t2 = valid_indices(t2, "epoch 2");
        let index = GridIndex::build(t2, &valid_t2, 2.0 * threshold);

        let mut matched_t2: HashSet<usize> = HashSet::new();
        let mut matches = Vec::new();
        let mut unmatched_t1 = Vec::new();

        for &i in &valid_t1 {
            let a = &t1[i];
            let mut best: Option<(usize, f64)> = None;
            for j in index.neighbourhood(a.x, a.y) {
                if matched_t2.contains(&j) {
                    continue;
                }
                let b = &t2[j];
                let distance = a.point().euclidean_distance(&b.point());
                if distance > threshold {
                    continue;
                }
                if a.height > 0.0 && (b.height - a.height).abs() / a.height > tolerance {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((bj, bd)) => distance < bd || (distance == bd && j < bj),
                };
                if better {
                    best = Some((j, distance));
                }
            }

            match best {
                Some((j, distance)) => {
                    matched_t2.insert(j);
                    let height_diff = t2[j].height - a.height;
                    matches.push(TreeMatch {
                        tree_id_t1: a.id,
                        tree_id_t2: Some(t2[j].id),
                        index_t1: i,
                        index_t2: Some(j),
                        distance,
                        height_diff,
                        change_type: classify_height_change(height_diff, &self.config.thresholds),
                        confidence: Confidence::from_distance(distance, threshold),
                    });
                }
                None => unmatched_t1.push(i),
            }
        }

        let unmatched_t2: Vec<usize> = valid_t2
            .iter()
            .copied()
            .filter(|j| !matched_t2.contains(j))
            .collect();

        log::info!(
            "Matched {} trees ({} unmatched in epoch 1, {} unmatched in epoch 2)",
            matches.len(),
            unmatched_t1.len(),
            unmatched_t2.len()
        );

        Ok(MatchResult {
            matches,
            unmatched_t1,
            unmatched_t2,
            skipped_t1: t1.len() - valid_t1.len(),
            skipped_t2: t2.len() - valid_t2.len(),
        })
    }
}

fn valid_indices(trees: &[TreeRecord], epoch: &str) -> Vec<usize> {
    let valid: Vec<usize> = (0..trees.len()).filter(|&i| trees[i].is_valid()).collect();
    if valid.len() < trees.len() {
        log::warn!(
            "Skipping {} {} trees with missing coordinates or height",
            trees.len() - valid.len(),
            epoch
        );
    }
    valid
}
