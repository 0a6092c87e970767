//! Per-tree change records and epoch-pair statistics.

use serde::{Deserialize, Serialize};

use crate::change::matching::MatchResult;
use crate::change::ChangeType;
use crate::commons::basic_functions::{mean, ratio_or_zero};
use crate::config::ChangeThresholds;
use crate::geometric::trees::{Allometry, TreeRecord};

/// Growth above `thresholds.growth`, decline below `thresholds.decline`.
pub fn classify_height_change(height_diff: f64, thresholds: &ChangeThresholds) -> ChangeType {
    if height_diff > thresholds.growth {
        ChangeType::Growth
    } else if height_diff < thresholds.decline {
        ChangeType::Decline
    } else {
        ChangeType::Stable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub tree_id_t1: Option<u32>,
    pub tree_id_t2: Option<u32>,
    pub change_type: ChangeType,
    /// Position in the latest epoch the tree was seen in
    pub x: f64,
    pub y: f64,
    pub height_t1: Option<f64>,
    pub height_t2: Option<f64>,
    pub height_change: Option<f64>,
    /// Carbon gained (positive) or lost (negative), when both estimates exist
    pub carbon_change_kg: Option<f64>,
}

/// Aggregates over one pair of epochs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochStatistics {
    pub tree_count_t1: usize,
    pub tree_count_t2: usize,
    pub matched_count: usize,
    pub growth_count: usize,
    pub stable_count: usize,
    pub decline_count: usize,
    pub mortality_count: usize,
    pub ingrowth_count: usize,
    pub years: f64,
    pub area_ha: f64,
    /// Share of epoch-1 trees lost per year (%)
    pub mortality_rate_pct: f64,
    /// New trees per year relative to epoch 1 (%)
    pub ingrowth_rate_pct: f64,
    pub net_carbon_change_kg: f64,
    /// kg of carbon per hectare per year
    pub sequestration_rate: f64,
    pub mean_height_change: Option<f64>,
    pub mean_annual_height_growth: Option<f64>,
}

pub struct ChangeClassifier<'a> {
    allometry: &'a dyn Allometry,
}

impl<'a> ChangeClassifier<'a> {
    pub fn new(allometry: &'a dyn Allometry) -> Self {
        ChangeClassifier { allometry }
    }

    /// One record per match, then mortality, then ingrowth.
    pub fn records(&self, t1: &[TreeRecord], t2: &[TreeRecord], result: &MatchResult) -> Vec<ChangeRecord> {
        let carbon = |tree: &TreeRecord| self.allometry.estimate_carbon_kg(tree);
        let mut records =
            Vec::with_capacity(result.matches.len() + result.unmatched_t1.len() + result.unmatched_t2.len());

        for m in &result.matches {
            let a = &t1[m.index_t1];
            let Some(b) = m.index_t2.map(|j| &t2[j]) else {
                continue;
            };
            let carbon_change_kg = match (carbon(a), carbon(b)) {
                (Some(c1), Some(c2)) => Some(c2 - c1),
                _ => None,
            };
            records.push(ChangeRecord {
                tree_id_t1: Some(a.id),
                tree_id_t2: Some(b.id),
                change_type: m.change_type,
                x: b.x,
                y: b.y,
                height_t1: Some(a.height),
                height_t2: Some(b.height),
                height_change: Some(m.height_diff),
                carbon_change_kg,
            });
        }

        for &i in &result.unmatched_t1 {
            let a = &t1[i];
            records.push(ChangeRecord {
                tree_id_t1: Some(a.id),
                tree_id_t2: None,
                change_type: ChangeType::Mortality,
                x: a.x,
                y: a.y,
                height_t1: Some(a.height),
                height_t2: None,
                height_change: None,
                carbon_change_kg: carbon(a).map(|c| -c),
            });
        }

        for &j in &result.unmatched_t2 {
            let b = &t2[j];
            records.push(ChangeRecord {
                tree_id_t1: None,
                tree_id_t2: Some(b.id),
                change_type: ChangeType::Ingrowth,
                x: b.x,
                y: b.y,
                height_t1: None,
                height_t2: Some(b.height),
                height_change: None,
                carbon_change_kg: carbon(b),
            });
        }
        records
    }

    /// Aggregate change records over `years` and a study area of `area_ha`.
    /// Zero years or area give zero rates.
    pub fn statistics(&self, records: &[ChangeRecord], years: f64, area_ha: f64) -> EpochStatistics {
        let mut stats = EpochStatistics {
            years,
            area_ha,
            ..EpochStatistics::default()
        };
        let mut height_changes = Vec::new();
        for record in records {
            match record.change_type {
                ChangeType::Growth => stats.growth_count += 1,
                ChangeType::Stable => stats.stable_count += 1,
                ChangeType::Decline => stats.decline_count += 1,
                ChangeType::Mortality => stats.mortality_count += 1,
                ChangeType::Ingrowth => stats.ingrowth_count += 1,
            }
            if let Some(dh) = record.height_change {
                height_changes.push(dh);
            }
            stats.net_carbon_change_kg += record.carbon_change_kg.unwrap_or(0.0);
        }

        stats.matched_count = stats.growth_count + stats.stable_count + stats.decline_count;
        stats.tree_count_t1 = stats.matched_count + stats.mortality_count;
        stats.tree_count_t2 = stats.matched_count + stats.ingrowth_count;

        let total_t1 = stats.tree_count_t1 as f64;
        stats.mortality_rate_pct = ratio_or_zero(ratio_or_zero(stats.mortality_count as f64, total_t1), years) * 100.0;
        stats.ingrowth_rate_pct = ratio_or_zero(ratio_or_zero(stats.ingrowth_count as f64, total_t1), years) * 100.0;
        stats.sequestration_rate = ratio_or_zero(ratio_or_zero(stats.net_carbon_change_kg, area_ha), years);
        stats.mean_height_change = mean(&height_changes);
        stats.mean_annual_height_growth = stats.mean_height_change.map(|dh| ratio_or_zero(dh, years));
        stats
    }
}
