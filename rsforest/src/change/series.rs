//! Dated epochs and change analysis over a time series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::change::classify::{ChangeClassifier, ChangeRecord, EpochStatistics};
use crate::change::matching::{MatchResult, TreeMatcher};
use crate::commons::global_variables::DAYS_PER_YEAR;
use crate::config::MatchingConfig;
use crate::error::Result;
use crate::geometric::trees::{Allometry, TreeRecord};

/// One dated tree inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epoch {
    pub label: String,
    pub acquired: NaiveDate,
    pub trees: Vec<TreeRecord>,
}

impl Epoch {
    pub fn new(label: impl Into<String>, acquired: NaiveDate, trees: Vec<TreeRecord>) -> Self {
        Epoch {
            label: label.into(),
            acquired,
            trees,
        }
    }
}

/// Decimal years from `from` to `to`.
pub fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_PER_YEAR
}

/// Change between two consecutive epochs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochChange {
    pub from: String,
    pub to: String,
    pub years: f64,
    pub matches: MatchResult,
    pub records: Vec<ChangeRecord>,
    pub statistics: EpochStatistics,
}

/// Match and classify two epochs.
pub fn compare_epochs(
    earlier: &Epoch,
    later: &Epoch,
    area_ha: f64,
    config: &MatchingConfig,
    allometry: &dyn Allometry,
) -> Result<EpochChange> {
    let years = years_between(earlier.acquired, later.acquired);
    let matches = TreeMatcher::new(config).match_epochs(&earlier.trees, &later.trees)?;
    let classifier = ChangeClassifier::new(allometry);
    let records = classifier.records(&earlier.trees, &later.trees, &matches);
    let statistics = classifier.statistics(&records, years, area_ha);
    log::info!(
        "{} -> {}: {} matched, {} mortality, {} ingrowth over {:.2} years",
        earlier.label,
        later.label,
        statistics.matched_count,
        statistics.mortality_count,
        statistics.ingrowth_count,
        years
    );
    Ok(EpochChange {
        from: earlier.label.clone(),
        to: later.label.clone(),
        years,
        matches,
        records,
        statistics,
    })
}

/// Epochs of one study area, kept in acquisition order.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    epochs: Vec<Epoch>,
    area_ha: f64,
}

impl TimeSeries {
    pub fn new(mut epochs: Vec<Epoch>, area_ha: f64) -> Self {
        epochs.sort_by_key(|e| e.acquired);
        TimeSeries { epochs, area_ha }
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn area_ha(&self) -> f64 {
        self.area_ha
    }

    pub fn push(&mut self, epoch: Epoch) {
        let at = self.epochs.partition_point(|e| e.acquired <= epoch.acquired);
        self.epochs.insert(at, epoch);
    }

    /// Change between every pair of consecutive epochs. Pairs are
    /// independent and run in parallel with the `rayon` feature.
    pub fn analyze(&self, config: &MatchingConfig, allometry: &dyn Allometry) -> Result<Vec<EpochChange>> {
        config.validate()?;
        if self.epochs.len() < 2 {
            log::warn!("Time series has {} epoch(s), nothing to compare", self.epochs.len());
            return Ok(Vec::new());
        }

        #[cfg(feature = "rayon")]
        let changes = self
            .epochs
            .par_windows(2)
            .map(|pair| compare_epochs(&pair[0], &pair[1], self.area_ha, config, allometry))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let changes = self
            .epochs
            .windows(2)
            .map(|pair| compare_epochs(&pair[0], &pair[1], self.area_ha, config, allometry))
            .collect();

        changes
    }
}
