//! Crown segmentation: one labelled region per tree top over the CHM.
//!
//! The primary path is a marker-controlled watershed on the inverted CHM,
//! implemented as a priority flood (highest cells first, 4-connected). When
//! the watershed cannot run, an iterative label propagation is used instead
//! and the result says so.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::config::{SegmentationConfig, SegmentationStrategy};
use crate::error::{ForestError, Result};
use crate::geometric::raster::Raster;
use crate::geometric::tree_tops::TreeTop;

static NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Algorithm that produced a segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentationMethod {
    Watershed,
    /// Watershed was requested but could not run.
    PropagationFallback,
    /// Propagation was requested explicitly.
    Propagation,
}

/// Crown labels, row-major with the CHM's shape. `0` is background, label
/// `k` belongs to tree top `k - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub labels: Vec<i32>,
    pub rows: usize,
    pub cols: usize,
    pub method: SegmentationMethod,
    pub segment_count: usize,
}

impl Segmentation {
    pub fn label(&self, row: usize, col: usize) -> i32 {
        if row < self.rows && col < self.cols {
            self.labels[row * self.cols + col]
        } else {
            0
        }
    }

    /// Row-major cell indices of every segment; entry `k - 1` holds label `k`.
    pub fn cells_by_segment(&self) -> Vec<Vec<usize>> {
        let mut cells = vec![Vec::new(); self.segment_count];
        for (idx, &label) in self.labels.iter().enumerate() {
            if label > 0 && (label as usize) <= self.segment_count {
                cells[label as usize - 1].push(idx);
            }
        }
        cells
    }
}

/// Heap entry: highest height first, then oldest.
#[derive(Debug)]
struct FloodItem {
    height: f64,
    age: u64,
    idx: usize,
}

impl PartialEq for FloodItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for FloodItem {}

impl PartialOrd for FloodItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .total_cmp(&other.height)
            .then_with(|| other.age.cmp(&self.age))
    }
}

pub struct CrownSegmenter<'a> {
    config: &'a SegmentationConfig,
    min_height: f64,
}

impl<'a> CrownSegmenter<'a> {
    /// `min_height` sets the vegetation mask (`CHM >= min_height`).
    pub fn new(config: &'a SegmentationConfig, min_height: f64) -> Self {
        CrownSegmenter { config, min_height }
    }

    pub fn segment(&self, chm: &Raster, tops: &[TreeTop]) -> Segmentation {
        let mask: Vec<bool> = chm.data.iter().map(|&v| v >= self.min_height).collect();

        let (labels, method) = match self.config.strategy {
            SegmentationStrategy::Propagation => (
                propagate(chm, &mask, tops),
                SegmentationMethod::Propagation,
            ),
            SegmentationStrategy::Watershed => match watershed(chm, &mask, tops) {
                Ok(labels) => (labels, SegmentationMethod::Watershed),
                Err(e) => {
                    log::warn!("{}, falling back to label propagation", e);
                    (
                        propagate(chm, &mask, tops),
                        SegmentationMethod::PropagationFallback,
                    )
                }
            },
        };

        Segmentation {
            labels,
            rows: chm.rows(),
            cols: chm.cols(),
            method,
            segment_count: tops.len(),
        }
    }
}

/// Seed marker cells. Markers off the mask stay unlabelled; a cell claimed
/// twice keeps the taller (earlier) top.
fn seed(chm: &Raster, mask: &[bool], tops: &[TreeTop]) -> (Vec<i32>, Vec<usize>) {
    let mut labels = vec![0i32; chm.len()];
    let mut seeds = Vec::with_capacity(tops.len());
    for (rank, top) in tops.iter().enumerate() {
        if top.row >= chm.rows() || top.col >= chm.cols() {
            continue;
        }
        let idx = chm.grid.index(top.row, top.col);
        if mask[idx] && labels[idx] == 0 {
            labels[idx] = rank as i32 + 1;
            seeds.push(idx);
        }
    }
    (labels, seeds)
}

fn neighbours(idx: usize, rows: usize, cols: usize) -> impl Iterator<Item = usize> {
    let (r, c) = ((idx / cols) as isize, (idx % cols) as isize);
    NEIGHBOURS.iter().filter_map(move |&(dr, dc)| {
        let (nr, nc) = (r + dr, c + dc);
        if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
            Some(nr as usize * cols + nc as usize)
        } else {
            None
        }
    })
}

fn watershed(chm: &Raster, mask: &[bool], tops: &[TreeTop]) -> Result<Vec<i32>> {
    if let Some(top) = tops
        .iter()
        .find(|t| t.row >= chm.rows() || t.col >= chm.cols())
    {
        return Err(ForestError::WatershedFailed(format!(
            "marker ({}, {}) outside a {}x{} grid",
            top.row,
            top.col,
            chm.rows(),
            chm.cols()
        )));
    }
    if let Some(bad) = chm.data.iter().position(|v| !v.is_finite()) {
        return Err(ForestError::WatershedFailed(format!(
            "non-finite canopy height at cell {}",
            bad
        )));
    }

    let (rows, cols) = (chm.rows(), chm.cols());
    let (mut labels, seeds) = seed(chm, mask, tops);
    let mut heap = BinaryHeap::with_capacity(seeds.len());
    let mut age = 0u64;
    for idx in seeds {
        heap.push(FloodItem {
            height: chm.data[idx],
            age,
            idx,
        });
        age += 1;
    }

    while let Some(item) = heap.pop() {
        let label = labels[item.idx];
        for n in neighbours(item.idx, rows, cols) {
            if mask[n] && labels[n] == 0 {
                labels[n] = label;
                heap.push(FloodItem {
                    height: chm.data[n],
                    age,
                    idx: n,
                });
                age += 1;
            }
        }
    }
    Ok(labels)
}

/// Iterative 4-neighbour propagation, at most `max(rows, cols)` sweeps.
/// Each sweep reads the previous sweep's labels so the result does not
/// depend on scan order within a sweep.
fn propagate(chm: &Raster, mask: &[bool], tops: &[TreeTop]) -> Vec<i32> {
    let (rows, cols) = (chm.rows(), chm.cols());
    let (mut labels, _) = seed(chm, mask, tops);
    let max_iterations = rows.max(cols);

    for iteration in 0..max_iterations {
        let previous = labels.clone();
        let mut changed = false;
        for idx in 0..labels.len() {
            if !mask[idx] || previous[idx] != 0 {
                continue;
            }
            if let Some(label) = neighbours(idx, rows, cols)
                .map(|n| previous[n])
                .find(|&l| l != 0)
            {
                labels[idx] = label;
                changed = true;
            }
        }
        if !changed {
            log::debug!("Label propagation converged after {} sweeps", iteration);
            break;
        }
    }
    labels
}
