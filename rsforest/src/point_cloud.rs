//! Already-parsed LiDAR returns, stored column-wise.

use serde::{Deserialize, Serialize};

use crate::commons::global_variables::GROUND_CLASS;
use crate::error::{ForestError, Result};
use crate::geo_core::BoundingBox;

/// Point cloud in struct-of-arrays layout.
///
/// The four columns are expected to have the same length; [`validate`]
/// checks it for clouds assembled by hand. Classification codes follow ASPRS
/// (2 = ground).
///
/// [`validate`]: PointCloud::validate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub classification: Vec<u8>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from columns. Columns of unequal length are truncated to the
    /// shortest one.
    pub fn from_columns(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>, classification: Vec<u8>) -> Self {
        let n = x.len().min(y.len()).min(z.len()).min(classification.len());
        if n != x.len() || n != y.len() || n != z.len() || n != classification.len() {
            log::warn!(
                "Point columns have unequal lengths ({}, {}, {}, {}), truncating to {}",
                x.len(),
                y.len(),
                z.len(),
                classification.len(),
                n
            );
        }
        let mut cloud = PointCloud {
            x,
            y,
            z,
            classification,
        };
        cloud.x.truncate(n);
        cloud.y.truncate(n);
        cloud.z.truncate(n);
        cloud.classification.truncate(n);
        cloud
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64, classification: u8) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.classification.push(classification);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Error unless the four columns have the same length.
    pub fn validate(&self) -> Result<()> {
        let n = self.x.len();
        if self.y.len() == n && self.z.len() == n && self.classification.len() == n {
            Ok(())
        } else {
            Err(ForestError::ColumnLengthMismatch {
                x: self.x.len(),
                y: self.y.len(),
                z: self.z.len(),
                classification: self.classification.len(),
            })
        }
    }

    /// Rows present in every column.
    fn complete_len(&self) -> usize {
        self.x
            .len()
            .min(self.y.len())
            .min(self.z.len())
            .min(self.classification.len())
    }

    /// XY extent of the finite points.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_coords(&self.x, &self.y)
    }

    /// Points whose classification equals `class_code`.
    pub fn filter_class(&self, class_code: u8) -> PointCloud {
        let mut out = PointCloud::new();
        for i in 0..self.complete_len() {
            if self.classification[i] == class_code {
                out.push(self.x[i], self.y[i], self.z[i], self.classification[i]);
            }
        }
        out
    }

    /// Ground returns (class 2).
    pub fn ground_points(&self) -> PointCloud {
        self.filter_class(GROUND_CLASS)
    }

    /// Indices of points with finite coordinates.
    pub fn finite_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.complete_len()).filter(move |&i| self.x[i].is_finite() && self.y[i].is_finite() && self.z[i].is_finite())
    }
}
