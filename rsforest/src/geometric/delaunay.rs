//! Delaunay triangulation of scattered XY points, built on `spade`.

use std::collections::HashSet;

use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation as _};

use crate::error::{ForestError, Result};

/// Triangulated irregular network over a set of input points.
///
/// `vertices` holds the distinct positions; `source_index[v]` is the index of
/// the input point that produced vertex `v` (the first one when several input
/// points share a position).
#[derive(Debug, Clone)]
pub struct Triangulation {
    pub vertices: Vec<[f64; 2]>,
    pub source_index: Vec<usize>,
    pub triangles: Vec<[usize; 3]>,
}

/// Vertex handed to spade; `index` points back into `Triangulation::vertices`.
struct TinVertex {
    position: Point2<f64>,
    index: usize,
}

impl HasPosition for TinVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// Relative tolerance below which a point set counts as flat.
const FLAT_TOLERANCE: f64 = 1e-12;

fn signed_area(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]))
}

/// Triangulate the points `(xs[i], ys[i])`.
///
/// Non-finite and duplicate positions are ignored. Fails with
/// [`ForestError::DegenerateTriangulation`] when fewer than 3 distinct
/// positions remain, when they are all colinear, or when spade rejects a
/// coordinate.
pub fn triangulate(xs: &[f64], ys: &[f64]) -> Result<Triangulation> {
    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut vertices: Vec<[f64; 2]> = Vec::new();
    let mut source_index: Vec<usize> = Vec::new();
    for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        // Normalise -0.0 so it collapses with 0.0
        let key = ((x + 0.0).to_bits(), (y + 0.0).to_bits());
        if seen.insert(key) {
            vertices.push([x, y]);
            source_index.push(i);
        }
    }

    let n = vertices.len();
    if n < 3 {
        return Err(ForestError::DegenerateTriangulation(format!(
            "{} distinct positions, at least 3 are required",
            n
        )));
    }
    if all_colinear(&vertices) {
        return Err(ForestError::DegenerateTriangulation(format!(
            "all {} positions are colinear",
            n
        )));
    }

    let tin_vertices: Vec<TinVertex> = vertices
        .iter()
        .enumerate()
        .map(|(index, p)| TinVertex {
            position: Point2::new(p[0], p[1]),
            index,
        })
        .collect();
    let delaunay: DelaunayTriangulation<TinVertex> = DelaunayTriangulation::bulk_load(tin_vertices)
        .map_err(|e| ForestError::DegenerateTriangulation(format!("spade rejected the points: {}", e)))?;

    let triangles: Vec<[usize; 3]> = delaunay
        .inner_faces()
        .map(|face| face.vertices().map(|v| v.data().index))
        .collect();
    if triangles.is_empty() {
        return Err(ForestError::DegenerateTriangulation(
            "triangulation has no inner face".to_string(),
        ));
    }

    Ok(Triangulation {
        vertices,
        source_index,
        triangles,
    })
}

fn all_colinear(vertices: &[[f64; 2]]) -> bool {
    let min_x = vertices.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let min_y = vertices.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let max_x = vertices.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
    let max_y = vertices.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);
    let span = (max_x - min_x).max(max_y - min_y);
    if span <= 0.0 {
        return true;
    }

    // Local coordinates keep the area test precise for projected CRS values
    let local = |p: [f64; 2]| [p[0] - min_x, p[1] - min_y];
    let a = local(vertices[0]);
    // Farthest point from the first one gives a stable reference direction
    let b = vertices
        .iter()
        .map(|&p| local(p))
        .max_by(|p, q| {
            let dp = (p[0] - a[0]).powi(2) + (p[1] - a[1]).powi(2);
            let dq = (q[0] - a[0]).powi(2) + (q[1] - a[1]).powi(2);
            dp.total_cmp(&dq)
        })
        .unwrap_or(a);
    let tolerance = FLAT_TOLERANCE.sqrt() * span * span;
    vertices
        .iter()
        .all(|&c| signed_area(a, b, local(c)).abs() <= tolerance)
}

impl Triangulation {
    /// Barycentric weights of `(x, y)` in triangle `t`, `None` when the point
    /// is outside (with a small tolerance on the edges) or the triangle is flat.
    pub fn barycentric(&self, t: usize, x: f64, y: f64) -> Option<[f64; 3]> {
        let [i1, i2, i3] = self.triangles[t];
        let [x1, y1] = self.vertices[i1];
        let [x2, y2] = self.vertices[i2];
        let [x3, y3] = self.vertices[i3];
        let denom = (y2 - y3) * (x1 - x3) + (x3 - x2) * (y1 - y3);
        if denom.abs() < f64::EPSILON {
            return None;
        }
        let l1 = ((y2 - y3) * (x - x3) + (x3 - x2) * (y - y3)) / denom;
        let l2 = ((y3 - y1) * (x - x3) + (x1 - x3) * (y - y3)) / denom;
        let l3 = 1.0 - l1 - l2;
        const EDGE_TOLERANCE: f64 = -1e-9;
        if l1 >= EDGE_TOLERANCE && l2 >= EDGE_TOLERANCE && l3 >= EDGE_TOLERANCE {
            Some([l1, l2, l3])
        } else {
            None
        }
    }

    /// XY bounding box of triangle `t` as `(min_x, min_y, max_x, max_y)`.
    pub fn triangle_bounds(&self, t: usize) -> (f64, f64, f64, f64) {
        let v = self.triangles[t].map(|i| self.vertices[i]);
        (
            v[0][0].min(v[1][0]).min(v[2][0]),
            v[0][1].min(v[1][1]).min(v[2][1]),
            v[0][0].max(v[1][0]).max(v[2][0]),
            v[0][1].max(v[1][1]).max(v[2][1]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_area(tin: &Triangulation) -> f64 {
        tin.triangles
            .iter()
            .map(|t| signed_area(tin.vertices[t[0]], tin.vertices[t[1]], tin.vertices[t[2]]).abs())
            .sum()
    }

    /// Circumcentre and squared radius of a triangle.
    fn circumcircle(pts: &[[f64; 2]], v: [usize; 3]) -> (f64, f64, f64) {
        let [ax, ay] = pts[v[0]];
        let [bx, by] = pts[v[1]];
        let [cx, cy] = pts[v[2]];
        let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
        let a2 = ax * ax + ay * ay;
        let b2 = bx * bx + by * by;
        let c2 = cx * cx + cy * cy;
        let ux = (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d;
        let uy = (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d;
        (ux, uy, (ax - ux).powi(2) + (ay - uy).powi(2))
    }

    #[test]
    fn test_square_gives_two_triangles() {
        let xs = [0.0, 1.0, 1.0, 0.0];
        let ys = [0.0, 0.0, 1.0, 1.0];
        let tin = triangulate(&xs, &ys).unwrap();
        assert_eq!(tin.triangles.len(), 2);
        assert!((total_area(&tin) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_jittered_grid_is_delaunay() {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                // Jitter avoids exactly cocircular quadruples
                xs.push(i as f64 * 10.0 + ((i * 7 + j * 13) % 5) as f64 * 0.1);
                ys.push(j as f64 * 10.0 + ((i * 11 + j * 3) % 7) as f64 * 0.1);
            }
        }
        let tin = triangulate(&xs, &ys).unwrap();
        assert!(tin.triangles.len() >= 2 * 36 - 2 - 20);
        assert!(tin.triangles.len() <= 2 * 36 - 5);
        // Hull area is close to the 50 x 50 lattice extent
        assert!((total_area(&tin) - 2500.0).abs() < 100.0);

        // Empty circumcircle property
        for t in &tin.triangles {
            let (cx, cy, r2) = circumcircle(&tin.vertices, *t);
            for (v, p) in tin.vertices.iter().enumerate() {
                if t.contains(&v) {
                    continue;
                }
                let d2 = (p[0] - cx).powi(2) + (p[1] - cy).powi(2);
                assert!(d2 >= r2 * (1.0 - 1e-9), "vertex {} inside circumcircle of {:?}", v, t);
            }
        }
    }

    #[test]
    fn test_large_random_cloud() {
        let mut seed: u64 = 7;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        let n = 50_000;
        let (xs, ys): (Vec<f64>, Vec<f64>) = (0..n).map(|_| (next() * 1000.0, next() * 1000.0)).unzip();
        let tin = triangulate(&xs, &ys).unwrap();
        let v = tin.vertices.len();
        assert_eq!(v, n);
        // Euler: 2v - 2 - h triangles for h hull vertices
        assert!(tin.triangles.len() <= 2 * v - 5);
        assert!(tin.triangles.len() >= 2 * v - 2 - 500);
        assert!(total_area(&tin) > 0.98 * 1000.0 * 1000.0);
        for t in &tin.triangles {
            assert!(t.iter().all(|&i| i < v));
        }
    }

    #[test]
    fn test_large_coordinates() {
        let xs = [500_000.0, 500_010.0, 500_000.0, 500_010.0, 500_005.0];
        let ys = [6_200_000.0, 6_200_000.0, 6_200_010.0, 6_200_010.0, 6_200_004.0];
        let tin = triangulate(&xs, &ys).unwrap();
        assert_eq!(tin.triangles.len(), 4);
        assert!((total_area(&tin) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let xs = [0.0, 0.0, 4.0, 0.0];
        let ys = [0.0, 0.0, 0.0, 3.0];
        let tin = triangulate(&xs, &ys).unwrap();
        assert_eq!(tin.vertices.len(), 3);
        assert_eq!(tin.source_index, vec![0, 2, 3]);
        assert_eq!(tin.triangles.len(), 1);
    }

    #[test]
    fn test_colinear_is_degenerate() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.0, 1.0, 2.0, 3.0];
        assert!(matches!(
            triangulate(&xs, &ys),
            Err(ForestError::DegenerateTriangulation(_))
        ));
    }

    #[test]
    fn test_too_few_distinct_points() {
        let xs = [1.0, 1.0, 1.0];
        let ys = [2.0, 2.0, 2.0];
        assert!(triangulate(&xs, &ys).is_err());
    }

    #[test]
    fn test_barycentric() {
        let xs = [0.0, 4.0, 0.0];
        let ys = [0.0, 0.0, 4.0];
        let tin = triangulate(&xs, &ys).unwrap();
        let w = tin.barycentric(0, 1.0, 1.0).unwrap();
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(w.iter().all(|&l| l > 0.0));
        // Vertices are inside (on the boundary)
        assert!(tin.barycentric(0, 4.0, 0.0).is_some());
        assert!(tin.barycentric(0, 3.0, 3.0).is_none());
        assert_eq!(tin.triangle_bounds(0), (0.0, 0.0, 4.0, 4.0));
    }
}
