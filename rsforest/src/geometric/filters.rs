//! Neighbourhood filters on rasters: Gaussian smoothing and moving-window maximum.

use crate::geometric::raster::Raster;

/// Gaussian smoothing (2D separable). `sigma` in cells.
///
/// The kernel is truncated at 3 sigma and renormalised over the in-bounds,
/// non-NaN cells, so borders are not darkened. NaN cells stay NaN.
pub fn gaussian_smooth(raster: &Raster, sigma: f64) -> Raster {
    if !(sigma > 0.0) || raster.is_empty() {
        return raster.clone();
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| {
            let x = i as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    // Horizontal pass
    let mut tmp = raster.clone();
    for r in 0..raster.rows() {
        for c in 0..raster.cols() {
            if raster.get(r, c).is_nan() {
                continue;
            }
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for (ki, di) in (-radius..=radius).enumerate() {
                if let Some(v) = raster.get_opt(r as isize, c as isize + di) {
                    sum += v * kernel[ki];
                    wsum += kernel[ki];
                }
            }
            if wsum > 0.0 {
                tmp.set(r, c, sum / wsum);
            }
        }
    }
    // Vertical pass
    let mut out = tmp.clone();
    for r in 0..raster.rows() {
        for c in 0..raster.cols() {
            if tmp.get(r, c).is_nan() {
                continue;
            }
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for (ki, di) in (-radius..=radius).enumerate() {
                if let Some(v) = tmp.get_opt(r as isize + di, c as isize) {
                    sum += v * kernel[ki];
                    wsum += kernel[ki];
                }
            }
            if wsum > 0.0 {
                out.set(r, c, sum / wsum);
            }
        }
    }
    out
}

/// Moving-window maximum over a `size × size` square (separable).
///
/// Out-of-bounds and NaN cells are ignored, which matches a reflected border
/// for a maximum. `size` is expected to be odd.
pub fn maximum_filter(raster: &Raster, size: usize) -> Raster {
    let half = (size / 2) as isize;
    if half == 0 || raster.is_empty() {
        return raster.clone();
    }

    let window_max = |src: &Raster, r: usize, c: usize, horizontal: bool| -> f64 {
        let mut best = f64::NAN;
        for d in -half..=half {
            let (rr, cc) = if horizontal {
                (r as isize, c as isize + d)
            } else {
                (r as isize + d, c as isize)
            };
            if let Some(v) = src.get_opt(rr, cc) {
                if best.is_nan() || v > best {
                    best = v;
                }
            }
        }
        best
    };

    let mut tmp = raster.clone();
    for r in 0..raster.rows() {
        for c in 0..raster.cols() {
            tmp.set(r, c, window_max(raster, r, c, true));
        }
    }
    let mut out = tmp.clone();
    for r in 0..raster.rows() {
        for c in 0..raster.cols() {
            out.set(r, c, window_max(&tmp, r, c, false));
        }
    }
    out
}
