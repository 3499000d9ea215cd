//! Byte-depth helpers for display/export consumers.
//!
//! These operate on the engine's `f32` output and never feed back into the
//! numeric pipeline. Dtype scaling lives here precisely so the core contract
//! stays in float space.

use float_cmp::approx_eq;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::stack::ValueRange;

/// Min–max normalizes one band to 0–255.
///
/// Constant and all-NaN bands map to zeros. NaNs elsewhere are skipped when
/// measuring the range and come out as 0.
pub fn normalize_band_to_u8(band: ArrayView2<f32>) -> Array2<u8> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in band.iter() {
        if v.is_nan() {
            continue;
        }
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() || approx_eq!(f32, min, max, ulps = 4) {
        return Array2::zeros(band.raw_dim());
    }
    let scale = max - min;
    band.mapv(|v| ((v - min) / scale * 255.0).clamp(0.0, 255.0) as u8)
}

/// Normalizes each band of an H×W×B stack independently, one u8 image per
/// band.
pub fn stack_to_u8_bands(stack: ArrayView3<f32>) -> Vec<Array2<u8>> {
    stack.axis_iter(Axis(2)).map(normalize_band_to_u8).collect()
}

/// Scales a whole stack to u8.
///
/// With a usable [`ValueRange`] (typically the source imagery's range, as
/// supplied by the stack provider) all bands share one global scale, which
/// keeps relative band brightness intact. Otherwise each band is normalized
/// independently.
pub fn stack_to_u8_scaled(stack: ArrayView3<f32>, range: Option<ValueRange>) -> Array3<u8> {
    match range {
        Some(r) if r.is_usable() => {
            let scale = r.max - r.min;
            stack.mapv(|v| ((v - r.min) / scale * 255.0).clamp(0.0, 255.0) as u8)
        }
        _ => {
            let (height, width, bands) = stack.dim();
            let mut out = Array3::zeros((height, width, bands));
            for (i, band) in stack.axis_iter(Axis(2)).enumerate() {
                out.index_axis_mut(Axis(2), i)
                    .assign(&normalize_band_to_u8(band));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn constant_band_normalizes_to_zeros() {
        let band = Array2::from_elem((3, 3), 42.0_f32);
        let u8s = normalize_band_to_u8(band.view());
        assert!(u8s.iter().all(|&v| v == 0));
    }

    #[test]
    fn normalized_band_spans_full_range() {
        let band = array![[0.0_f32, 5.0], [10.0, 2.5]];
        let u8s = normalize_band_to_u8(band.view());
        assert_eq!(u8s[[0, 0]], 0);
        assert_eq!(u8s[[1, 0]], 255);
        assert_eq!(u8s[[0, 1]], 127);
    }

    #[test]
    fn nan_pixels_map_to_zero() {
        let band = array![[f32::NAN, 1.0], [2.0, 3.0]];
        let u8s = normalize_band_to_u8(band.view());
        assert_eq!(u8s[[0, 0]], 0);
        assert_eq!(u8s[[1, 1]], 255);
    }

    #[test]
    fn per_band_normalization_is_independent() {
        let mut stack = Array3::<f32>::zeros((2, 2, 2));
        stack[[0, 0, 0]] = 1.0; // band 0 spans 0..1
        stack[[0, 0, 1]] = 1000.0; // band 1 spans 0..1000
        let bands = stack_to_u8_bands(stack.view());
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0][[0, 0]], 255);
        assert_eq!(bands[1][[0, 0]], 255);
    }

    #[test]
    fn global_range_scales_all_bands_together() {
        let mut stack = Array3::<f32>::zeros((1, 2, 2));
        stack[[0, 0, 0]] = 50.0;
        stack[[0, 1, 1]] = 100.0;
        let out = stack_to_u8_scaled(
            stack.view(),
            Some(ValueRange {
                min: 0.0,
                max: 100.0,
            }),
        );
        assert_eq!(out[[0, 0, 0]], 127);
        assert_eq!(out[[0, 1, 1]], 255);
        assert_eq!(out[[0, 1, 0]], 0);
    }

    #[test]
    fn degenerate_range_falls_back_to_per_band() {
        let mut stack = Array3::<f32>::zeros((1, 2, 1));
        stack[[0, 1, 0]] = 4.0;
        let out = stack_to_u8_scaled(
            stack.view(),
            Some(ValueRange { min: 5.0, max: 5.0 }),
        );
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[0, 1, 0]], 255);
    }

    #[test]
    fn values_outside_the_range_clip() {
        let stack = Array3::from_elem((1, 1, 1), 300.0_f32);
        let out = stack_to_u8_scaled(
            stack.view(),
            Some(ValueRange {
                min: 0.0,
                max: 255.0,
            }),
        );
        assert_eq!(out[[0, 0, 0]], 255);
    }
}
