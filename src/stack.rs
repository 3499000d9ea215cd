//! Decoded band stacks and their observation-matrix form.
//!
//! An [`ImageStack`] is the engine's only input: an H×W×B `f32` array whose
//! bands are already decoded, co-registered, and on a consistent scale. File
//! formats, resampling, and band alignment are the stack provider's problem,
//! not this crate's.

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PctError, PctResult};

/// Value range of the source imagery, as reported by the stack provider.
///
/// Consumed only by the export helpers in [`crate::export`]; the numeric
/// pipeline never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Measures the actual value range of a stack, skipping NaNs.
    ///
    /// Returns `None` when every element is NaN.
    pub fn of(stack: &ImageStack) -> Option<Self> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in stack.data().iter() {
            if v.is_nan() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
        }
        if min.is_finite() && max.is_finite() {
            Some(Self { min, max })
        } else {
            None
        }
    }

    /// A range drives global scaling only when it is finite and
    /// non-degenerate.
    pub fn is_usable(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }
}

/// An H×W×B stack of co-registered raster bands, `f32`, validated non-empty.
#[derive(Debug, Clone)]
pub struct ImageStack {
    data: Array3<f32>,
    value_range: Option<ValueRange>,
}

impl ImageStack {
    /// Wraps a decoded H×W×B array.
    ///
    /// # Errors
    ///
    /// Returns [`PctError::EmptyStack`] when any dimension is zero. Nothing
    /// is constructed in that case.
    pub fn new(data: Array3<f32>) -> PctResult<Self> {
        let (height, width, bands) = data.dim();
        if height == 0 || width == 0 || bands == 0 {
            return Err(PctError::EmptyStack {
                height,
                width,
                bands,
            });
        }
        Ok(Self {
            data,
            value_range: None,
        })
    }

    /// Stacks same-shaped 2-D bands along the band axis, in selection order.
    ///
    /// # Errors
    ///
    /// Returns [`PctError::EmptyStack`] for an empty band list or zero-sized
    /// bands, and [`PctError::BandShapeMismatch`] when a band's spatial
    /// shape differs from the first band's.
    pub fn from_bands(bands: Vec<Array2<f32>>) -> PctResult<Self> {
        let first = bands.first().ok_or(PctError::EmptyStack {
            height: 0,
            width: 0,
            bands: 0,
        })?;
        let (height, width) = first.dim();
        for (index, band) in bands.iter().enumerate() {
            let (got_height, got_width) = band.dim();
            if (got_height, got_width) != (height, width) {
                return Err(PctError::BandShapeMismatch {
                    index,
                    expected_height: height,
                    expected_width: width,
                    got_height,
                    got_width,
                });
            }
        }
        let views: Vec<ArrayView2<f32>> = bands.iter().map(|band| band.view()).collect();
        let data = ndarray::stack(Axis(2), &views)?;
        Self::new(data)
    }

    /// Attaches the source imagery's value range (see [`ValueRange`]).
    pub fn with_value_range(mut self, range: ValueRange) -> Self {
        self.value_range = Some(range);
        self
    }

    pub fn value_range(&self) -> Option<ValueRange> {
        self.value_range
    }

    /// `(height, width, bands)`.
    pub fn dims(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// View of one band's H×W plane.
    ///
    /// # Panics
    ///
    /// Panics when `index >= bands`, like any slice index.
    pub fn band(&self, index: usize) -> ArrayView2<f32> {
        self.data.index_axis(Axis(2), index)
    }

    /// Flattens to the M×B observation matrix, M = H·W, pixels in row-major
    /// order. Row `y * width + x` holds pixel `(y, x)`, so reshaping an M×B
    /// result back to H×W×B restores pixel positions exactly.
    pub(crate) fn to_observations(&self) -> Array2<f32> {
        let (height, width, bands) = self.data.dim();
        let flat: Vec<f32> = self.data.iter().copied().collect();
        Array2::from_shape_vec((height * width, bands), flat)
            .expect("H*W*B elements always reshape to (H*W, B)")
    }
}
