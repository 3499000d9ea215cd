//! The PCT pipeline engine.

use log::{debug, info};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{PctError, PctResult};
use crate::linalg::{BackendEigh, LinAlgBackendProvider};
use crate::stack::{ImageStack, ValueRange};

/// Norm below which an eigenvector is treated as numerically zero.
const NORM_FLOOR: f32 = 1e-6;

/// Snapshot of a computed decomposition for display/export consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PctReport {
    pub height: usize,
    pub width: usize,
    pub bands: usize,
    /// Eigenvalues of the band covariance, descending.
    pub eigenvalues: Array1<f32>,
    /// Share of total variance captured by each component.
    pub variance_ratio: Array1<f32>,
}

/// Principal component transform engine over one in-memory band stack.
///
/// The engine is a strict, stateful pipeline:
/// [`load`](PctEngine::load) → [`compute_mean`](PctEngine::compute_mean) →
/// [`compute_covariance`](PctEngine::compute_covariance) →
/// [`compute_eigendecomposition`](PctEngine::compute_eigendecomposition) →
/// [`compute_scores`](PctEngine::compute_scores), with
/// [`reconstruct`](PctEngine::reconstruct) callable any number of times once
/// scores exist. Each stage checks that its prerequisites have been computed
/// and fails with [`PctError::StageNotReady`] otherwise; no stage computes a
/// missing prerequisite implicitly. A failed call leaves prior state
/// untouched. Loading a new stack clears every derived result.
///
/// All returned arrays are owned copies; callers may mutate them freely
/// without touching engine state. One engine instance serves one logical
/// image — instances share nothing, and a single instance is not safe for
/// concurrent use.
pub struct PctEngine {
    stack: Option<ImageStack>,
    observations: Option<Array2<f32>>,
    mean: Option<Array1<f32>>,
    covariance: Option<Array2<f32>>,
    eigenvalues: Option<Array1<f32>>,
    eigenvectors: Option<Array2<f32>>,
    scores: Option<Array2<f32>>,
    backend: LinAlgBackendProvider,
}

impl Default for PctEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PctEngine {
    /// Creates an empty engine with nothing loaded.
    pub fn new() -> Self {
        Self {
            stack: None,
            observations: None,
            mean: None,
            covariance: None,
            eigenvalues: None,
            eigenvectors: None,
            scores: None,
            backend: LinAlgBackendProvider::new(),
        }
    }

    /// Loads a stack and flattens it to the M×B observation matrix.
    ///
    /// Every derived result (mean, covariance, eigenpairs, scores) is
    /// cleared; the pipeline restarts from the Loaded state.
    pub fn load(&mut self, stack: ImageStack) {
        let (height, width, bands) = stack.dims();
        info!("loading {height}x{width} stack with {bands} bands");
        self.observations = Some(stack.to_observations());
        self.stack = Some(stack);
        self.mean = None;
        self.covariance = None;
        self.eigenvalues = None;
        self.eigenvectors = None;
        self.scores = None;
    }

    /// Computes the per-band arithmetic mean of the observations.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] when no stack is loaded.
    pub fn compute_mean(&mut self) -> PctResult<()> {
        let observations = self.observations.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute mean",
            missing: "image stack",
        })?;
        let pixels = observations.nrows();
        let mean = observations.sum_axis(Axis(0)) / pixels as f32;
        debug!("band means over {pixels} pixels: {mean:?}");
        self.mean = Some(mean);
        Ok(())
    }

    /// Computes the B×B sample covariance of the centered observations,
    /// with divisor `max(1, M − 1)`.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] when the mean has not been computed.
    pub fn compute_covariance(&mut self) -> PctResult<()> {
        let observations = self.observations.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute covariance",
            missing: "image stack",
        })?;
        let mean = self.mean.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute covariance",
            missing: "mean",
        })?;
        let started = Instant::now();
        let pixels = observations.nrows();
        let mut centered = observations.clone();
        centered -= mean;
        let mut covariance = centered.t().dot(&centered);
        covariance /= pixels.saturating_sub(1).max(1) as f32;
        debug!(
            "covariance of {} bands over {pixels} pixels in {:?}",
            covariance.nrows(),
            started.elapsed()
        );
        self.covariance = Some(covariance);
        Ok(())
    }

    /// Eigendecomposes the symmetric covariance matrix and stores the
    /// eigenpairs sorted by descending eigenvalue.
    ///
    /// The sort is stable, so equal eigenvalues keep the solver's column
    /// order. Eigenvectors are renormalized to unit length; their sign is
    /// solver-defined and carries no meaning.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] when the covariance has not been
    /// computed; [`PctError::Eigh`] when the backend solver fails.
    pub fn compute_eigendecomposition(&mut self) -> PctResult<()> {
        let covariance = self.covariance.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute eigendecomposition",
            missing: "covariance",
        })?;
        let started = Instant::now();
        let decomposition = self
            .backend
            .eigh_upper(covariance)
            .map_err(|e| PctError::Eigh(e.to_string()))?;

        let mut eig_pairs: Vec<(f32, Array1<f32>)> = decomposition
            .eigenvalues
            .into_iter()
            .zip(
                decomposition
                    .eigenvectors
                    .columns()
                    .into_iter()
                    .map(|col| col.to_owned()),
            )
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let bands = eig_pairs.len();
        let mut eigenvalues = Array1::<f32>::zeros(bands);
        let mut unit_vectors: Vec<Array1<f32>> = Vec::with_capacity(bands);
        for (i, (value, mut vector)) in eig_pairs.into_iter().enumerate() {
            // The covariance is PSD; anything below zero is round-off.
            eigenvalues[i] = value.max(0.0);
            let norm = vector.dot(&vector).sqrt();
            if norm > NORM_FLOOR {
                vector.mapv_inplace(|x| x / norm);
            } else {
                vector.fill(0.0);
            }
            unit_vectors.push(vector);
        }
        let views: Vec<ArrayView1<f32>> = unit_vectors.iter().map(|v| v.view()).collect();
        let eigenvectors = ndarray::stack(Axis(1), &views)?;
        debug!(
            "eigendecomposition of {bands}x{bands} covariance in {:?}",
            started.elapsed()
        );
        self.eigenvalues = Some(eigenvalues);
        self.eigenvectors = Some(eigenvectors);
        Ok(())
    }

    /// Projects the centered observations onto the eigenvectors, producing
    /// the M×B score matrix.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] when the mean or the eigendecomposition
    /// is missing.
    pub fn compute_scores(&mut self) -> PctResult<()> {
        let observations = self.observations.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute scores",
            missing: "image stack",
        })?;
        let mean = self.mean.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute scores",
            missing: "mean",
        })?;
        let eigenvectors = self.eigenvectors.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute scores",
            missing: "eigenvectors",
        })?;
        let started = Instant::now();
        let mut centered = observations.clone();
        centered -= mean;
        let scores = centered.dot(eigenvectors);
        debug!(
            "projected {} pixels onto {} components in {:?}",
            scores.nrows(),
            scores.ncols(),
            started.elapsed()
        );
        self.scores = Some(scores);
        Ok(())
    }

    /// Runs the whole pipeline on the loaded stack, in the fixed stage
    /// order. The explicit run-everything entry point; the individual stage
    /// methods still hard-fail when called out of order.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] when no stack is loaded, or any stage
    /// error.
    pub fn compute_all(&mut self) -> PctResult<()> {
        let started = Instant::now();
        self.compute_mean()?;
        self.compute_covariance()?;
        self.compute_eigendecomposition()?;
        self.compute_scores()?;
        info!(
            "principal component transform complete in {:?}",
            started.elapsed()
        );
        Ok(())
    }

    /// One component's H×W score plane, as an owned copy.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] before scores exist;
    /// [`PctError::ComponentOutOfRange`] when `index >= bands`.
    pub fn component(&self, index: usize) -> PctResult<Array2<f32>> {
        let scores = self.scores.as_ref().ok_or(PctError::StageNotReady {
            operation: "slice component",
            missing: "scores",
        })?;
        let (height, width, bands) = self.loaded_dims()?;
        if index >= bands {
            return Err(PctError::ComponentOutOfRange { index, bands });
        }
        Ok(scores
            .column(index)
            .to_owned()
            .into_shape_with_order((height, width))?)
    }

    /// The full H×W×B principal-component stack (score matrix reshaped to
    /// pixel positions), as an owned copy.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] before scores exist.
    pub fn component_stack(&self) -> PctResult<Array3<f32>> {
        let scores = self.scores.as_ref().ok_or(PctError::StageNotReady {
            operation: "assemble component stack",
            missing: "scores",
        })?;
        let (height, width, bands) = self.loaded_dims()?;
        Ok(scores
            .clone()
            .into_shape_with_order((height, width, bands))?)
    }

    /// Reconstructs an approximate H×W×B stack from the first `k`
    /// components: `Scores[:, :k] · Eigenvectors[:, :k]ᵀ + mean`.
    ///
    /// `k = 0` is valid and yields the mean image at every pixel; `k = B`
    /// reproduces the original up to round-off.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] before scores exist;
    /// [`PctError::RankOutOfRange`] when `k > bands`.
    pub fn reconstruct(&self, k: usize) -> PctResult<Array3<f32>> {
        let scores = self.scores.as_ref().ok_or(PctError::StageNotReady {
            operation: "reconstruct",
            missing: "scores",
        })?;
        let eigenvectors = self.eigenvectors.as_ref().ok_or(PctError::StageNotReady {
            operation: "reconstruct",
            missing: "eigenvectors",
        })?;
        let mean = self.mean.as_ref().ok_or(PctError::StageNotReady {
            operation: "reconstruct",
            missing: "mean",
        })?;
        let (height, width, bands) = self.loaded_dims()?;
        if k > bands {
            return Err(PctError::RankOutOfRange { k, bands });
        }
        let started = Instant::now();
        let mut reconstructed = scores
            .slice(s![.., ..k])
            .dot(&eigenvectors.slice(s![.., ..k]).t());
        reconstructed += mean;
        debug!("reconstructed from {k}/{bands} components in {:?}", started.elapsed());
        Ok(reconstructed.into_shape_with_order((height, width, bands))?)
    }

    /// Mean squared error of `reconstructed` against the loaded stack,
    /// averaged over all H·W·B elements.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] when no stack is loaded;
    /// [`PctError::ShapeMismatch`] when dimensions differ.
    pub fn mse(&self, reconstructed: &Array3<f32>) -> PctResult<f32> {
        let stack = self.stack.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute reconstruction error",
            missing: "image stack",
        })?;
        let expected = stack.dims();
        let got = reconstructed.dim();
        if got != expected {
            return Err(PctError::ShapeMismatch { expected, got });
        }
        let mut sum = 0.0_f64;
        for (&a, &b) in stack.data().iter().zip(reconstructed.iter()) {
            let diff = (a - b) as f64;
            sum += diff * diff;
        }
        let (height, width, bands) = expected;
        Ok((sum / (height * width * bands) as f64) as f32)
    }

    /// Share of total variance captured by each component, descending.
    /// All zeros when the stack is constant (total variance is zero).
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] before the eigendecomposition.
    pub fn variance_ratio(&self) -> PctResult<Array1<f32>> {
        let eigenvalues = self.eigenvalues.as_ref().ok_or(PctError::StageNotReady {
            operation: "compute variance ratio",
            missing: "eigenvalues",
        })?;
        let total: f32 = eigenvalues.iter().filter(|&&v| v > 0.0).sum();
        if total <= 0.0 {
            return Ok(Array1::zeros(eigenvalues.len()));
        }
        Ok(eigenvalues.mapv(|v| v / total))
    }

    /// Serializable snapshot of the decomposition for display/export.
    ///
    /// # Errors
    ///
    /// [`PctError::StageNotReady`] before the eigendecomposition.
    pub fn report(&self) -> PctResult<PctReport> {
        let eigenvalues = self.eigenvalues.as_ref().ok_or(PctError::StageNotReady {
            operation: "build report",
            missing: "eigenvalues",
        })?;
        let (height, width, bands) = self.loaded_dims()?;
        Ok(PctReport {
            height,
            width,
            bands,
            eigenvalues: eigenvalues.clone(),
            variance_ratio: self.variance_ratio()?,
        })
    }

    /// `(height, width, bands)` of the loaded stack, if any.
    pub fn dims(&self) -> Option<(usize, usize, usize)> {
        self.stack.as_ref().map(|stack| stack.dims())
    }

    /// The loaded stack, if any.
    pub fn stack(&self) -> Option<&ImageStack> {
        self.stack.as_ref()
    }

    /// The provider-supplied value range of the loaded stack, if any.
    pub fn value_range(&self) -> Option<ValueRange> {
        self.stack.as_ref().and_then(|stack| stack.value_range())
    }

    /// Per-band mean, if computed.
    pub fn mean(&self) -> Option<&Array1<f32>> {
        self.mean.as_ref()
    }

    /// Band covariance, if computed.
    pub fn covariance(&self) -> Option<&Array2<f32>> {
        self.covariance.as_ref()
    }

    /// Eigenvalues in descending order, if computed.
    pub fn eigenvalues(&self) -> Option<&Array1<f32>> {
        self.eigenvalues.as_ref()
    }

    /// Unit-norm eigenvectors as columns, paired with `eigenvalues`, if
    /// computed.
    pub fn eigenvectors(&self) -> Option<&Array2<f32>> {
        self.eigenvectors.as_ref()
    }

    /// The M×B score matrix, if computed.
    pub fn scores(&self) -> Option<&Array2<f32>> {
        self.scores.as_ref()
    }

    fn loaded_dims(&self) -> PctResult<(usize, usize, usize)> {
        self.dims().ok_or(PctError::StageNotReady {
            operation: "read stack dimensions",
            missing: "image stack",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    fn correlated_stack() -> ImageStack {
        // Two identical bands [[1,2],[3,4]] -- linearly dependent.
        let band = array![[1.0_f32, 2.0], [3.0, 4.0]];
        ImageStack::from_bands(vec![band.clone(), band]).unwrap()
    }

    fn fitted_engine(stack: ImageStack) -> PctEngine {
        let mut engine = PctEngine::new();
        engine.load(stack);
        engine.compute_all().unwrap();
        engine
    }

    #[test]
    fn stage_order_is_enforced() {
        let mut engine = PctEngine::new();
        assert!(matches!(
            engine.compute_mean(),
            Err(PctError::StageNotReady { .. })
        ));

        engine.load(correlated_stack());
        assert!(matches!(
            engine.compute_covariance(),
            Err(PctError::StageNotReady {
                missing: "mean",
                ..
            })
        ));
        assert!(matches!(
            engine.compute_eigendecomposition(),
            Err(PctError::StageNotReady {
                missing: "covariance",
                ..
            })
        ));

        engine.compute_mean().unwrap();
        assert!(matches!(
            engine.compute_scores(),
            Err(PctError::StageNotReady {
                missing: "eigenvectors",
                ..
            })
        ));
        assert!(matches!(
            engine.reconstruct(1),
            Err(PctError::StageNotReady { .. })
        ));
    }

    #[test]
    fn correlated_bands_yield_one_zero_eigenvalue() {
        let engine = fitted_engine(correlated_stack());
        let eigenvalues = engine.eigenvalues().unwrap();
        assert_eq!(eigenvalues.len(), 2);
        // Per-band variance of {1,2,3,4} is 5/3; the single nonzero
        // eigenvalue is its sum over both bands.
        assert_abs_diff_eq!(eigenvalues[0], 10.0 / 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(eigenvalues[1], 0.0, epsilon = 1e-4);

        let ratio = engine.variance_ratio().unwrap();
        assert_abs_diff_eq!(ratio[0], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn mean_matches_per_band_average() {
        let engine = fitted_engine(correlated_stack());
        let mean = engine.mean().unwrap();
        assert_abs_diff_eq!(mean[0], 2.5, epsilon = 1e-6);
        assert_abs_diff_eq!(mean[1], 2.5, epsilon = 1e-6);
    }

    #[test]
    fn component_index_is_range_checked() {
        let engine = fitted_engine(correlated_stack());
        assert!(engine.component(0).is_ok());
        assert!(engine.component(1).is_ok());
        assert!(matches!(
            engine.component(2),
            Err(PctError::ComponentOutOfRange { index: 2, bands: 2 })
        ));
    }

    #[test]
    fn reconstruction_rank_is_range_checked() {
        let engine = fitted_engine(correlated_stack());
        assert!(engine.reconstruct(0).is_ok());
        assert!(engine.reconstruct(2).is_ok());
        assert!(matches!(
            engine.reconstruct(3),
            Err(PctError::RankOutOfRange { k: 3, bands: 2 })
        ));
    }

    #[test]
    fn rank_zero_reconstruction_is_the_mean_image() {
        let engine = fitted_engine(correlated_stack());
        let reconstructed = engine.reconstruct(0).unwrap();
        for &v in reconstructed.iter() {
            assert_abs_diff_eq!(v, 2.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn single_pixel_stack_floors_covariance_divisor() {
        let stack = ImageStack::new(Array3::from_elem((1, 1, 3), 7.0_f32)).unwrap();
        let engine = fitted_engine(stack);
        // M = 1: centered observations are zero, divisor floors at 1.
        for &v in engine.covariance().unwrap().iter() {
            assert_eq!(v, 0.0);
        }
        for &v in engine.eigenvalues().unwrap().iter() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn reload_clears_derived_state() {
        let mut engine = PctEngine::new();
        engine.load(correlated_stack());
        engine.compute_all().unwrap();
        assert!(engine.component(0).is_ok());

        engine.load(correlated_stack());
        assert!(engine.eigenvalues().is_none());
        assert!(engine.scores().is_none());
        assert!(matches!(
            engine.component(0),
            Err(PctError::StageNotReady { .. })
        ));
        assert!(matches!(
            engine.report(),
            Err(PctError::StageNotReady { .. })
        ));
    }

    #[test]
    fn mse_rejects_mismatched_shapes() {
        let engine = fitted_engine(correlated_stack());
        let wrong = Array3::<f32>::zeros((2, 2, 3));
        assert!(matches!(
            engine.mse(&wrong),
            Err(PctError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn report_snapshots_the_decomposition() {
        let engine = fitted_engine(correlated_stack());
        let report = engine.report().unwrap();
        assert_eq!((report.height, report.width, report.bands), (2, 2, 2));
        assert_eq!(report.eigenvalues.len(), 2);
        assert_abs_diff_eq!(
            report.variance_ratio.sum(),
            1.0,
            epsilon = 1e-4
        );
    }
}
