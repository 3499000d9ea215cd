//! Crate error types.

use thiserror::Error;

/// Result type for PCT operations.
pub type PctResult<T> = Result<T, PctError>;

/// Errors raised by stack construction and the PCT engine.
///
/// The variants fall into three groups: empty or malformed input
/// ([`EmptyStack`](PctError::EmptyStack),
/// [`BandShapeMismatch`](PctError::BandShapeMismatch)), precondition
/// violations ([`StageNotReady`](PctError::StageNotReady)), and invalid
/// arguments to otherwise-ready operations
/// ([`ComponentOutOfRange`](PctError::ComponentOutOfRange),
/// [`RankOutOfRange`](PctError::RankOutOfRange),
/// [`ShapeMismatch`](PctError::ShapeMismatch)). A failed operation never
/// modifies engine state.
#[derive(Error, Debug)]
pub enum PctError {
    /// A stack with a zero dimension (or no bands at all) was supplied.
    #[error("empty image stack: {height}x{width}x{bands}")]
    EmptyStack {
        height: usize,
        width: usize,
        bands: usize,
    },

    /// Bands passed to `ImageStack::from_bands` do not share one spatial
    /// shape. The engine performs no resampling; co-registration is the
    /// stack provider's job.
    #[error(
        "band {index} has shape {got_height}x{got_width}, expected {expected_height}x{expected_width}"
    )]
    BandShapeMismatch {
        index: usize,
        expected_height: usize,
        expected_width: usize,
        got_height: usize,
        got_width: usize,
    },

    /// A pipeline stage was invoked before its prerequisite stage.
    #[error("cannot {operation}: {missing} not computed")]
    StageNotReady {
        operation: &'static str,
        missing: &'static str,
    },

    /// Component index outside `[0, bands)`.
    #[error("component index {index} out of range for {bands} bands")]
    ComponentOutOfRange { index: usize, bands: usize },

    /// Reconstruction rank outside `[0, bands]`.
    #[error("cannot reconstruct from {k} components with only {bands} bands")]
    RankOutOfRange { k: usize, bands: usize },

    /// An array handed back for error measurement does not match the loaded
    /// stack's dimensions.
    #[error("shape mismatch: got {got:?}, loaded stack is {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    /// The symmetric eigensolver backend failed.
    #[error("symmetric eigendecomposition failed: {0}")]
    Eigh(String),

    /// An ndarray reshape or stacking operation failed.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
