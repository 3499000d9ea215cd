//! Principal component transform (PCT) for co-registered multi-band raster
//! imagery.
//!
//! Decomposes the B bands of an H×W×B stack into B uncorrelated components
//! ordered by variance, and reconstructs an approximation of the stack from
//! the top k components with a quantified mean-squared error. The crate is
//! the numeric core only: it consumes a decoded [`ImageStack`] and produces
//! arrays and scalars. Decoding, registration, resampling, and display
//! belong to the surrounding application; the [`export`] helpers cover the
//! byte-depth scaling a display layer typically wants.
//!
//! The engine is a strict pipeline — mean, covariance, symmetric
//! eigendecomposition, projection — with every stage precondition-checked.
//! See [`PctEngine`] for the stage contract.
//!
//! ```
//! use ndarray::Array3;
//! use raster_pct::{ImageStack, PctEngine};
//!
//! # fn main() -> raster_pct::PctResult<()> {
//! let stack = ImageStack::new(Array3::from_shape_fn((4, 4, 3), |(y, x, b)| {
//!     (y * 4 + x) as f32 * (b as f32 + 1.0)
//! }))?;
//!
//! let mut engine = PctEngine::new();
//! engine.load(stack);
//! engine.compute_all()?;
//!
//! let pc1 = engine.component(0)?;
//! assert_eq!(pc1.dim(), (4, 4));
//!
//! let reconstructed = engine.reconstruct(2)?;
//! let error = engine.mse(&reconstructed)?;
//! assert!(error >= 0.0);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod export;
pub mod linalg;
pub mod stack;

pub use engine::{PctEngine, PctReport};
pub use error::{PctError, PctResult};
pub use stack::{ImageStack, ValueRange};
