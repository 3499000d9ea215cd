//! Linear-algebra seam for the symmetric eigenproblem.
//!
//! The engine never calls the LAPACK binding directly; it goes through
//! [`BackendEigh`], with [`LinAlgBackendProvider`] dispatching to the
//! provider selected by the `backend_*` cargo features.

use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, UPLO};
use std::error::Error;

/// Output of a symmetric eigendecomposition.
///
/// Eigenvalues arrive in the solver's native ascending order;
/// `eigenvectors.column(i)` pairs with `eigenvalues[i]`.
#[derive(Debug)]
pub struct EighOutput {
    pub eigenvalues: Array1<f32>,
    pub eigenvectors: Array2<f32>,
}

/// Symmetric eigendecomposition (LAPACK `ssyev`-family). Implementers read
/// only the upper triangle of `matrix`.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f32>)
        -> Result<EighOutput, Box<dyn Error + Send + Sync>>;
}

fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
    Box::new(e)
}

/// Dispatches to the LAPACK provider selected at build time.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider;

impl LinAlgBackendProvider {
    pub fn new() -> Self {
        Self
    }
}

impl BackendEigh for LinAlgBackendProvider {
    fn eigh_upper(
        &self,
        matrix: &Array2<f32>,
    ) -> Result<EighOutput, Box<dyn Error + Send + Sync>> {
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput {
            eigenvalues,
            eigenvectors,
        })
    }
}
