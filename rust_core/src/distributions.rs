use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Error, Result};
use crate::linalg;

// ── Multivariate normal, precision-parameterized ────────────────────

/// Zero-mean multivariate normal described by its precision matrix P.
///
/// With P = L Lᵀ, a draw x = L⁻ᵀ z for z ~ N(0, I) has covariance P⁻¹, so the
/// covariance is never formed explicitly.
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    dim: usize,
    precision_chol: Vec<f64>,
}

impl MultivariateNormal {
    pub fn from_precision(precision: &[f64], dim: usize) -> Result<Self> {
        if precision.len() != dim * dim {
            return Err(Error::dimension("precision matrix", dim * dim, precision.len()));
        }
        let precision_chol = linalg::cholesky(precision, dim).ok_or(Error::NotPositiveDefinite)?;
        Ok(Self {
            dim,
            precision_chol,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z: Vec<f64> = (0..self.dim).map(|_| StandardNormal.sample(rng)).collect();
        linalg::solve_lower_transpose(&self.precision_chol, &z, self.dim)
    }
}
