use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gradient::GradientWrtParameterProvider;
use crate::parameter::Parameter;

/// Second-order information about a log-density.
pub trait HessianWrtParameterProvider: GradientWrtParameterProvider {
    /// Diagonal of d² log π / dx², one entry per parameter dimension.
    fn diagonal_hessian_log_density(&self) -> Result<Vec<f64>>;
}

/// Diagonal Hessian by central differences of an analytic gradient.
///
/// Each evaluation perturbs the shared parameter one coordinate at a time and
/// restores the original values before returning.
pub struct NumericalHessianFromGradient<G> {
    gradient: G,
}

impl<G: GradientWrtParameterProvider> NumericalHessianFromGradient<G> {
    pub fn new(gradient: G) -> Self {
        Self { gradient }
    }

    pub fn inner(&self) -> &G {
        &self.gradient
    }
}

impl<G: GradientWrtParameterProvider> GradientWrtParameterProvider
    for NumericalHessianFromGradient<G>
{
    fn parameter(&self) -> &Arc<Parameter> {
        self.gradient.parameter()
    }

    fn gradient_log_density(&self) -> Result<Vec<f64>> {
        self.gradient.gradient_log_density()
    }

    fn log_density(&self) -> Result<f64> {
        self.gradient.log_density()
    }
}

impl<G: GradientWrtParameterProvider> NumericalHessianFromGradient<G> {
    fn difference_diagonal(&self, saved: &[f64]) -> Result<Vec<f64>> {
        let parameter = self.gradient.parameter();
        let mut shifted = saved.to_vec();
        let mut diagonal = vec![0.0; saved.len()];

        for i in 0..saved.len() {
            let h = f64::EPSILON.sqrt() * (saved[i].abs() + 1.0);

            shifted[i] = saved[i] + h;
            parameter.set_values(&shifted)?;
            let up = self.gradient.gradient_log_density()?;

            shifted[i] = saved[i] - h;
            parameter.set_values(&shifted)?;
            let down = self.gradient.gradient_log_density()?;

            shifted[i] = saved[i];
            if up.len() != saved.len() || down.len() != saved.len() {
                return Err(Error::dimension("gradient", saved.len(), up.len().min(down.len())));
            }
            diagonal[i] = (up[i] - down[i]) / (2.0 * h);
        }
        Ok(diagonal)
    }
}

impl<G: GradientWrtParameterProvider> HessianWrtParameterProvider
    for NumericalHessianFromGradient<G>
{
    fn diagonal_hessian_log_density(&self) -> Result<Vec<f64>> {
        let parameter = self.gradient.parameter();
        let saved = parameter.values();
        let diagonal = self.difference_diagonal(&saved);
        parameter.set_values(&saved)?;
        diagonal
    }
}
