/// Element-wise reparameterization applied to a slice `offset..offset + length`
/// of a parameter vector; entries outside the slice pass through untouched.
pub trait Transform: Send + Sync {
    fn transform(&self, values: &[f64], offset: usize, length: usize) -> Vec<f64>;

    fn inverse(&self, values: &[f64], offset: usize, length: usize) -> Vec<f64>;

    /// Chain-rule correction of a diagonal Hessian of the log-density when
    /// moving from the untransformed to the transformed space, including the
    /// log-Jacobian's curvature.
    fn update_diagonal_hessian_log_density(
        &self,
        diagonal_hessian: &[f64],
        gradient: &[f64],
        untransformed: &[f64],
        offset: usize,
        length: usize,
    ) -> Vec<f64>;
}

fn map_range(values: &[f64], offset: usize, length: usize, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let mut out = values.to_vec();
    for v in &mut out[offset..offset + length] {
        *v = f(*v);
    }
    out
}

/// The identity reparameterization.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransform;

impl Transform for NoTransform {
    fn transform(&self, values: &[f64], _offset: usize, _length: usize) -> Vec<f64> {
        values.to_vec()
    }

    fn inverse(&self, values: &[f64], _offset: usize, _length: usize) -> Vec<f64> {
        values.to_vec()
    }

    fn update_diagonal_hessian_log_density(
        &self,
        diagonal_hessian: &[f64],
        _gradient: &[f64],
        _untransformed: &[f64],
        _offset: usize,
        _length: usize,
    ) -> Vec<f64> {
        diagonal_hessian.to_vec()
    }
}

/// y = ln x, the usual choice for positive branch rates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransform;

impl Transform for LogTransform {
    fn transform(&self, values: &[f64], offset: usize, length: usize) -> Vec<f64> {
        map_range(values, offset, length, f64::ln)
    }

    fn inverse(&self, values: &[f64], offset: usize, length: usize) -> Vec<f64> {
        map_range(values, offset, length, f64::exp)
    }

    /// With x = e^y: d²/dy² = x² h + x g; the log-Jacobian y is linear in y.
    fn update_diagonal_hessian_log_density(
        &self,
        diagonal_hessian: &[f64],
        gradient: &[f64],
        untransformed: &[f64],
        offset: usize,
        length: usize,
    ) -> Vec<f64> {
        let mut out = diagonal_hessian.to_vec();
        for i in offset..offset + length {
            let x = untransformed[i];
            out[i] = x * x * diagonal_hessian[i] + x * gradient[i];
        }
        out
    }
}
