//! Small dense kernels on row-major `dim × dim` buffers.

/// Lower Cholesky factor L with A = L Lᵀ, or `None` if A is not SPD.
pub fn cholesky(a: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; dim * dim];
    for i in 0..dim {
        for j in 0..=i {
            let mut sum = a[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * dim + j] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }
    Some(l)
}

/// Solve Lᵀ x = b for lower-triangular L by back substitution.
pub fn solve_lower_transpose(l: &[f64], b: &[f64], dim: usize) -> Vec<f64> {
    let mut x = b.to_vec();
    for i in (0..dim).rev() {
        let mut sum = x[i];
        for k in (i + 1)..dim {
            sum -= l[k * dim + i] * x[k];
        }
        x[i] = sum / l[i * dim + i];
    }
    x
}

/// Row `row` of `a` dotted with `v`.
pub fn row_dot(a: &[f64], row: usize, v: &[f64], dim: usize) -> f64 {
    a[row * dim..(row + 1) * dim]
        .iter()
        .zip(v.iter())
        .map(|(x, y)| x * y)
        .sum()
}

pub fn is_symmetric(a: &[f64], dim: usize, tol: f64) -> bool {
    for i in 0..dim {
        for j in (i + 1)..dim {
            if (a[i * dim + j] - a[j * dim + i]).abs() > tol {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cholesky_reconstructs() {
        let a = [4.0, 2.0, 2.0, 3.0];
        let l = cholesky(&a, 2).unwrap();
        assert_abs_diff_eq!(l[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[3], 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(l[1], 0.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        assert!(cholesky(&[1.0, 2.0, 2.0, 1.0], 2).is_none());
    }

    #[test]
    fn test_solve_lower_transpose() {
        let a = [4.0, 2.0, 2.0, 3.0];
        let l = cholesky(&a, 2).unwrap();
        let x = solve_lower_transpose(&l, &[1.0, 1.0], 2);
        // Lᵀ x = b
        let b0 = l[0] * x[0] + l[2] * x[1];
        let b1 = l[3] * x[1];
        assert_abs_diff_eq!(b0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b1, 1.0, epsilon = 1e-12);
    }
}
