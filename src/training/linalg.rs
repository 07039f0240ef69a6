//! Small dense solvers for the linear forecasters

use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2};

/// Solve `A x = b` for symmetric positive definite `A` by Cholesky.
/// Returns `None` when `A` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

/// Penalized least squares with a per-coefficient penalty and optional prior center:
///
/// `argmin ||y - X b||^2 + sum_j penalty_j (b_j - center_j)^2`
///
/// A zero penalty leaves the coefficient unregularized. Singular systems are
/// retried with a small diagonal jitter.
pub fn ridge_solve(
    x: &Array2<f64>,
    y: &Array1<f64>,
    penalty: &Array1<f64>,
    center: Option<&Array1<f64>>,
) -> Result<Array1<f64>> {
    let p = x.ncols();
    if x.nrows() != y.len() || penalty.len() != p {
        return Err(ForecastError::Training(format!(
            "ridge system shape mismatch: X {:?}, y {}, penalty {}",
            x.dim(),
            y.len(),
            penalty.len()
        )));
    }
    if let Some(c) = center {
        if c.len() != p {
            return Err(ForecastError::Training(format!(
                "prior center has {} coefficients, expected {}",
                c.len(),
                p
            )));
        }
    }

    let mut xtx = x.t().dot(x);
    let mut xty = x.t().dot(y);
    for j in 0..p {
        xtx[[j, j]] += penalty[j];
        if let Some(c) = center {
            xty[j] += penalty[j] * c[j];
        }
    }

    if let Some(beta) = cholesky_solve(&xtx, &xty) {
        return Ok(beta);
    }

    let scale = xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / p.max(1) as f64;
    let mut jitter = 1e-10 * scale.max(1.0);
    for _ in 0..6 {
        let mut reg = xtx.clone();
        for j in 0..p {
            reg[[j, j]] += jitter;
        }
        if let Some(beta) = cholesky_solve(&reg, &xty) {
            return Ok(beta);
        }
        jitter *= 100.0;
    }

    Err(ForecastError::Training(
        "normal equations are not positive definite".to_string(),
    ))
}

/// Ordinary least squares
pub fn least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
    ridge_solve(x, y, &Array1::zeros(x.ncols()), None)
}

/// Prepend a column of ones
pub fn with_intercept(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::ones((x.nrows(), x.ncols() + 1));
    out.slice_mut(ndarray::s![.., 1..]).assign(x);
    out
}
