//! Decimal matrix helpers shared by the numerical core.
//!
//! All matrices are row-major `Vec<Vec<Decimal>>`. Inversion reports the
//! caller-supplied context so singularities can be attributed to the exact
//! matrix (tau*Sigma, Omega, M) that failed.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::EngineError;
use crate::EngineResult;

/// Pivot tolerance below which a matrix is treated as singular.
const SINGULARITY_TOLERANCE: Decimal = dec!(0.0000000001);

/// Multiply two matrices: C = A * B.
pub(crate) fn mat_multiply(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Vec<Vec<Decimal>> {
    let m = a.len();
    let p = if m > 0 { a[0].len() } else { 0 };
    let n_cols = if !b.is_empty() { b[0].len() } else { 0 };
    let mut c = vec![vec![Decimal::ZERO; n_cols]; m];
    for i in 0..m {
        for j in 0..n_cols {
            let mut sum = Decimal::ZERO;
            for k in 0..p {
                sum += a[i][k] * b[k][j];
            }
            c[i][j] = sum;
        }
    }
    c
}

/// Transpose a matrix.
pub(crate) fn mat_transpose(a: &[Vec<Decimal>]) -> Vec<Vec<Decimal>> {
    let m = a.len();
    if m == 0 {
        return Vec::new();
    }
    let n = a[0].len();
    let mut t = vec![vec![Decimal::ZERO; m]; n];
    for (i, row) in a.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            t[j][i] = *v;
        }
    }
    t
}

/// Invert a square matrix using Gauss-Jordan elimination with partial
/// pivoting. The range-loop pattern is deliberate for in-place row
/// operations.
#[allow(clippy::needless_range_loop)]
pub(crate) fn mat_inverse(a: &[Vec<Decimal>], context: &str) -> EngineResult<Vec<Vec<Decimal>>> {
    let n = a.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    // Augmented matrix [A | I]
    let mut aug: Vec<Vec<Decimal>> = Vec::with_capacity(n);
    for (i, a_row) in a.iter().enumerate() {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(a_row);
        for j in 0..n {
            row.push(if i == j { Decimal::ONE } else { Decimal::ZERO });
        }
        aug.push(row);
    }

    for col in 0..n {
        // Partial pivot
        let mut max_val = aug[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < SINGULARITY_TOLERANCE {
            return Err(EngineError::SingularMatrix {
                context: context.to_string(),
            });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        // Eliminate the column in all other rows. Clone the pivot row to
        // avoid simultaneous borrow.
        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Multiply a matrix (m x n) by a vector (n), returning (m).
pub(crate) fn mat_vec_multiply(a: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    a.iter()
        .map(|row| row.iter().zip(v.iter()).map(|(a_ij, v_j)| a_ij * v_j).sum())
        .collect()
}

/// Dot product of two vectors.
pub(crate) fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Element-wise addition of two matrices.
pub(crate) fn mat_add(a: &[Vec<Decimal>], b: &[Vec<Decimal>]) -> Vec<Vec<Decimal>> {
    a.iter()
        .zip(b.iter())
        .map(|(row_a, row_b)| row_a.iter().zip(row_b.iter()).map(|(x, y)| x + y).collect())
        .collect()
}

/// Scale every element of a matrix by a scalar.
pub(crate) fn mat_scale(a: &[Vec<Decimal>], s: Decimal) -> Vec<Vec<Decimal>> {
    a.iter()
        .map(|row| row.iter().map(|v| v * s).collect())
        .collect()
}

/// Portfolio standard deviation: sqrt(w' Sigma w).
pub(crate) fn portfolio_std(w: &[Decimal], sigma: &[Vec<Decimal>]) -> Decimal {
    let sigma_w = mat_vec_multiply(sigma, w);
    sqrt_decimal(vec_dot(w, &sigma_w))
}

/// Square root via Newton's method with an early-exit convergence check.
pub(crate) fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let mut guess = val / dec!(2);
    if guess.is_zero() {
        guess = dec!(0.0001);
    }
    for _ in 0..48 {
        let next = (guess + val / guess) / dec!(2);
        if (next - guess).abs() < dec!(0.0000000000001) {
            return next;
        }
        guess = next;
    }
    guess
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- 1. Inversion round-trip --

    #[test]
    fn test_inverse_times_original_is_identity() {
        let a = vec![
            vec![dec!(4), dec!(7)],
            vec![dec!(2), dec!(6)],
        ];
        let inv = mat_inverse(&a, "test").unwrap();
        let prod = mat_multiply(&a, &inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { Decimal::ONE } else { Decimal::ZERO };
                assert!((prod[i][j] - expected).abs() < dec!(0.000000001));
            }
        }
    }

    // -- 2. Singular matrix detection --

    #[test]
    fn test_singular_matrix_reports_context() {
        let a = vec![
            vec![dec!(1), dec!(2)],
            vec![dec!(2), dec!(4)],
        ];
        let err = mat_inverse(&a, "tau*Sigma").unwrap_err();
        match err {
            crate::EngineError::SingularMatrix { context } => {
                assert_eq!(context, "tau*Sigma");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // -- 3. Transpose and multiply shapes --

    #[test]
    fn test_transpose_and_mat_vec() {
        let p = vec![vec![dec!(1), dec!(0), dec!(-1)]];
        let pt = mat_transpose(&p);
        assert_eq!(pt.len(), 3);
        assert_eq!(pt[0].len(), 1);

        let v = mat_vec_multiply(&p, &[dec!(0.1), dec!(0.2), dec!(0.05)]);
        assert_eq!(v, vec![dec!(0.05)]);
    }

    // -- 4. Newton square root --

    #[test]
    fn test_sqrt_decimal() {
        assert_eq!(sqrt_decimal(Decimal::ZERO), Decimal::ZERO);
        assert!((sqrt_decimal(dec!(4)) - dec!(2)).abs() < dec!(0.0000001));
        assert!((sqrt_decimal(dec!(0.0001)) - dec!(0.01)).abs() < dec!(0.0000001));
        assert!((sqrt_decimal(dec!(0.00000001)) - dec!(0.0001)).abs() < dec!(0.0000001));
    }

    // -- 5. Scale and add --

    #[test]
    fn test_scale_add() {
        let a = vec![vec![dec!(1), dec!(2)], vec![dec!(3), dec!(4)]];
        let b = mat_scale(&a, dec!(0.5));
        assert_eq!(b[1][0], dec!(1.5));
        let c = mat_add(&a, &b);
        assert_eq!(c[0][1], dec!(3));
    }
}
