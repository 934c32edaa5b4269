//! Matrix and vector kernels
//!
//! Plain `f64` routines over row-major `Vec<Vec<f64>>` matrices and flat
//! vectors. Shape checks happen here; callers surface the errors untouched.

use crate::core::error::{EvalErrorKind, EvaluationError};

type Matrix = Vec<Vec<f64>>;

fn dims(m: &[Vec<f64>]) -> (usize, usize) {
    (m.len(), m.first().map_or(0, Vec::len))
}

fn shape_error(what: &str) -> EvaluationError {
    EvaluationError::new(EvalErrorKind::DimensionMismatch, what.to_string())
}

/// Element-wise add (`sub = true` for subtraction). Shapes must match.
pub(crate) fn matrix_add(a: &[Vec<f64>], b: &[Vec<f64>], sub: bool) -> Result<Matrix, EvaluationError> {
    if dims(a) != dims(b) {
        return Err(shape_error("matrix addition requires equal shapes"));
    }
    let sign = if sub { -1.0 } else { 1.0 };
    Ok(a.iter()
        .zip(b)
        .map(|(ra, rb)| ra.iter().zip(rb).map(|(x, y)| x + sign * y).collect())
        .collect())
}

/// Scale every entry.
pub(crate) fn matrix_scale(m: &[Vec<f64>], k: f64) -> Matrix {
    m.iter()
        .map(|row| row.iter().map(|x| x * k).collect())
        .collect()
}

/// Standard matrix product; inner dimensions must agree.
pub(crate) fn matrix_mul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Matrix, EvaluationError> {
    let (ar, ac) = dims(a);
    let (br, bc) = dims(b);
    if ac != br {
        return Err(shape_error("matrix product requires inner dimensions to agree"));
    }
    let mut out = vec![vec![0.0; bc]; ar];
    for i in 0..ar {
        for k in 0..ac {
            let aik = a[i][k];
            for j in 0..bc {
                out[i][j] += aik * b[k][j];
            }
        }
    }
    Ok(out)
}

/// Matrix times column vector.
pub(crate) fn matrix_vector(m: &[Vec<f64>], v: &[f64]) -> Result<Vec<f64>, EvaluationError> {
    let (_, cols) = dims(m);
    if cols != v.len() {
        return Err(shape_error("matrix-vector product requires matching dimensions"));
    }
    Ok(m.iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect())
}

/// Row vector times matrix.
pub(crate) fn vector_matrix(v: &[f64], m: &[Vec<f64>]) -> Result<Vec<f64>, EvaluationError> {
    let (rows, cols) = dims(m);
    if rows != v.len() {
        return Err(shape_error("vector-matrix product requires matching dimensions"));
    }
    let mut out = vec![0.0; cols];
    for (x, row) in v.iter().zip(m) {
        for (o, y) in out.iter_mut().zip(row) {
            *o += x * y;
        }
    }
    Ok(out)
}

pub(crate) fn transpose(m: &[Vec<f64>]) -> Matrix {
    let (rows, cols) = dims(m);
    let mut out = vec![vec![0.0; rows]; cols];
    for (i, row) in m.iter().enumerate() {
        for (j, x) in row.iter().enumerate() {
            out[j][i] = *x;
        }
    }
    out
}

pub(crate) fn trace(m: &[Vec<f64>]) -> Result<f64, EvaluationError> {
    let (rows, cols) = dims(m);
    if rows != cols {
        return Err(shape_error("trace requires a square matrix"));
    }
    Ok((0..rows).map(|i| m[i][i]).sum())
}

/// Determinant by Gaussian elimination with partial pivoting.
pub(crate) fn determinant(m: &[Vec<f64>]) -> Result<f64, EvaluationError> {
    let (rows, cols) = dims(m);
    if rows != cols {
        return Err(shape_error("determinant requires a square matrix"));
    }
    let mut work: Matrix = m.to_vec();
    let mut det = 1.0;
    for col in 0..rows {
        let pivot_row = (col..rows)
            .max_by(|&a, &b| {
                work[a][col]
                    .abs()
                    .partial_cmp(&work[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if work[pivot_row][col] == 0.0 {
            return Ok(0.0);
        }
        if pivot_row != col {
            work.swap(pivot_row, col);
            det = -det;
        }
        det *= work[col][col];
        for row in col + 1..rows {
            let factor = work[row][col] / work[col][col];
            for k in col..rows {
                work[row][k] -= factor * work[col][k];
            }
        }
    }
    Ok(det)
}

/// Inverse by Gauss-Jordan elimination; singular input is an error.
pub(crate) fn inverse(m: &[Vec<f64>]) -> Result<Matrix, EvaluationError> {
    let (rows, cols) = dims(m);
    if rows != cols {
        return Err(shape_error("inverse requires a square matrix"));
    }
    let n = rows;
    let mut work: Matrix = m.to_vec();
    let mut out = identity(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&a, &b| {
                work[a][col]
                    .abs()
                    .partial_cmp(&work[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        let pivot = work[pivot_row][col];
        if pivot == 0.0 {
            return Err(EvaluationError::new(
                EvalErrorKind::DivisionByZero,
                "matrix is singular and has no inverse",
            ));
        }
        work.swap(pivot_row, col);
        out.swap(pivot_row, col);

        let scale = 1.0 / work[col][col];
        for k in 0..n {
            work[col][k] *= scale;
            out[col][k] *= scale;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[row][col];
            for k in 0..n {
                work[row][k] -= factor * work[col][k];
                out[row][k] -= factor * out[col][k];
            }
        }
    }
    Ok(out)
}

pub(crate) fn identity(n: usize) -> Matrix {
    let mut out = vec![vec![0.0; n]; n];
    for (i, row) in out.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    out
}

/// Non-negative integer matrix power by repeated multiplication.
pub(crate) fn matrix_pow(m: &[Vec<f64>], exponent: u32) -> Result<Matrix, EvaluationError> {
    let (rows, cols) = dims(m);
    if rows != cols {
        return Err(shape_error("matrix power requires a square matrix"));
    }
    let mut out = identity(rows);
    for _ in 0..exponent {
        out = matrix_mul(&out, m)?;
    }
    Ok(out)
}

// -----------------------------------------------------------------------------
// Vectors
// -----------------------------------------------------------------------------

pub(crate) fn vector_add(a: &[f64], b: &[f64], sub: bool) -> Result<Vec<f64>, EvaluationError> {
    if a.len() != b.len() {
        return Err(shape_error("vector addition requires equal dimensions"));
    }
    let sign = if sub { -1.0 } else { 1.0 };
    Ok(a.iter().zip(b).map(|(x, y)| x + sign * y).collect())
}

pub(crate) fn vector_scale(v: &[f64], k: f64) -> Vec<f64> {
    v.iter().map(|x| x * k).collect()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> Result<f64, EvaluationError> {
    if a.len() != b.len() {
        return Err(shape_error("dot product requires equal dimensions"));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cross product of two 3-vectors.
pub(crate) fn cross(a: &[f64], b: &[f64]) -> Result<Vec<f64>, EvaluationError> {
    if a.len() != 3 || b.len() != 3 {
        return Err(shape_error("cross product requires 3-dimensional vectors"));
    }
    Ok(vec![
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ])
}

pub(crate) fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_and_transpose() {
        let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let b = vec![vec![5.0, 6.0], vec![7.0, 8.0]];
        assert_eq!(
            matrix_mul(&a, &b).unwrap(),
            vec![vec![19.0, 22.0], vec![43.0, 50.0]]
        );
        assert_eq!(transpose(&a), vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
    }

    #[test]
    fn determinant_2x2_and_3x3() {
        let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert!((determinant(&a).unwrap() + 2.0).abs() < 1e-12);

        let b = vec![
            vec![2.0, 0.0, 0.0],
            vec![0.0, 3.0, 0.0],
            vec![0.0, 0.0, 4.0],
        ];
        assert!((determinant(&b).unwrap() - 24.0).abs() < 1e-12);
    }

    #[test]
    fn inverse_round_trips() {
        let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let inv = inverse(&a).unwrap();
        assert!((inv[0][0] + 2.0).abs() < 1e-12);
        assert!((inv[0][1] - 1.0).abs() < 1e-12);
        assert!((inv[1][0] - 1.5).abs() < 1e-12);
        assert!((inv[1][1] + 0.5).abs() < 1e-12);

        let product = matrix_mul(&a, &inv).unwrap();
        for (i, row) in product.iter().enumerate() {
            for (j, x) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((x - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let s = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let err = inverse(&s).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DivisionByZero);
    }

    #[test]
    fn cross_product_follows_the_right_hand_rule() {
        let x = vec![1.0, 0.0, 0.0];
        let y = vec![0.0, 1.0, 0.0];
        assert_eq!(cross(&x, &y).unwrap(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn dimension_mismatches_are_typed() {
        let err = dot(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DimensionMismatch);
    }
}
