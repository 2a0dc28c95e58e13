//! Upper-triangular packing of symmetric matrices
//!
//! Keeps the `n(n+1)/2` non-redundant elements of an `n×n` matrix, walking
//! rows top to bottom and, within a row, from the diagonal rightwards.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::PackError;
use crate::types::StateMat15;

/// Pack the upper triangle (diagonal included) in row-major order.
pub fn pack_upper(matrix: ArrayView2<f64>) -> Result<Array1<f64>, PackError> {
    let (rows, cols) = matrix.dim();
    if rows < 2 || cols < 2 {
        return Err(PackError::NotTwoDimensional { rows, cols });
    }
    if rows != cols {
        return Err(PackError::NotSquare { rows, cols });
    }

    let n = rows;
    let mut packed = Vec::with_capacity(n * (n + 1) / 2);
    for row in 0..n {
        for col in row..n {
            packed.push(matrix[[row, col]]);
        }
    }
    Ok(Array1::from_vec(packed))
}

/// Rebuild the full symmetric matrix from [`pack_upper`] output.
pub fn unpack_upper(packed: ArrayView1<f64>) -> Result<Array2<f64>, PackError> {
    let len = packed.len();
    let n = triangular_side(len).ok_or(PackError::NotTriangular { len })?;

    let mut matrix = Array2::<f64>::zeros((n, n));
    let mut idx = 0;
    for row in 0..n {
        for col in row..n {
            matrix[[row, col]] = packed[idx];
            matrix[[col, row]] = packed[idx];
            idx += 1;
        }
    }
    Ok(matrix)
}

/// Pack the filter covariance for the output tables.
pub fn pack_covariance(p: &StateMat15) -> Result<Array1<f64>, PackError> {
    let matrix = Array2::from_shape_fn((p.nrows(), p.ncols()), |(row, col)| p[(row, col)]);
    pack_upper(matrix.view())
}

/// Side length `n >= 2` with `n(n+1)/2 == len`, if any.
fn triangular_side(len: usize) -> Option<usize> {
    let mut n = 2;
    while n * (n + 1) / 2 < len {
        n += 1;
    }
    (n * (n + 1) / 2 == len).then_some(n)
}
