use crate::error::BenchError;

/// Dense square matrix of `f64` stored row-major in one contiguous buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub data: Vec<f64>,
    pub n: usize,
}

impl Matrix {
    /// Allocate an `n x n` matrix of zeros, reporting allocation failure instead of aborting
    pub fn try_zeros(n: usize) -> Result<Self, BenchError> {
        let len = n
            .checked_mul(n)
            .ok_or(BenchError::Allocation { elements: usize::MAX })?;
        Ok(Matrix {
            data: try_alloc(len)?,
            n,
        })
    }

    /// Left operand used by every benchmark run: `A[i] = i mod 100`
    pub fn seeded_lhs(n: usize) -> Result<Self, BenchError> {
        let mut m = Matrix::try_zeros(n)?;
        for (i, value) in m.data.iter_mut().enumerate() {
            *value = (i % 100) as f64;
        }
        Ok(m)
    }

    /// Right operand used by every benchmark run: `B[i] = (i mod 100) + 1`
    pub fn seeded_rhs(n: usize) -> Result<Self, BenchError> {
        let mut m = Matrix::try_zeros(n)?;
        for (i, value) in m.data.iter_mut().enumerate() {
            *value = ((i % 100) + 1) as f64;
        }
        Ok(m)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.n || col >= self.n {
            return None;
        }
        Some(self.data[row * self.n + col])
    }

    /// Set a value; returns false if the position is out of bounds
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        if row >= self.n || col >= self.n {
            return false;
        }
        self.data[row * self.n + col] = value;
        true
    }
}

/// Allocate a zeroed buffer of `len` elements without aborting on OOM
pub fn try_alloc(len: usize) -> Result<Vec<f64>, BenchError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| BenchError::Allocation { elements: len })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// Multiply a row-block of A by the full B into the matching row-block of C.
///
/// `local_a` and `local_c` hold `local_a.len() / n` rows each. Summation runs
/// over `k` left to right so every strategy produces bit-identical output.
pub fn multiply_rows(n: usize, local_a: &[f64], b: &[f64], local_c: &mut [f64]) {
    debug_assert_eq!(local_a.len(), local_c.len());
    debug_assert_eq!(b.len(), n * n);

    let rows = local_a.len() / n;
    for i in 0..rows {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += local_a[i * n + k] * b[k * n + j];
            }
            local_c[i * n + j] = sum;
        }
    }
}

/// Single-process reference product used to validate distributed results
pub fn sequential_multiply(a: &Matrix, b: &Matrix) -> Result<Matrix, BenchError> {
    let n = a.n;
    let mut c = Matrix::try_zeros(n)?;

    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += a.data[i * n + k] * b.data[k * n + j];
            }
            c.data[i * n + j] = sum;
        }
    }

    Ok(c)
}
