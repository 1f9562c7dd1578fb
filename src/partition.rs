use crate::error::ConfigError;
use std::ops::Range;

/// Row-block decomposition of an `n x n` matrix over a fixed worker group.
///
/// Rank `r` owns rows `[r * rows_per_worker, (r + 1) * rows_per_worker)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    n: usize,
    workers: usize,
    rows_per_worker: usize,
}

impl Partition {
    /// Split `n` rows evenly across `workers`.
    pub fn new(n: usize, workers: usize) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::EmptyMatrix);
        }
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if n % workers != 0 {
            return Err(ConfigError::NotDivisible { n, workers });
        }

        Ok(Partition {
            n,
            workers,
            rows_per_worker: n / workers,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn rows_per_worker(&self) -> usize {
        self.rows_per_worker
    }

    pub fn elements_per_worker(&self) -> usize {
        self.rows_per_worker * self.n
    }

    /// Global rows owned by `rank`
    pub fn row_range(&self, rank: usize) -> Range<usize> {
        let start = rank * self.rows_per_worker;
        start..start + self.rows_per_worker
    }

    /// Offsets into a row-major full matrix covering `rank`'s row-block
    pub fn element_range(&self, rank: usize) -> Range<usize> {
        let block = self.elements_per_worker();
        rank * block..(rank + 1) * block
    }
}
