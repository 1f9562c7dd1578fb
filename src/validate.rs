use crate::matrix::Matrix;
use serde::{Deserialize, Serialize};

/// Largest absolute difference accepted between parallel and reference cells
pub const TOLERANCE: f64 = 1e-6;

/// First cell where the parallel result disagrees with the reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub parallel: f64,
    pub reference: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Passed,
    Failed(Mismatch),
    Skipped { reason: String },
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ValidationOutcome::Passed)
    }
}

/// Scan row-major cells in order and stop at the first one outside [`TOLERANCE`]
pub fn find_mismatch(parallel: &[f64], reference: &[f64], n: usize) -> Option<Mismatch> {
    parallel
        .iter()
        .zip(reference)
        .take(n * n)
        .enumerate()
        .find_map(|(i, (&p, &r))| {
            let difference = (p - r).abs();
            // NaN never compares below the tolerance
            if difference <= TOLERANCE {
                return None;
            }
            Some(Mismatch {
                row: i / n,
                col: i % n,
                parallel: p,
                reference: r,
                difference,
            })
        })
}

/// Compare a collected product against the reference.
///
/// The first mismatch is described on stderr; the pass, fail or skip banner
/// is left to the reporter. Never aborts.
pub fn validate(parallel: &Matrix, reference: &Matrix) -> ValidationOutcome {
    if parallel.n != reference.n {
        let reason = format!(
            "dimension mismatch: parallel is {}x{}, reference is {}x{}",
            parallel.n, parallel.n, reference.n, reference.n
        );
        return ValidationOutcome::Skipped { reason };
    }

    match find_mismatch(&parallel.data, &reference.data, parallel.n) {
        Some(mismatch) => {
            print_mismatch(&mismatch);
            ValidationOutcome::Failed(mismatch)
        }
        None => ValidationOutcome::Passed,
    }
}

fn print_mismatch(mismatch: &Mismatch) {
    eprintln!(
        "VALIDATION ERROR at position [{}][{}]!",
        mismatch.row, mismatch.col
    );
    eprintln!("  - Parallel Value:   {:.6}", mismatch.parallel);
    eprintln!("  - Sequential Value: {:.6}", mismatch.reference);
    eprintln!("  - Difference:       {:e}", mismatch.difference);
}
