//! Communication strategies for the distributed multiply.
//!
//! Every strategy runs the same four phases in the same order:
//! distribute A, broadcast B, compute, collect C. A [`Protocol`] only decides
//! how the two communication steps are carried out; [`execute`] owns the
//! barriers, the compute kernel and the timing, so the strategies differ in
//! nothing but their synchronisation.

use crate::cli::CommType;
use crate::error::BenchError;
use crate::matrix::{self, Matrix};
use crate::partition::Partition;
use crate::timing::PhaseTimer;
use crate::transport::{Endpoint, ROOT, Tag};
use crate::types::PhaseTimings;
use serde::{Deserialize, Serialize};
use std::fmt;

mod collective;
mod nonblocking;
mod synchronous;

pub use collective::Collective;
pub use nonblocking::NonBlocking;
pub use synchronous::Synchronous;

/// Tag carrying row-blocks of A from the coordinator
pub const TAG_A_BLOCK: Tag = Tag::Data(0);
/// Tag carrying row-blocks of C back to the coordinator
pub const TAG_C_BLOCK: Tag = Tag::Data(1);

/// Which protocol variant a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Collective,
    Synchronous,
    AsyncOverlapped,
    AsyncNaive,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Collective,
        StrategyKind::Synchronous,
        StrategyKind::AsyncOverlapped,
        StrategyKind::AsyncNaive,
    ];

    /// Name used on the command line and in the CSV output
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Collective => "collective",
            StrategyKind::Synchronous => "sync",
            StrategyKind::AsyncOverlapped => "async",
            StrategyKind::AsyncNaive => "async_naive",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<CommType> for StrategyKind {
    fn from(comm_type: CommType) -> Self {
        match comm_type {
            CommType::Collective => StrategyKind::Collective,
            CommType::Sync => StrategyKind::Synchronous,
            CommType::Async => StrategyKind::AsyncOverlapped,
            CommType::AsyncNaive => StrategyKind::AsyncNaive,
        }
    }
}

/// Buffers one rank works on during a run.
///
/// `a` and `c` are `Some` on the coordinator only. `b` is seeded on the
/// coordinator and overwritten by the broadcast everywhere else.
#[derive(Debug)]
pub struct Workspace {
    pub a: Option<Matrix>,
    pub b: Matrix,
    pub c: Option<Matrix>,
    pub local_a: Vec<f64>,
    pub local_c: Vec<f64>,
}

impl Workspace {
    /// Allocate this rank's buffers; the coordinator also seeds A and B
    pub fn allocate(rank: usize, partition: &Partition) -> Result<Self, BenchError> {
        let n = partition.n();
        let block = partition
            .rows_per_worker()
            .checked_mul(n)
            .ok_or(BenchError::Allocation {
                elements: usize::MAX,
            })?;

        let (a, b, c) = if rank == ROOT {
            (
                Some(Matrix::seeded_lhs(n)?),
                Matrix::seeded_rhs(n)?,
                Some(Matrix::try_zeros(n)?),
            )
        } else {
            (None, Matrix::try_zeros(n)?, None)
        };

        Ok(Workspace {
            a,
            b,
            c,
            local_a: matrix::try_alloc(block)?,
            local_c: matrix::try_alloc(block)?,
        })
    }

    /// Hand back the coordinator's A, B and collected C, releasing the local blocks
    pub fn into_coordinator_matrices(self) -> Result<(Matrix, Matrix, Matrix), BenchError> {
        let a = self.a.ok_or(BenchError::MissingMatrix("A"))?;
        let c = self.c.ok_or(BenchError::MissingMatrix("C"))?;
        Ok((a, self.b, c))
    }
}

/// The strategy-specific half of a run
pub trait Protocol {
    fn kind(&self) -> StrategyKind;

    /// Deliver this rank's row-block of A into `local_a` and the full B into
    /// `b`. Both must be readable when this returns.
    fn distribute<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError>;

    /// Assemble every rank's `local_c` into `c` on the coordinator
    fn collect<E: Endpoint + ?Sized>(
        &self,
        endpoint: &E,
        partition: &Partition,
        ws: &mut Workspace,
    ) -> Result<(), BenchError>;
}

/// Run one protocol through the fixed phase sequence.
///
/// Returns the max-reduced timings on the coordinator and `None` elsewhere.
pub fn execute<P, E>(
    protocol: &P,
    endpoint: &E,
    partition: &Partition,
    ws: &mut Workspace,
) -> Result<Option<PhaseTimings>, BenchError>
where
    P: Protocol,
    E: Endpoint + ?Sized,
{
    let rank = endpoint.rank();
    let n = partition.n();
    let mut timer = PhaseTimer::new();

    endpoint.barrier()?;
    timer.start();

    log::debug!("[Rank {}] {}: distributing A and B", rank, protocol.kind());
    timer.time_comm(|| protocol.distribute(endpoint, partition, ws))?;

    log::debug!(
        "[Rank {}] {}: computing {} rows",
        rank,
        protocol.kind(),
        partition.rows_per_worker()
    );
    timer.time_comp(|| matrix::multiply_rows(n, &ws.local_a, &ws.b.data, &mut ws.local_c));

    log::debug!("[Rank {}] {}: collecting C", rank, protocol.kind());
    timer.time_comm(|| protocol.collect(endpoint, partition, ws))?;

    endpoint.barrier()?;
    timer.stop();

    Ok(timer.aggregate(endpoint, ROOT)?)
}

/// Run the selected strategy on this rank
pub fn run<E: Endpoint + ?Sized>(
    kind: StrategyKind,
    endpoint: &E,
    partition: &Partition,
    ws: &mut Workspace,
) -> Result<Option<PhaseTimings>, BenchError> {
    match kind {
        StrategyKind::Collective => execute(&Collective, endpoint, partition, ws),
        StrategyKind::Synchronous => execute(&Synchronous, endpoint, partition, ws),
        StrategyKind::AsyncOverlapped => execute(&NonBlocking::OVERLAPPED, endpoint, partition, ws),
        StrategyKind::AsyncNaive => execute(&NonBlocking::NAIVE, endpoint, partition, ws),
    }
}
