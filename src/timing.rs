use crate::error::TransportError;
use crate::transport::Endpoint;
use crate::types::PhaseTimings;
use std::time::{Duration, Instant};

/// Per-rank phase clock.
///
/// Communication and computation time accumulate across phases; the total
/// covers the span between [`PhaseTimer::start`] and [`PhaseTimer::stop`],
/// which callers place right after and right before a barrier.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    started: Option<Instant>,
    total: Duration,
    comm: Duration,
    comp: Duration,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.total += started.elapsed();
        }
    }

    /// Run `phase` and charge its duration to communication
    pub fn time_comm<T>(&mut self, phase: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = phase();
        self.comm += start.elapsed();
        result
    }

    /// Run `phase` and charge its duration to computation
    pub fn time_comp<T>(&mut self, phase: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = phase();
        self.comp += start.elapsed();
        result
    }

    pub fn local(&self) -> PhaseTimings {
        PhaseTimings {
            total_seconds: self.total.as_secs_f64(),
            comm_seconds: self.comm.as_secs_f64(),
            comp_seconds: self.comp.as_secs_f64(),
        }
    }

    /// Max-reduce communication and computation time onto `root`.
    ///
    /// Every rank must call this. The returned total is root's own span,
    /// which after the closing barrier already covers the slowest rank.
    pub fn aggregate(
        &self,
        endpoint: &(impl Endpoint + ?Sized),
        root: usize,
    ) -> Result<Option<PhaseTimings>, TransportError> {
        let local = self.local();
        let comm = endpoint.reduce_max(root, local.comm_seconds)?;
        let comp = endpoint.reduce_max(root, local.comp_seconds)?;

        Ok(comm.zip(comp).map(|(comm_seconds, comp_seconds)| PhaseTimings {
            total_seconds: local.total_seconds,
            comm_seconds,
            comp_seconds,
        }))
    }
}
