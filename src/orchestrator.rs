use crate::cli::TransportKind;
use crate::config::BenchConfig;
use crate::error::BenchError;
use crate::matrix::{Matrix, sequential_multiply};
use crate::partition::Partition;
use crate::reporter;
use crate::strategy::{self, Workspace};
use crate::transport::{self, Endpoint};
use crate::types::{BenchmarkRecord, BenchmarkReport, BenchmarkState, PhaseTimings};
use crate::validate::{self, ValidationOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// What the coordinator holds after one repetition
#[derive(Debug)]
pub struct RunOutcome {
    pub timings: PhaseTimings,
    pub a: Matrix,
    pub b: Matrix,
    pub product: Matrix,
}

/// Run the benchmark over the configured transport.
///
/// Returns the report on the coordinator and `None` on every other rank.
pub fn run(
    config: &BenchConfig,
    on_record: impl FnMut(&BenchmarkRecord),
) -> Result<Option<BenchmarkReport>> {
    match config.transport {
        TransportKind::Local => run_benchmark(config, on_record).map(Some),
        TransportKind::Mpi => run_mpi(config, on_record),
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(
    config: &BenchConfig,
    on_record: impl FnMut(&BenchmarkRecord),
) -> Result<Option<BenchmarkReport>> {
    let universe = mpi::initialize().context("MPI was already initialised")?;
    let endpoint = transport::MpiEndpoint::new(universe.world());
    run_benchmark_on(config, &endpoint, TransportKind::Mpi.label(), on_record)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(
    _config: &BenchConfig,
    _on_record: impl FnMut(&BenchmarkRecord),
) -> Result<Option<BenchmarkReport>> {
    Err(crate::error::ConfigError::TransportUnavailable(TransportKind::Mpi.label()).into())
}

/// Run every repetition on the in-process transport, starting a fresh
/// worker group each time.
///
/// `on_record` sees each repetition as soon as it (and its validation) is done.
pub fn run_benchmark(
    config: &BenchConfig,
    mut on_record: impl FnMut(&BenchmarkRecord),
) -> Result<BenchmarkReport> {
    // Fails before any buffer exists or any worker starts
    let partition = config.partition()?;

    let mut state = BenchmarkState::new();

    for repetition in 0..config.repetitions {
        log_repetition(config, &partition, repetition);

        let started_at = Utc::now();
        let outcome = run_once(config, &partition)
            .with_context(|| failed_run(config, repetition))?;
        let record = finish_repetition(config, &partition, started_at, outcome);

        on_record(&record);
        state.update(record);
    }

    Ok(state.into_report(
        config.strategy.label(),
        config.n,
        partition.workers(),
        TransportKind::Local.label(),
    ))
}

/// Run every repetition on an endpoint whose group already exists, such as
/// one MPI process per rank. Every rank calls this; the group size comes from
/// the endpoint, not from `config.workers`.
pub fn run_benchmark_on<E: Endpoint + ?Sized>(
    config: &BenchConfig,
    endpoint: &E,
    environment: &str,
    mut on_record: impl FnMut(&BenchmarkRecord),
) -> Result<Option<BenchmarkReport>> {
    let partition = config.partition_over(endpoint.size())?;

    let mut state = endpoint.is_root().then(BenchmarkState::new);

    for repetition in 0..config.repetitions {
        if endpoint.is_root() {
            log_repetition(config, &partition, repetition);
        }

        let started_at = Utc::now();
        let outcome = run_rank(endpoint, config, &partition)
            .with_context(|| failed_run(config, repetition))?;

        if let (Some(outcome), Some(state)) = (outcome, state.as_mut()) {
            let record = finish_repetition(config, &partition, started_at, outcome);
            on_record(&record);
            state.update(record);
        }
    }

    Ok(state.map(|state| {
        state.into_report(
            config.strategy.label(),
            config.n,
            partition.workers(),
            environment,
        )
    }))
}

fn log_repetition(config: &BenchConfig, partition: &Partition, repetition: usize) {
    log::debug!(
        "Repetition {}/{}: {} n={} workers={}",
        repetition + 1,
        config.repetitions,
        config.strategy,
        config.n,
        partition.workers()
    );
}

fn failed_run(config: &BenchConfig, repetition: usize) -> String {
    format!("Run {} of {} failed", repetition + 1, config.repetitions)
}

/// Validate (outside the timed region) and build the record for one repetition
fn finish_repetition(
    config: &BenchConfig,
    partition: &Partition,
    started_at: DateTime<Utc>,
    outcome: RunOutcome,
) -> BenchmarkRecord {
    let finished_at = Utc::now();

    let validation = config
        .validate
        .then(|| validate_product(config, &outcome.a, &outcome.b, &outcome.product));

    BenchmarkRecord {
        strategy: config.strategy.label().to_string(),
        n: config.n,
        num_workers: partition.workers(),
        timings: outcome.timings,
        started_at,
        finished_at,
        validation,
    }
}

/// One repetition: start the worker group, run the strategy on every rank,
/// and return the coordinator's matrices and aggregated timings.
pub fn run_once(config: &BenchConfig, partition: &Partition) -> Result<RunOutcome, BenchError> {
    let world = transport::create_world(partition.workers())?;
    let results = world.run(|endpoint| run_rank(endpoint, config, partition))?;
    root_outcome(results)
}

/// Per-rank body of a repetition
pub fn run_rank<E: Endpoint + ?Sized>(
    endpoint: &E,
    config: &BenchConfig,
    partition: &Partition,
) -> Result<Option<RunOutcome>, BenchError> {
    let mut workspace = Workspace::allocate(endpoint.rank(), partition)?;

    let timings = strategy::run(config.strategy, endpoint, partition, &mut workspace)?;
    log::debug!("[Rank {}] Run complete", endpoint.rank());

    match timings {
        Some(timings) => {
            let (a, b, product) = workspace.into_coordinator_matrices()?;
            Ok(Some(RunOutcome {
                timings,
                a,
                b,
                product,
            }))
        }
        None => Ok(None),
    }
}

/// Pick the coordinator's result, or the most telling error.
///
/// When a rank fails its peers usually fail with `Disconnected`, so a
/// non-disconnect error is reported in preference.
fn root_outcome<T>(results: Vec<Result<Option<T>, BenchError>>) -> Result<T, BenchError> {
    let mut outcome = None;
    let mut disconnect = None;

    for result in results {
        match result {
            Ok(Some(value)) => outcome = Some(value),
            Ok(None) => {}
            Err(e) if e.is_disconnect() => {
                disconnect.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(e) = disconnect {
        return Err(e);
    }
    outcome.ok_or(BenchError::MissingMatrix("C"))
}

fn validate_product(config: &BenchConfig, a: &Matrix, b: &Matrix, product: &Matrix) -> ValidationOutcome {
    let progress = |message: &str| {
        if config.shows_progress() {
            println!("{}", message);
        }
    };

    progress("--- Starting Validation ---");
    progress("Calculating sequential result for comparison...");

    let outcome = match sequential_multiply(a, b) {
        Ok(reference) => {
            progress("Comparing parallel result with sequential...");
            validate::validate(product, &reference)
        }
        Err(e) => {
            log::error!("Failed to allocate memory for validation matrix: {}", e);
            ValidationOutcome::Skipped {
                reason: e.to_string(),
            }
        }
    };

    if config.shows_progress() {
        if let Err(e) = reporter::print_validation_banner(&outcome) {
            log::warn!("Failed to write validation result: {}", e);
        }
    }
    progress("--- Validation Finished ---");

    outcome
}
