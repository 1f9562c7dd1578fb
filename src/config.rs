use crate::cli::{Cli, TransportKind};
use crate::error::ConfigError;
use crate::partition::Partition;
use crate::strategy::StrategyKind;

/// How results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `strategy,n,num_workers,total_time,comm_time,comp_time`
    Csv,
    /// `[VERBOSE] CSV Output: comm_type=..., ...`
    Verbose,
    /// Whole report as JSON; progress messages are suppressed
    Json,
}

/// Everything one benchmark invocation needs, fixed before any worker starts
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub n: usize,
    pub workers: usize,
    pub strategy: StrategyKind,
    pub validate: bool,
    pub repetitions: usize,
    pub output: OutputMode,
    pub csv_path: Option<String>,
    pub transport: TransportKind,
}

impl BenchConfig {
    pub fn new(n: usize, workers: usize, strategy: StrategyKind) -> Self {
        Self {
            n,
            workers,
            strategy,
            validate: false,
            repetitions: 1,
            output: OutputMode::Csv,
            csv_path: None,
            transport: TransportKind::Local,
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        let output = if cli.json {
            OutputMode::Json
        } else if cli.verbose {
            OutputMode::Verbose
        } else {
            OutputMode::Csv
        };

        Self {
            n: cli.n,
            workers: cli.workers,
            strategy: cli.comm_type.into(),
            validate: cli.validate,
            repetitions: cli.repetitions,
            output,
            csv_path: cli.csv.clone(),
            transport: cli.transport,
        }
    }

    /// Check the run can start; the partition is the only thing that depends on it
    pub fn partition(&self) -> Result<Partition, ConfigError> {
        self.partition_over(self.workers)
    }

    /// Same checks for a group whose size is fixed by the launcher
    pub fn partition_over(&self, workers: usize) -> Result<Partition, ConfigError> {
        if self.repetitions == 0 {
            return Err(ConfigError::NoRepetitions);
        }
        Partition::new(self.n, workers)
    }

    /// Whether human-readable progress may be printed to stdout
    pub fn shows_progress(&self) -> bool {
        self.output != OutputMode::Json
    }
}
