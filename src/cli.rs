use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "matbench")]
#[command(about = "Distributed dense matrix multiplication communication benchmark", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Matrix dimension; A, B and C are n x n and n must be divisible by the worker count
    pub n: usize,

    /// Communication strategy to benchmark
    #[arg(value_enum)]
    pub comm_type: CommType,

    /// Check the collected product against a sequential reference (outside the timed region)
    #[arg(long)]
    pub validate: bool,

    /// Number of workers in the group
    #[arg(short = 'p', long, default_value = "4")]
    pub workers: usize,

    /// Print the labelled CSV line and per-rank debug logs
    #[arg(short, long)]
    pub verbose: bool,

    /// Output JSON instead of CSV lines
    #[arg(long)]
    pub json: bool,

    /// Number of times to repeat the run
    #[arg(short, long, default_value = "1")]
    pub repetitions: usize,

    /// Write the mean/std summary to this CSV file (appends if it exists)
    #[arg(long)]
    pub csv: Option<String>,

    /// Message-passing backend; `mpi` needs the `mpi` feature and a launch under mpirun
    #[arg(long, value_enum, default_value = "local")]
    pub transport: TransportKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CommType {
    /// Scatter, broadcast and gather
    Collective,
    /// Blocking point-to-point sends and receives
    Sync,
    /// Non-blocking operations joined once per phase
    Async,
    /// Non-blocking operations joined immediately after posting
    #[value(name = "async_naive")]
    AsyncNaive,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// One thread per rank inside this process
    Local,
    /// One MPI process per rank; the worker count comes from mpirun
    Mpi,
}

impl TransportKind {
    /// Environment label written to summaries
    pub fn label(&self) -> &'static str {
        match self {
            TransportKind::Local => "local",
            TransportKind::Mpi => "mpi",
        }
    }
}
