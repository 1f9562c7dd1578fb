use crate::validate::ValidationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock breakdown of one strategy run, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub total_seconds: f64,
    pub comm_seconds: f64,
    pub comp_seconds: f64,
}

/// Result of one benchmark repetition as seen by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub strategy: String,
    pub n: usize,
    pub num_workers: usize,
    pub timings: PhaseTimings,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
}

/// Mean and sample standard deviation of one timing series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub mean: f64,
    pub std_dev: f64,
}

impl Stat {
    /// Sample statistics; the deviation is zero for fewer than two values
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Stat { mean: 0.0, std_dev: 0.0 };
        }

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let std_dev = if values.len() > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);
            variance.sqrt()
        } else {
            0.0
        };

        Stat { mean, std_dev }
    }
}

/// Aggregate over all repetitions of one configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub strategy: String,
    pub n: usize,
    pub num_workers: usize,
    pub environment: String,
    pub repetitions: usize,
    pub total: Stat,
    pub comm: Stat,
    pub comp: Stat,
}

/// Complete output of a benchmark invocation
#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub runs: Vec<BenchmarkRecord>,
    pub summary: BenchmarkSummary,
}

/// Accumulated state while repetitions are running
#[derive(Debug)]
pub struct BenchmarkState {
    pub start_time: DateTime<Utc>,
    pub runs: Vec<BenchmarkRecord>,
}

impl BenchmarkState {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            runs: Vec::new(),
        }
    }

    pub fn update(&mut self, record: BenchmarkRecord) {
        self.runs.push(record);
    }

    pub fn into_report(
        self,
        strategy: &str,
        n: usize,
        num_workers: usize,
        environment: &str,
    ) -> BenchmarkReport {
        let end_time = Utc::now();
        let duration_seconds = (end_time - self.start_time).num_milliseconds() as f64 / 1000.0;

        let series = |pick: fn(&PhaseTimings) -> f64| -> Vec<f64> {
            self.runs.iter().map(|r| pick(&r.timings)).collect()
        };

        let summary = BenchmarkSummary {
            strategy: strategy.to_string(),
            n,
            num_workers,
            environment: environment.to_string(),
            repetitions: self.runs.len(),
            total: Stat::from_values(&series(|t| t.total_seconds)),
            comm: Stat::from_values(&series(|t| t.comm_seconds)),
            comp: Stat::from_values(&series(|t| t.comp_seconds)),
        };

        BenchmarkReport {
            start_time: self.start_time,
            end_time,
            duration_seconds,
            runs: self.runs,
            summary,
        }
    }
}

impl Default for BenchmarkState {
    fn default() -> Self {
        Self::new()
    }
}
