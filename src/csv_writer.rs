use crate::types::BenchmarkSummary;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub const SUMMARY_HEADER: &str = "comm_type,matrix_size,num_procs,environment,total_time_mean,total_time_std,comm_time_mean,comm_time_std,comp_time_mean,comp_time_std,repetitions";

/// Append one summary row, writing the header first if the file is new or empty
pub fn export_summary_csv(summary: &BenchmarkSummary, path: &str) -> Result<()> {
    let needs_header = Path::new(path)
        .metadata()
        .map(|meta| meta.len() == 0)
        .unwrap_or(true);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open CSV file: {}", path))?;

    if needs_header {
        writeln!(file, "{}", SUMMARY_HEADER)?;
    }

    writeln!(
        file,
        "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}",
        escape_csv(&summary.strategy),
        summary.n,
        summary.num_workers,
        escape_csv(&summary.environment),
        summary.total.mean,
        summary.total.std_dev,
        summary.comm.mean,
        summary.comm.std_dev,
        summary.comp.mean,
        summary.comp.std_dev,
        summary.repetitions
    )
    .context(format!("Failed to write CSV file: {}", path))?;

    Ok(())
}

/// Quote a field only when it contains a separator or a quote
fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
