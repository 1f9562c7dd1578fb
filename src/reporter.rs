use crate::config::OutputMode;
use crate::types::{BenchmarkRecord, BenchmarkReport, BenchmarkSummary, Stat};
use crate::validate::ValidationOutcome;
use anyhow::Result;
use std::io::{self, IsTerminal, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// `strategy,n,num_workers,total_time,comm_time,comp_time`
pub fn format_csv_line(record: &BenchmarkRecord) -> String {
    format!(
        "{},{},{},{:.6},{:.6},{:.6}",
        record.strategy,
        record.n,
        record.num_workers,
        record.timings.total_seconds,
        record.timings.comm_seconds,
        record.timings.comp_seconds
    )
}

pub fn format_verbose_line(record: &BenchmarkRecord) -> String {
    format!(
        "[VERBOSE] CSV Output: comm_type={}, matrix_size={}, num_procs={}, total_time={:.6}, comm_time={:.6}, comp_time={:.6}",
        record.strategy,
        record.n,
        record.num_workers,
        record.timings.total_seconds,
        record.timings.comm_seconds,
        record.timings.comp_seconds
    )
}

fn format_stat(stat: &Stat) -> String {
    format!("{:.6} ± {:.6}", stat.mean, stat.std_dev)
}

/// Print one repetition's timing line. JSON output is written once at the end instead.
pub fn print_record(record: &BenchmarkRecord, mode: OutputMode) {
    match mode {
        OutputMode::Csv => println!("{}", format_csv_line(record)),
        OutputMode::Verbose => println!("{}", format_verbose_line(record)),
        OutputMode::Json => {}
    }
}

/// Print mean and standard deviation across repetitions
pub fn print_summary(summary: &BenchmarkSummary) {
    println!(
        "\n[VERBOSE] Summary: comm_type={}, matrix_size={}, num_procs={}, repetitions={}",
        summary.strategy, summary.n, summary.num_workers, summary.repetitions
    );
    println!("  Total time:   {}", format_stat(&summary.total));
    println!("  Comm time:    {}", format_stat(&summary.comm));
    println!("  Comp time:    {}", format_stat(&summary.comp));
}

/// The single line reporting a validation outcome, and its colour
pub fn format_validation_banner(outcome: &ValidationOutcome) -> (Color, String) {
    match outcome {
        ValidationOutcome::Passed => (
            Color::Green,
            "VALIDATION SUCCESSFUL: The parallel result is correct.".to_string(),
        ),
        ValidationOutcome::Failed(_) => (Color::Red, "VALIDATION FAILED.".to_string()),
        ValidationOutcome::Skipped { reason } => {
            (Color::Yellow, format!("VALIDATION SKIPPED: {}", reason))
        }
    }
}

/// Print the validation banner, coloured when stdout is a terminal
pub fn print_validation_banner(outcome: &ValidationOutcome) -> io::Result<()> {
    let choice = if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);

    let (color, message) = format_validation_banner(outcome);

    stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    writeln!(stdout, "{}", message)?;
    stdout.reset()
}

/// Print the full report as JSON
pub fn print_json(report: &BenchmarkReport) -> Result<()> {
    let value = serde_json::to_value(report)?;
    let json = if io::stdout().is_terminal() {
        colored_json::to_colored_json_auto(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("{}", json);
    Ok(())
}
