use clap::Parser;
use matbench::cli::Cli;
use matbench::config::{BenchConfig, OutputMode};
use matbench::csv_writer;
use matbench::orchestrator;
use matbench::reporter;
use std::process;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = exit_code(&e);
            let _ = e.print();
            process::exit(code);
        }
    };

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Argument errors exit 1 rather than clap's 2; --help and --version are not failures
fn exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() { 1 } else { 0 }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = BenchConfig::from_cli(cli);

    let report = orchestrator::run(&config, |record| {
        reporter::print_record(record, config.output)
    })?;

    // Only the coordinator reports
    let Some(report) = report else {
        return Ok(());
    };

    match config.output {
        OutputMode::Json => reporter::print_json(&report)?,
        OutputMode::Verbose if report.summary.repetitions > 1 => {
            reporter::print_summary(&report.summary)
        }
        _ => {}
    }

    if let Some(path) = &config.csv_path {
        csv_writer::export_summary_csv(&report.summary, path)?;
        if config.output != OutputMode::Json {
            eprintln!("Summary CSV exported to: {}", path);
        }
    }

    Ok(())
}
