use clap::Parser;
use matbench::cli::{Cli, CommType};
use matbench::config::BenchConfig;
use matbench::csv_writer::{self, SUMMARY_HEADER};
use matbench::error::ConfigError;
use matbench::matrix::{Matrix, sequential_multiply};
use matbench::orchestrator::{self, RunOutcome};
use matbench::strategy::StrategyKind;
use matbench::validate::{self, ValidationOutcome};
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn run(kind: StrategyKind, n: usize, workers: usize) -> RunOutcome {
    let config = BenchConfig::new(n, workers, kind);
    let partition = config.partition().unwrap();
    orchestrator::run_once(&config, &partition).unwrap()
}

fn reference(n: usize) -> Matrix {
    let a = Matrix::seeded_lhs(n).unwrap();
    let b = Matrix::seeded_rhs(n).unwrap();
    sequential_multiply(&a, &b).unwrap()
}

#[test]
fn test_four_by_four_on_two_workers() {
    // A = 0..15 row-major, B = 1..16 row-major
    for kind in StrategyKind::ALL {
        let outcome = run(kind, 4, 2);
        assert_eq!(outcome.product.get(0, 0).unwrap(), 62.0, "{}", kind);
        assert_eq!(outcome.product.get(3, 3).unwrap(), 560.0, "{}", kind);
        assert_eq!(outcome.product, reference(4), "{}", kind);
    }
}

#[test]
fn test_strategies_agree_bit_for_bit() {
    let n = 120;
    let expected = run(StrategyKind::Collective, n, 4).product;
    for kind in StrategyKind::ALL {
        assert_eq!(run(kind, n, 4).product.data, expected.data, "{}", kind);
    }
}

#[test]
fn test_result_does_not_depend_on_worker_count() {
    let n = 12;
    let expected = reference(n);
    for workers in [1, 2, 3, 4, 6, 12] {
        let outcome = run(StrategyKind::Synchronous, n, workers);
        assert_eq!(outcome.product, expected, "{} workers", workers);
    }
}

#[test]
fn test_timings_are_consistent() {
    for kind in StrategyKind::ALL {
        let timings = run(kind, 32, 4).timings;
        assert!(timings.comm_seconds >= 0.0);
        assert!(timings.comp_seconds >= 0.0);
        assert!(timings.total_seconds > 0.0, "{}", kind);
        assert!(timings.total_seconds.is_finite());
    }
}

#[test]
fn test_not_divisible_is_a_configuration_error() {
    let config = BenchConfig::new(10, 3, StrategyKind::Collective);
    assert_eq!(
        config.partition(),
        Err(ConfigError::NotDivisible { n: 10, workers: 3 })
    );

    let err = orchestrator::run_benchmark(&config, |_| {}).unwrap_err();
    assert!(err.to_string().contains("divisible"));
}

#[test]
fn test_validation_detects_corrupted_product() {
    let n = 8;
    let mut outcome = run(StrategyKind::AsyncNaive, n, 4);
    let reference = sequential_multiply(&outcome.a, &outcome.b).unwrap();
    assert_eq!(validate::validate(&outcome.product, &reference), ValidationOutcome::Passed);

    let value = outcome.product.get(5, 2).unwrap();
    outcome.product.set(5, 2, value + 1.0);

    match validate::validate(&outcome.product, &reference) {
        ValidationOutcome::Failed(mismatch) => {
            assert_eq!((mismatch.row, mismatch.col), (5, 2));
            assert_eq!(mismatch.reference, value);
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
}

#[test]
fn test_validated_repetitions_export_summary() {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("results.csv");
    let csv_path = csv_path.to_str().unwrap();

    let mut config = BenchConfig::new(16, 4, StrategyKind::AsyncOverlapped);
    config.validate = true;
    config.repetitions = 2;

    let report = orchestrator::run_benchmark(&config, |record| {
        assert_eq!(record.validation, Some(ValidationOutcome::Passed));
    })
    .unwrap();
    csv_writer::export_summary_csv(&report.summary, csv_path).unwrap();

    let contents = fs::read_to_string(csv_path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some(SUMMARY_HEADER));
    let row = lines.next().unwrap();
    assert!(row.starts_with("async,16,4,local,"));
    assert!(row.ends_with(",2"));
    assert_eq!(lines.next(), None);
}

#[test]
fn test_cli_parses_every_comm_type() {
    let cases = [
        ("collective", CommType::Collective),
        ("sync", CommType::Sync),
        ("async", CommType::Async),
        ("async_naive", CommType::AsyncNaive),
    ];
    for (arg, expected) in cases {
        let cli = Cli::try_parse_from(["matbench", "64", arg]).unwrap();
        assert_eq!(cli.comm_type, expected);
        assert!(!cli.validate);
    }

    let cli = Cli::try_parse_from(["matbench", "64", "sync", "--validate", "-p", "8"]).unwrap();
    assert!(cli.validate);
    assert_eq!(cli.workers, 8);
}

#[test]
fn test_cli_rejects_bad_arguments() {
    assert!(Cli::try_parse_from(["matbench", "64", "broadcast"]).is_err());
    assert!(Cli::try_parse_from(["matbench", "64"]).is_err());
    assert!(Cli::try_parse_from(["matbench", "sixty-four", "sync"]).is_err());
    assert!(Cli::try_parse_from(["matbench", "-4", "sync"]).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_every_strategy_matches_reference(
        rows_per_worker in 1usize..4,
        workers in 1usize..5,
        kind_index in 0usize..4,
    ) {
        let n = rows_per_worker * workers;
        let kind = StrategyKind::ALL[kind_index];
        let outcome = run(kind, n, workers);
        prop_assert_eq!(outcome.product, reference(n));
    }
}
