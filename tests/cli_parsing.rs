use clap::Parser;
use std::path::PathBuf;

use gatekeep::cli::commands::capture::CaptureCommands;
use gatekeep::cli::commands::cycle::CycleCommands;
use gatekeep::cli::commands::feedback::FeedbackCommands;
use gatekeep::cli::commands::fixture::FixtureCommands;
use gatekeep::cli::commands::regression::RegressionCommands;
use gatekeep::cli::{Cli, Commands};

#[test]
fn test_parse_fixture_add() {
    let cli = Cli::try_parse_from(vec![
        "gatekeep",
        "fixture",
        "add",
        "conv-001",
        "--category",
        "conversation",
        "--input",
        "hi",
        "--expected",
        "Hi there.",
    ])
    .unwrap();

    match cli.command {
        Commands::Fixture(args) => match args.command {
            FixtureCommands::Add {
                key,
                category,
                input,
                input_file,
                expected,
                difficulty,
                ..
            } => {
                assert_eq!(key, "conv-001");
                assert_eq!(category, "conversation");
                assert_eq!(input.as_deref(), Some("hi"));
                assert!(input_file.is_none());
                assert_eq!(expected.as_deref(), Some("Hi there."));
                assert_eq!(difficulty, "medium");
            }
            _ => panic!("Wrong fixture command"),
        },
        _ => panic!("Wrong top-level command"),
    }
    assert!(!cli.json);
}

#[test]
fn test_fixture_add_rejects_inline_and_file_input() {
    let result = Cli::try_parse_from(vec![
        "gatekeep",
        "fixture",
        "add",
        "conv-001",
        "-c",
        "conversation",
        "--input",
        "hi",
        "--input-file",
        "input.txt",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_parse_fixture_promote() {
    let cli = Cli::try_parse_from(vec![
        "gatekeep",
        "fixture",
        "promote",
        "3f2a9c",
        "-k",
        "table-004",
        "-c",
        "table",
        "-d",
        "hard",
        "--expected-file",
        "fixed.md",
    ])
    .unwrap();

    match cli.command {
        Commands::Fixture(args) => match args.command {
            FixtureCommands::Promote {
                capture,
                key,
                difficulty,
                expected,
                expected_file,
                ..
            } => {
                assert_eq!(capture, "3f2a9c");
                assert_eq!(key, "table-004");
                assert_eq!(difficulty, "hard");
                assert!(expected.is_none());
                assert_eq!(expected_file, Some(PathBuf::from("fixed.md")));
            }
            _ => panic!("Wrong fixture command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_capture_ingest_from_stdin() {
    let cli = Cli::try_parse_from(vec!["gatekeep", "capture", "ingest"]).unwrap();
    match cli.command {
        Commands::Capture(args) => match args.command {
            CaptureCommands::Ingest { path } => assert!(path.is_none()),
            _ => panic!("Wrong capture command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_scheduled_capture_submit() {
    let cli = Cli::try_parse_from(vec![
        "gatekeep",
        "capture",
        "submit",
        "--input",
        "",
        "--output",
        "No data.",
        "--contract",
        "morning-brief",
        "--scheduled",
    ])
    .unwrap();
    match cli.command {
        Commands::Capture(args) => match args.command {
            CaptureCommands::Submit {
                input,
                contract,
                scheduled,
                ..
            } => {
                assert_eq!(input.as_deref(), Some(""));
                assert_eq!(contract.as_deref(), Some("morning-brief"));
                assert!(scheduled);
            }
            _ => panic!("Wrong capture command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_regression_run_gate() {
    let cli = Cli::try_parse_from(vec![
        "gatekeep",
        "--json",
        "regression",
        "run",
        "--fail-on-regression",
    ])
    .unwrap();
    assert!(cli.json);
    match cli.command {
        Commands::Regression(args) => match args.command {
            RegressionCommands::Run { fail_on_regression } => assert!(fail_on_regression),
            _ => panic!("Wrong regression command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_feedback_add_defaults() {
    let cli = Cli::try_parse_from(vec![
        "gatekeep",
        "feedback",
        "add",
        "the table came out broken",
    ])
    .unwrap();
    match cli.command {
        Commands::Feedback(args) => match args.command {
            FeedbackCommands::Add {
                description,
                category,
                priority,
                method,
                capture,
            } => {
                assert_eq!(description.as_deref(), Some("the table came out broken"));
                assert!(category.is_none());
                assert_eq!(priority, "normal");
                assert_eq!(method, "command");
                assert!(capture.is_none());
            }
            _ => panic!("Wrong feedback command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_cycle_ack_requires_reviewer() {
    assert!(Cli::try_parse_from(vec!["gatekeep", "cycle", "ack"]).is_err());

    let cli = Cli::try_parse_from(vec![
        "gatekeep", "cycle", "ack", "--by", "dana", "-n", "looked fine",
    ])
    .unwrap();
    match cli.command {
        Commands::Cycle(args) => match args.command {
            CycleCommands::Ack { by, note } => {
                assert_eq!(by, "dana");
                assert_eq!(note.as_deref(), Some("looked fine"));
            }
            _ => panic!("Wrong cycle command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_json_flag_is_global() {
    let cli = Cli::try_parse_from(vec!["gatekeep", "cycle", "status", "-j"]).unwrap();
    assert!(cli.json);
    assert!(matches!(cli.command, Commands::Cycle(_)));
}
