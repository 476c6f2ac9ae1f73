use super::*;

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["adpilot-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_run_command() {
    let cli = Cli::try_parse_from(["adpilot-cli", "run", "--rule", "42"])
        .expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Run { rule: 42 })));
}

#[test]
fn run_requires_rule() {
    assert!(Cli::try_parse_from(["adpilot-cli", "run"]).is_err());
}

#[test]
fn logs_defaults_to_one_hundred_entries() {
    let cli = Cli::try_parse_from(["adpilot-cli", "logs", "--rule", "7"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Logs {
            rule: 7,
            limit: 100,
            details: false
        })
    ));
}

#[test]
fn logs_accepts_limit_and_details() {
    let cli = Cli::try_parse_from([
        "adpilot-cli",
        "logs",
        "--rule",
        "7",
        "--limit",
        "5",
        "--details",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Logs {
            rule: 7,
            limit: 5,
            details: true
        })
    ));
}

#[test]
fn normalize_schedules_defaults_to_writing() {
    let cli = Cli::try_parse_from(["adpilot-cli", "normalize-schedules"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::NormalizeSchedules { dry_run: false })
    ));
}

#[test]
fn normalize_schedules_dry_run() {
    let cli = Cli::try_parse_from(["adpilot-cli", "normalize-schedules", "--dry-run"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::NormalizeSchedules { dry_run: true })
    ));
}

#[test]
fn next_runs_defaults_to_five() {
    let cli = Cli::try_parse_from(["adpilot-cli", "next-runs", "--rule", "3"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::NextRuns { rule: 3, count: 5 })
    ));
}

#[test]
fn next_runs_accepts_count() {
    let cli = Cli::try_parse_from(["adpilot-cli", "next-runs", "--rule", "3", "--count", "12"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::NextRuns { rule: 3, count: 12 })
    ));
}
