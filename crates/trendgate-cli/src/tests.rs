use clap::Parser;
use uuid::Uuid;

use super::*;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["trendgate-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["trendgate-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["trendgate-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn collect_defaults_to_all_sources() {
    let cli = Cli::try_parse_from(["trendgate-cli", "collect"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Collect {
            source: None,
            dry_run: false
        })
    ));
}

#[test]
fn collect_with_source_and_dry_run() {
    let cli = Cli::try_parse_from([
        "trendgate-cli",
        "collect",
        "--source",
        "naver",
        "--dry-run",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Collect {
            source: Some(ref s),
            dry_run: true
        }) if s == "naver"
    ));
}

#[test]
fn score_accepts_window_override() {
    let cli = Cli::try_parse_from(["trendgate-cli", "score", "--window-days", "14"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Score {
            window_days: Some(14),
            dry_run: false
        })
    ));
}

#[test]
fn score_rejects_window_below_two_days() {
    assert!(Cli::try_parse_from(["trendgate-cli", "score", "--window-days", "1"]).is_err());
}

#[test]
fn approvals_pending_default_limit() {
    let cli = Cli::try_parse_from(["trendgate-cli", "approvals", "pending"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Approvals {
            command: ApprovalCommands::Pending { limit: 20 }
        })
    ));
}

#[test]
fn approvals_approve_parses_id_operator_and_notes() {
    let id = Uuid::new_v4();
    let id_arg = id.to_string();
    let cli = Cli::try_parse_from([
        "trendgate-cli",
        "approvals",
        "approve",
        id_arg.as_str(),
        "--operator",
        "alice",
        "--notes",
        "seen in three cafes",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Approvals {
            command: ApprovalCommands::Approve {
                approval_id,
                ref operator,
                notes: Some(ref n),
            }
        }) if approval_id == id && operator == "alice" && n == "seen in three cafes"
    ));
}

#[test]
fn approvals_reject_requires_a_uuid() {
    let result = Cli::try_parse_from([
        "trendgate-cli",
        "approvals",
        "reject",
        "42",
        "--operator",
        "alice",
    ]);
    assert!(result.is_err());
}
