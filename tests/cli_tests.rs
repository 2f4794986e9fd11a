//! CLI integration tests for the project-sync binary
//!
//! These run the compiled binary and only exercise paths that never reach
//! the network.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

const SETTINGS_VARS: &[&str] = &[
    "GITHUB_TOKEN",
    "GITHUB_REPOSITORY",
    "GITHUB_REPOSITORY_OWNER",
    "GITHUB_EVENT_PATH",
    "GITHUB_API_URL",
    "PROJECT_NAME",
    "PROJECT_OWNER",
    "PROJECT_NUMBER",
    "MILESTONE_NAME",
    "STATUS_FIELD_NAME",
    "STATUS_OPTION_NAME",
    "DEBUG_PROJECT_SYNC",
    "PROJECT_SYNC_TIMEOUT_SECS",
    "PROJECT_SYNC_MAX_RETRIES",
    "RUST_LOG",
];

/// A project-sync command with none of the settings variables inherited
#[allow(deprecated)]
fn sync_cmd() -> Command {
    let mut cmd = Command::cargo_bin("project-sync").expect("Failed to find project-sync binary");
    for var in SETTINGS_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path)
}

// ============================================================================
// --help / --version
// ============================================================================

#[test]
fn test_help_lists_commands() {
    sync_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconcile GitHub Projects v2 boards"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("backfill"))
        .stdout(predicate::str::contains("milestone-status"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_version_flag() {
    sync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_subcommand_fails() {
    sync_cmd().assert().failure();
}

#[test]
fn test_quiet_and_verbose_conflict() {
    sync_cmd()
        .args(["-q", "-v", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ============================================================================
// validate
// ============================================================================

#[test]
fn test_validate_reports_every_document() {
    sync_cmd()
        .env("PROJECT_OWNER", "acme")
        .arg("validate")
        .arg("--config-dir")
        .arg(fixture("projects"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Platform Roadmap"))
        .stdout(predicate::str::contains("3 field(s), 2 view(s), 1 automation rule(s)"))
        .stdout(predicate::str::contains("Support Queue"));
}

#[test]
fn test_validate_without_owner_fallback_rejects_ownerless_document() {
    sync_cmd()
        .arg("validate")
        .arg("--config-dir")
        .arg(fixture("projects"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("valid    "))
        .stdout(predicate::str::contains("invalid  "))
        .stdout(predicate::str::contains("project.owner is required"));
}

#[test]
fn test_validate_fails_on_malformed_document() {
    sync_cmd()
        .arg("validate")
        .arg("--config-dir")
        .arg(fixture("invalid"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("Platform Roadmap"))
        .stdout(predicate::str::contains("project.name is required"));
}

#[test]
fn test_validate_missing_directory() {
    let dir = tempfile::tempdir().unwrap();

    sync_cmd()
        .arg("validate")
        .arg("--config-dir")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("configs directory does not exist"));
}

#[test]
fn test_validate_reads_owner_from_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("project-sync.toml");
    std::fs::write(&settings, "project_owner = \"acme\"\n").unwrap();

    sync_cmd()
        .arg("--settings")
        .arg(&settings)
        .arg("validate")
        .arg("--config-dir")
        .arg(fixture("projects"))
        .assert()
        .success();
}

#[test]
fn test_missing_settings_file_fails() {
    sync_cmd()
        .args(["--settings", "does-not-exist.toml", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("settings file not found"));
}

// ============================================================================
// commands that need a token
// ============================================================================

#[test]
fn test_sync_requires_token() {
    sync_cmd()
        .arg("sync")
        .arg("--config-dir")
        .arg(fixture("projects"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN is required"));
}

#[test]
fn test_empty_token_counts_as_missing() {
    sync_cmd()
        .env("GITHUB_TOKEN", "")
        .arg("backfill")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN is required"));
}

// ============================================================================
// milestone-status
// ============================================================================

#[test]
fn test_milestone_status_without_issue_is_a_no_op() {
    sync_cmd()
        .arg("milestone-status")
        .arg("--event")
        .arg(fixture("events/no_issue.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("no-op: event has no issue"));
}

#[test]
fn test_milestone_status_reads_event_path_from_env() {
    sync_cmd()
        .env("GITHUB_EVENT_PATH", fixture("events/other_milestone.json"))
        .env("MILESTONE_NAME", "v1.0")
        .arg("milestone-status")
        .assert()
        .success()
        .stdout(predicate::str::contains("milestone 'v2.0' is not tracked"));
}

#[test]
fn test_milestone_status_needs_milestone_name_when_issue_has_one() {
    sync_cmd()
        .arg("milestone-status")
        .arg("--event")
        .arg(fixture("events/other_milestone.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("MILESTONE_NAME is required"));
}

#[test]
fn test_milestone_status_rejects_unreadable_event() {
    sync_cmd()
        .args(["milestone-status", "--event", "missing-event.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid event payload"));
}

#[test]
fn test_milestone_status_requires_event() {
    sync_cmd()
        .arg("milestone-status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_EVENT_PATH"));
}
