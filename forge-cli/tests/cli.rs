//! Black-box tests against the built `forge` binary.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn help_lists_top_level_subcommands() {
    Command::cargo_bin("forge").unwrap().arg("--help").assert().success().stdout(contains("up")).stdout(contains("ps")).stdout(contains("scale"));
}

#[test]
fn unknown_loop_reference_exits_with_operational_failure() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("forge")
        .unwrap()
        .env("XDG_CONFIG_HOME", dir.path())
        .env("XDG_DATA_HOME", dir.path())
        .args(["--json", "logs", "no-such-loop"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("NotFound"));
}

#[test]
fn up_without_repo_is_a_misuse_error() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("forge")
        .unwrap()
        .env("XDG_CONFIG_HOME", dir.path())
        .env("XDG_DATA_HOME", dir.path())
        .args(["up", "--prompt-msg", "hello"])
        .assert()
        .failure()
        .code(2);
}
