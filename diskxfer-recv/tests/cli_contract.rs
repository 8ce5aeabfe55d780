//! Integration tests for the receiver CLI contract.

use predicates::prelude::*;

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("diskxfer-recv").expect("binary should build")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("diskxfer-recv"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("diskxfer-recv"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn missing_required_positionals_exits_nonzero() {
    let mut cmd = cli_cmd();
    cmd.assert().failure().stderr(predicate::str::contains("required"));
}

#[test]
fn nonexistent_serial_path_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.img");

    let mut cmd = cli_cmd();
    cmd.args(["/dev/does-not-exist-diskxfer-test", output.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("serial port"));
}
