//! Integration tests for the sender CLI contract.

use predicates::prelude::*;

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("diskxfer-send").expect("binary should build")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("diskxfer-send"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("diskxfer-send"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn missing_required_port_flag_exits_nonzero_with_stderr_message() {
    let mut cmd = cli_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--port").or(predicate::str::contains("required")));
}

#[test]
fn nonexistent_image_file_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.img");

    let mut cmd = cli_cmd();
    cmd.args([
        "C",
        "0",
        "115200",
        "--port",
        "/dev/null",
        "--image",
    ])
    .arg(&missing)
    .assert()
    .failure()
    .stderr(predicate::str::contains("image file"));
}

#[test]
fn start_sector_beyond_disk_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("small.img");
    std::fs::write(&image, vec![0u8; 512 * 4]).unwrap();

    let mut cmd = cli_cmd();
    cmd.args(["C", "1000", "115200", "--port", "/dev/null", "--image"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("beyond"));
}
