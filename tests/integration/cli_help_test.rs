use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("signalbox").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn version_prints_crate_version() {
    let mut cmd = Command::cargo_bin("signalbox").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_rejects_bad_workflow_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "name: broken\nsteps: []\n").unwrap();

    let mut cmd = Command::cargo_bin("signalbox").unwrap();
    cmd.arg("validate")
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("errors"));
}

#[test]
fn validate_accepts_good_workflow_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("ok.yaml"),
        "name: ok\nsteps:\n  - tool: t\n    params: {}\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("signalbox").unwrap();
    cmd.arg("validate")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"workflows_loaded\": 1"));
}
