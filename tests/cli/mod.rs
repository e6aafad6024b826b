use std::process::Command;

fn harness() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kvs-harness"));
    cmd.env_remove("CONFIG_PATH");
    cmd
}

#[test]
fn test_invalid_config_exits_with_failure() {
    let output = harness()
        .env("HARNESS__WORKLOAD__KEYS", "0")
        .arg("replication")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("workload.keys"));
}

#[test]
fn test_missing_node_binary_fails_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let output = harness()
        .env("HARNESS__BINARIES__LEADER__PROGRAM", "/nonexistent/leader")
        .env("HARNESS__PROCESS__CHECK_PORTS", "false")
        .env("HARNESS__LOG_DIR", dir.path())
        .args(["failure-detection", "--seed", "1"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("== failure-detection"));
    assert!(stdout.contains("Test failed in Setup"));
    assert!(dir.path().join("harness.log").exists());
}

#[test]
fn test_unknown_scenario_is_usage_error() {
    let output = harness().arg("split-brain").output().unwrap();

    assert_eq!(output.status.code(), Some(2));
}
