//! Command-line behaviour of the linkpacket binary

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn linkpacket() -> Command {
    let mut cmd = Command::cargo_bin("linkpacket").unwrap();
    cmd.env_remove("LINKPACKET_CONFIG").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    linkpacket()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("listen"))
        .stdout(predicate::str::contains("interfaces"))
        .stdout(predicate::str::contains("filter"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_filter_disassembly() {
    linkpacket()
        .args(["filter", "--protocol", "arp", "--mtu", "1500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(000) ldh [12]"))
        .stdout(predicate::str::contains("jeq #0x806"))
        .stdout(predicate::str::contains("(003) ret #1500"));
}

#[test]
fn test_filter_appends_config_program() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lp.toml");
    fs::write(
        &path,
        "direction = \"in\"\n\n[[filter]]\nop = 6\nk = 96\n",
    )
    .unwrap();

    linkpacket()
        .args(["--config", path.to_str().unwrap()])
        .args(["filter", "-p", "0x86dd", "--format", "c"])
        .assert()
        .success()
        .stdout(predicate::str::contains("{ 0x15, 1, 0, 0x000086dd },"))
        .stdout(predicate::str::contains("{ 0x06, 0, 0, 0x00000060 },"));
}

#[test]
fn test_filter_rejects_wide_protocol() {
    linkpacket()
        .args(["filter", "--protocol", "70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_config_default() {
    linkpacket()
        .args(["config", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("direction = \"in-out\""));
}

#[test]
fn test_config_validate() {
    let dir = TempDir::new().unwrap();

    let good = dir.path().join("good.toml");
    fs::write(&good, "direction = \"in\"\n").unwrap();
    linkpacket()
        .args(["config", "--validate", good.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));

    // Jump past the end of the program.
    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[[filter]]\nop = 0x15\njt = 4\nk = 1\n").unwrap();
    linkpacket()
        .args(["config", "--validate", bad.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_config_requires_action() {
    linkpacket().arg("config").assert().failure();
}

#[test]
fn test_listen_unknown_interface() {
    linkpacket()
        .args(["listen", "no-such-if0", "--timeout", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-if0"));
}

#[test]
fn test_completions_bash() {
    linkpacket()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("linkpacket"));
}

#[cfg(unix)]
#[test]
fn test_interfaces_json() {
    let output = linkpacket().args(["interfaces", "--json"]).output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(parsed.is_array());
}
