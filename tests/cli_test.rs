#![allow(deprecated)]

/// Command-line integration tests
///
/// Runs the `mcpgate` binary against temporary config files. Only commands
/// that stay offline are exercised here.
use assert_cmd::Command;
use predicates::prelude::*;
mod common;

const ENV_VARS: [&str; 5] = [
    "MCPGATE_ALLOWED_HOSTS",
    "MCPGATE_ALLOWED_PORTS",
    "MCPGATE_BLOCKED_CIDRS",
    "MCPGATE_TIMEOUT_MS",
    "MCPGATE_BIND_ADDRESS",
];

fn mcpgate(config_path: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("mcpgate").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.arg("--config").arg(config_path);
    cmd
}

/// Test 1: loopback URL on an allowed port validates and is printed
#[test]
fn test_validate_accepts_loopback() {
    let (_temp_dir, config_path) = common::temp_config_file("network:\n  allowed_ports: [80, 443, 8081]\n");

    mcpgate(&config_path)
        .arg("validate")
        .arg("http://localhost:8081/mcp")
        .assert()
        .success()
        .stdout(predicate::str::contains("http://localhost:8081/mcp"));
}

/// Test 2: private address is refused with the reason
#[test]
fn test_validate_rejects_private_address() {
    let (_temp_dir, config_path) = common::temp_config_file(
        "network:\n  allowed_hosts: [localhost, 127.0.0.1, 192.168.1.10]\n",
    );

    mcpgate(&config_path)
        .arg("validate")
        .arg("http://192.168.1.10/mcp")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid server URI"))
        .stderr(predicate::str::contains("192.168.0.0/16"));
}

/// Test 3: --allow-port extends the configured ports
#[test]
fn test_allow_port_flag_extends_policy() {
    let (_temp_dir, config_path) = common::temp_config_file("network:\n  allowed_ports: [443]\n");

    mcpgate(&config_path)
        .arg("validate")
        .arg("http://localhost:9000/")
        .assert()
        .failure()
        .stderr(predicate::str::contains("port 9000 is not allowed"));

    mcpgate(&config_path)
        .arg("--allow-port")
        .arg("9000")
        .arg("validate")
        .arg("http://localhost:9000/")
        .assert()
        .success();
}

/// Test 4: invalid configuration is rejected before any command runs
#[test]
fn test_invalid_config_zero_timeout() {
    let (_temp_dir, config_path) = common::temp_config_file("network:\n  timeout_ms: 0\n");

    mcpgate(&config_path)
        .arg("validate")
        .arg("http://localhost/")
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

/// Test 5: help lists every subcommand
#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("mcpgate").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("connect"));
}
