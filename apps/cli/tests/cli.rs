//! End-to-end tests of the `moorage` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn moorage() -> Command {
    let mut cmd = Command::cargo_bin("moorage").unwrap();
    for var in ["MOORAGE_CONFIG", "MOORAGE_LOG", "MOORAGE_LOG_FORMAT", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn check_config_prints_defaults() {
    moorage()
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_size": 10"#))
        .stdout(predicate::str::contains(r#""drain_timeout": "30s""#));
}

#[test]
fn invalid_pool_bounds_are_rejected() {
    moorage()
        .args(["check-config", "--max-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_size"));
}

#[test]
fn file_values_are_merged_over_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[pool]\nmin_size = 2\nmax_size = 4\nacquire_timeout = \"250ms\"\n\n[broker]\nexchange = \"audit\""
    )
    .unwrap();

    moorage()
        .arg("--config")
        .arg(file.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_size": 4"#))
        .stdout(predicate::str::contains(r#""acquire_timeout": "250ms""#))
        .stdout(predicate::str::contains(r#""exchange": "audit""#));
}

#[test]
fn environment_overrides_file_and_flags_override_environment() {
    moorage()
        .env("MOORAGE_POOL__MAX_SIZE", "7")
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_size": 7"#));

    moorage()
        .env("MOORAGE_POOL__MAX_SIZE", "7")
        .args(["check-config", "--max-size", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""max_size": 3"#));
}

#[test]
fn missing_config_file_fails() {
    moorage()
        .args(["--config", "/nonexistent/moorage.toml", "check-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn run_logs_carry_the_service_name() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    moorage()
        .env("MOORAGE_BROKER__CONNECT_ATTEMPTS", "1")
        .env("MOORAGE_LOG_FORMAT", "json")
        .args(["run", "--broker", &format!("127.0.0.1:{port}")])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""service":"moorage""#));
}

#[test]
fn run_fails_fast_when_the_broker_is_unreachable() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    moorage()
        .env("MOORAGE_BROKER__CONNECT_ATTEMPTS", "1")
        .args(["run", "--broker", &format!("127.0.0.1:{port}")])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start"));
}
