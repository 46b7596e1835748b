use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("tagstream")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_watch_help_shows_channel_flags() {
    cargo_bin_cmd!("tagstream")
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--events"))
        .stdout(predicate::str::contains("--socket"))
        .stdout(predicate::str::contains("--mode"));
}

#[test]
fn test_config_help_shows_subcommands() {
    cargo_bin_cmd!("tagstream")
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("show"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("tagstream")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}
