use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("photobox")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("signup"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("gallery"));
}

#[test]
fn test_gallery_help_shows_subcommands() {
    cargo_bin_cmd!("photobox")
        .args(["gallery", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("open"));
}

#[test]
fn test_login_requires_email() {
    cargo_bin_cmd!("photobox")
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--email"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("photobox")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}
