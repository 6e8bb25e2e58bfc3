//! Scenario: the CLI surface degrades cleanly without a database.
//!
//! These run the real binary; none of them need Postgres.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_the_command_tree() {
    Command::cargo_bin("csx")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("outbox"))
        .stdout(predicate::str::contains("db"));
}

#[test]
fn unknown_channel_is_rejected_before_any_connection() {
    Command::cargo_bin("csx")
        .unwrap()
        .env_remove("CSX_DATABASE_URL")
        .args(["sync", "pass", "--channel", "etsy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown channel 'etsy'"));
}

#[test]
fn db_status_without_env_names_the_variable() {
    Command::cargo_bin("csx")
        .unwrap()
        .env_remove("CSX_DATABASE_URL")
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CSX_DATABASE_URL"));
}
