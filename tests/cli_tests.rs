use assert_cmd::Command;
use chrono::Utc;
use noq_request::session::{SUBMIT_ATTEMPT_KEY, SessionStore};
use predicates::prelude::*;

fn noq_request(db_path: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("noq-request").unwrap();
    cmd.env("NOQ_SESSION_DB", db_path);
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    noq_request(&dir.path().join("session.db"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-service"))
        .stdout(predicate::str::contains("providers"))
        .stdout(predicate::str::contains("session"));
}

#[test]
fn unknown_command_fails() {
    let dir = tempfile::tempdir().unwrap();
    noq_request(&dir.path().join("session.db"))
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn session_show_without_store() {
    let dir = tempfile::tempdir().unwrap();
    noq_request(&dir.path().join("session.db"))
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No session data"));
}

#[test]
fn session_show_lists_entries() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    {
        let mut store = SessionStore::open(&db_path).unwrap();
        store.record_attempt(SUBMIT_ATTEMPT_KEY, Utc::now()).unwrap();
    }

    noq_request(&db_path)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("self-service-submit:last-attempt"));
}

#[test]
fn session_clear_empties_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    {
        let mut store = SessionStore::open(&db_path).unwrap();
        store.record_attempt(SUBMIT_ATTEMPT_KEY, Utc::now()).unwrap();
    }

    noq_request(&db_path)
        .args(["session", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 session entries"));

    let store = SessionStore::open(&db_path).unwrap();
    assert!(store.entries().unwrap().is_empty());
}

#[test]
fn session_logs_go_next_to_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    noq_request(&db_path)
        .args(["--verbose", "session", "show"])
        .assert()
        .success();

    assert!(dir.path().join("noq-request.log").exists());
}
