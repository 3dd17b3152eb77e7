use chrono::{TimeZone, Utc};
use noq_request::session::{SUBMIT_ATTEMPT_KEY, SessionStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct RecentProviders {
    pairs: Vec<String>,
}

#[test]
fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("session.db");

    {
        let mut store = SessionStore::open(&db_path).unwrap();
        store
            .put(
                "recent-providers",
                &RecentProviders {
                    pairs: vec!["aws/s3".to_string()],
                },
            )
            .unwrap();
    }

    let store = SessionStore::open(&db_path).unwrap();
    let recent: Option<RecentProviders> = store.get("recent-providers").unwrap();
    assert_eq!(recent.unwrap().pairs, vec!["aws/s3".to_string()]);
}

#[test]
fn last_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    let mut store = SessionStore::open(&db_path).unwrap();

    let first = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
    store.record_attempt(SUBMIT_ATTEMPT_KEY, first).unwrap();
    store.record_attempt(SUBMIT_ATTEMPT_KEY, second).unwrap();

    assert_eq!(store.last_attempt(SUBMIT_ATTEMPT_KEY).unwrap(), Some(second));
    assert_eq!(store.entries().unwrap().len(), 1);
}

#[test]
fn two_connections_see_each_others_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    let mut writer = SessionStore::open(&db_path).unwrap();
    let reader = SessionStore::open(&db_path).unwrap();

    let at = Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap();
    writer.record_attempt(SUBMIT_ATTEMPT_KEY, at).unwrap();
    assert_eq!(reader.last_attempt(SUBMIT_ATTEMPT_KEY).unwrap(), Some(at));

    assert!(writer.clear_attempt(SUBMIT_ATTEMPT_KEY).unwrap());
    assert_eq!(reader.last_attempt(SUBMIT_ATTEMPT_KEY).unwrap(), None);
}

#[test]
fn clear_all_reports_removed_count() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    let mut store = SessionStore::open(&db_path).unwrap();

    store.put("a", &1).unwrap();
    store.put("b", &2).unwrap();
    assert_eq!(store.clear_all().unwrap(), 2);
    assert!(store.entries().unwrap().is_empty());
    assert_eq!(store.clear_all().unwrap(), 0);
}

#[test]
fn corrupt_entry_is_an_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("session.db");
    let mut store = SessionStore::open(&db_path).unwrap();

    store.put("recent-providers", &"not a struct").unwrap();
    let result: Result<Option<RecentProviders>, _> = store.get("recent-providers");
    assert!(result.is_err());
}
