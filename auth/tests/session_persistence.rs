//! Session store over durable file storage: reloads, expiry and logout.

#![allow(clippy::unwrap_used)]

use bookclub_auth::mocks::mint_token;
use bookclub_auth::providers::KeyValueStorage;
use bookclub_auth::stores::{FileStorage, open_configured};
use bookclub_auth::{ClientConfig, Session, SessionStore};
use bookclub_core::environment::Clock;
use bookclub_testing::{MockClock, epoch, test_clock};
use std::path::Path;
use std::sync::Arc;

const HOUR: i64 = 3600;

fn open(path: &Path, clock: Arc<dyn Clock>) -> SessionStore<FileStorage> {
    SessionStore::open(FileStorage::open(path).unwrap(), clock)
}

#[test]
fn session_survives_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let token = mint_token("ana", Some(7), Some("ROLE_ADMIN"), epoch().timestamp() + HOUR);

    {
        let store = open(&path, Arc::new(test_clock()));
        let user = store
            .establish(Session::new(token.clone()).with_refresh_token(Some("r-1".into())))
            .unwrap();
        assert!(user.is_admin());
    }

    let store = open(&path, Arc::new(test_clock()));
    let session = store.get().unwrap();
    assert_eq!(session.bearer_token, token);
    assert_eq!(session.refresh_token.as_deref(), Some("r-1"));

    let user = store.current_user().unwrap();
    assert_eq!(user.username, "ana");
    assert_eq!(user.role.normalized(), "ADMIN");
    assert!(user.is_admin());
}

#[test]
fn expired_session_is_cleared_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let clock = Arc::new(MockClock::new(epoch()));
    let token = mint_token("ana", Some(7), None, epoch().timestamp() + HOUR);

    let store = open(&path, clock.clone());
    store.establish(Session::new(token)).unwrap();
    assert!(store.current_user().is_some());

    clock.advance(chrono::Duration::hours(2));
    assert!(store.current_user().is_none());
    assert!(store.get().is_none());

    let reopened = FileStorage::open(&path).unwrap();
    for key in ["auth_token", "refresh_token", "auth_user"] {
        assert_eq!(reopened.get(key).unwrap(), None, "{key} left behind");
    }
}

#[test]
fn malformed_token_on_disk_is_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    FileStorage::open(&path)
        .unwrap()
        .set("auth_token", "not-a-jwt")
        .unwrap();

    let store = open(&path, Arc::new(test_clock()));
    assert!(store.current_user().is_none());
    assert!(store.get().is_none());
}

#[test]
fn logout_removes_every_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let token = mint_token("ana", Some(7), None, epoch().timestamp() + HOUR);

    let store = open(&path, Arc::new(test_clock()));
    store
        .establish(Session::new(token).with_refresh_token(Some("r-1".into())))
        .unwrap();
    store.clear();

    let contents = std::fs::read_to_string(&path).unwrap();
    let entries: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&contents).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn configured_storage_path_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client/session.json");
    let config = ClientConfig::default().with_storage_path(&path);
    let token = mint_token("ana", Some(7), None, epoch().timestamp() + HOUR);

    let store = SessionStore::open(open_configured(&config).unwrap(), Arc::new(test_clock()));
    store.establish(Session::new(token.clone())).unwrap();

    let reloaded = open(&path, Arc::new(test_clock()));
    assert_eq!(reloaded.get().unwrap().bearer_token, token);
}

#[test]
fn failed_write_keeps_the_previous_session_whole() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let first = mint_token("ana", Some(7), None, epoch().timestamp() + HOUR);
    let second = mint_token("ana", Some(7), None, epoch().timestamp() + 2 * HOUR);

    let store = open(&path, Arc::new(test_clock()));
    store
        .establish(Session::new(first.clone()).with_refresh_token(Some("r-1".into())))
        .unwrap();

    // Block the temp file the next replacement would be written to.
    std::fs::create_dir(path.with_extension("tmp")).unwrap();
    assert!(store.set(Session::new(second)).is_err());

    let session = store.get().unwrap();
    assert_eq!(session.bearer_token, first);
    assert_eq!(session.refresh_token.as_deref(), Some("r-1"));

    let on_disk = FileStorage::open(&path).unwrap();
    assert_eq!(on_disk.get("auth_token").unwrap(), Some(first));
    assert_eq!(on_disk.get("refresh_token").unwrap().as_deref(), Some("r-1"));
}
