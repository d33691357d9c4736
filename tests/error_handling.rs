//! Error handling and edge case tests.

use flexsync::{
    channel_transport, NullTransport, Query, Realm, RealmConfig, SubscriptionOptions,
    SubscriptionSetState, SyncConfig, SyncError, Version,
};
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> RealmConfig {
    RealmConfig {
        path: dir.path().join("realm"),
        sync: Some(SyncConfig::flexible(NullTransport)),
        ..Default::default()
    }
}

fn test_realm(dir: &TempDir) -> Realm {
    Realm::open(test_config(dir)).unwrap()
}

fn add_cats(realm: &Realm) {
    let mut subs = realm.subscriptions().unwrap();
    subs.update_no_wait(|m, _| {
        m.add(&Query::objects("Cat"), SubscriptionOptions::default())?;
        Ok(())
    })
    .unwrap();
}

// --- Session Errors ---

#[test]
fn test_acknowledge_unknown_version() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);
    let session = realm.sync_session().unwrap();

    add_cats(&realm);
    let err = session.acknowledge(Version(7)).unwrap_err();
    assert!(matches!(
        err,
        SyncError::UnknownVersion {
            version: Version(7),
            latest: Version(1)
        }
    ));
    assert_eq!(
        realm.subscriptions().unwrap().state(),
        SubscriptionSetState::Pending
    );
}

#[test]
fn test_acknowledge_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);
    let session = realm.sync_session().unwrap();

    add_cats(&realm);
    session.acknowledge(Version(1)).unwrap();
    session.acknowledge(Version(1)).unwrap();
    assert_eq!(
        realm.subscriptions().unwrap().state(),
        SubscriptionSetState::Complete
    );
}

#[test]
fn test_reject_after_complete() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);
    let session = realm.sync_session().unwrap();

    add_cats(&realm);
    session.acknowledge(Version(1)).unwrap();
    session.reject(Version(1), "permission revoked").unwrap();

    let subs = realm.subscriptions().unwrap();
    assert_eq!(subs.state(), SubscriptionSetState::Error);
    assert_eq!(subs.error().as_deref(), Some("permission revoked"));
    // A late acknowledgement does not clear the error.
    session.acknowledge(Version(1)).unwrap();
    assert_eq!(subs.state(), SubscriptionSetState::Error);
}

#[test]
fn test_transport_failure_leaves_version_pending() {
    let dir = TempDir::new().unwrap();
    let (transport, requests) = channel_transport();
    drop(requests);
    let realm = Realm::open(RealmConfig {
        sync: Some(SyncConfig::flexible(transport)),
        ..test_config(&dir)
    })
    .unwrap();

    // Delivery fails but the commit stands.
    add_cats(&realm);
    let subs = realm.subscriptions().unwrap();
    assert_eq!(subs.version(), Version(1));
    assert_eq!(subs.state(), SubscriptionSetState::Pending);

    let session = realm.sync_session().unwrap();
    assert!(matches!(session.resend(), Err(SyncError::Transport(_))));
}

#[test]
fn test_resend_only_when_pending() {
    let dir = TempDir::new().unwrap();
    let (transport, requests) = channel_transport();
    let realm = Realm::open(RealmConfig {
        sync: Some(SyncConfig::flexible(transport)),
        ..test_config(&dir)
    })
    .unwrap();
    let session = realm.sync_session().unwrap();

    assert!(!session.resend().unwrap());

    add_cats(&realm);
    assert!(session.resend().unwrap());
    assert_eq!(requests.try_iter().count(), 2);

    session.acknowledge(Version(1)).unwrap();
    assert!(!session.resend().unwrap());
}

// --- Closed Realm ---

#[test]
fn test_close_rejects_pending_wait() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);

    let mut subs = realm.subscriptions().unwrap();
    let mut wait = subs
        .update(|m, _| {
            m.add(&Query::objects("Cat"), SubscriptionOptions::default())?;
            Ok(())
        })
        .unwrap();
    assert!((&mut wait).now_or_never().is_none());

    realm.close();
    assert!(matches!(wait.now_or_never(), Some(Err(SyncError::RealmClosed))));
    assert!(matches!(
        subs.wait_for_synchronization().now_or_never(),
        Some(Err(SyncError::RealmClosed))
    ));
    assert!(matches!(realm.sync_session(), Err(SyncError::RealmClosed)));
}

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);
    realm.close();
    realm.close();
    assert!(realm.is_closed());
}

// --- Scope Handling ---

#[test]
fn test_panicking_callback_releases_scope() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);

    let mut subs = realm.subscriptions().unwrap();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = subs.update_no_wait(|m, _| -> flexsync::Result<()> {
            m.add(&Query::objects("Cat"), SubscriptionOptions::default())?;
            panic!("callback blew up");
        });
    }));
    assert!(result.is_err());

    // Nothing was committed and the next update goes through.
    let mut subs = realm.subscriptions().unwrap();
    assert_eq!(subs.version(), Version(0));
    subs.update_no_wait(|m, _| {
        m.add(&Query::objects("Dog"), SubscriptionOptions::default())?;
        Ok(())
    })
    .unwrap();
    assert_eq!(subs.version(), Version(1));
}

#[test]
fn test_empty_commit_on_fresh_realm() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);

    let mut subs = realm.subscriptions().unwrap();
    subs.update_no_wait(|_, _| Ok(())).unwrap();
    assert_eq!(subs.version(), Version(0));
    assert!(matches!(
        subs.wait_for_synchronization().now_or_never(),
        Some(Err(SyncError::NothingCommitted))
    ));
}

// --- Local Validation ---

#[test]
fn test_malformed_queries() {
    let dir = TempDir::new().unwrap();
    let realm = test_realm(&dir);

    for query in [
        Query::objects(""),
        Query::objects("Cat").filtered(""),
        Query::objects("Cat").filtered("(age > 1"),
        Query::objects("Cat").filtered("name == 'unterminated"),
        Query::objects("Cat").filtered("age > $0"),
    ] {
        let mut subs = realm.subscriptions().unwrap();
        let result = subs.update_no_wait(|m, _| {
            m.add(&query, SubscriptionOptions::default())?;
            Ok(())
        });
        assert!(
            matches!(result, Err(SyncError::Validation(_))),
            "{query:?} should be rejected"
        );
    }
    assert_eq!(realm.subscriptions().unwrap().version(), Version(0));
}

// --- Error Classification ---

#[test]
fn test_error_classification() {
    assert!(SyncError::SyncDisabled.is_precondition());
    assert!(SyncError::Superseded {
        version: Version(1),
        current: Version(2)
    }
    .is_precondition());
    assert!(!SyncError::Validation("x".into()).is_precondition());
    assert!(!SyncError::DuplicateSubscriptionName { name: "x".into() }.is_remote());
}
