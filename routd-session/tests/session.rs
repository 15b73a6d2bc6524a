// Lifecycle tests: login rotation, the uid index, cross-session sync
// and the auto-renew state machine. Timing-dependent cases run against
// synthetic sids whose encoded creation stamp is backdated.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use routd_session::{
    gen_sid, AutoRenew, AutoRenewConfig, Error, Session, ShmStore, SimpleUser, Store, UidUser,
    NEW_SID_FIELD, USER_FIELD,
};

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

/// A sid whose encoded creation timestamp lies `age_seconds` in the
/// past.
fn backdated_sid(ttl_minutes: u16, age_seconds: i64) -> String {
    let (sid, _) = gen_sid(ttl_minutes);
    format!("{}{:04X}{:X}", &sid[..64], ttl_minutes, now_unix() - age_seconds)
}

fn user(id: u64, nick: &str) -> SimpleUser {
    SimpleUser { id, role_id: 0, nick: nick.to_string() }
}

fn open(store: &Arc<ShmStore>, sid_pool: Vec<String>) -> Session<SimpleUser> {
    Session::new(store.clone(), sid_pool, 60).expect("session opens")
}

#[test]
fn login_rotates_the_sid_and_retires_the_old_one() {
    let store = Arc::new(ShmStore::new());
    let mut session = open(&store, vec![]);
    session.set("cart", &json!(["beer"])).unwrap();
    let s0 = session.id().to_string();

    session.login(user(7, "drunk"), 0).unwrap();
    let s1 = session.id().to_string();

    assert_ne!(s1, s0, "login must rotate the sid");
    assert!(!store.exists(&s0), "the pre-login sid must be destroyed");
    assert_eq!(session.user().map(|u| u.uid()), Some(7));
    assert_eq!(session.get::<Vec<String>>("cart").unwrap(), ["beer".to_string()]);
    assert_eq!(store.get(&s1, USER_FIELD).unwrap()["nick"], json!("drunk"));
}

#[test]
fn uid_index_tracks_every_live_session() {
    let store = Arc::new(ShmStore::new());
    let mut first = open(&store, vec![]);
    let mut second = open(&store, vec![]);
    first.login(user(7, "drunk"), 0).unwrap();
    second.login(user(7, "drunk"), 0).unwrap();

    let mut sids = first.sids(7).unwrap();
    sids.sort();
    let mut expected = vec![first.id().to_string(), second.id().to_string()];
    expected.sort();
    assert_eq!(sids, expected);

    first.logout().unwrap();
    assert_eq!(first.sids(7).unwrap(), vec![second.id().to_string()]);
}

#[test]
fn sync_updates_the_user_in_every_session() {
    let store = Arc::new(ShmStore::new());
    let mut first = open(&store, vec![]);
    let mut second = open(&store, vec![]);
    first.login(user(7, "drunk"), 0).unwrap();
    second.login(user(7, "drunk"), 0).unwrap();

    let renamed = user(7, "sober");
    first.sync(&renamed).unwrap();

    let mut reread_first = open(&store, vec![first.id().to_string()]);
    let mut reread_second = open(&store, vec![second.id().to_string()]);
    assert_eq!(reread_first.user().map(|u| u.nick.clone()), Some("sober".to_string()));
    assert_eq!(reread_second.user().map(|u| u.nick.clone()), Some("sober".to_string()));
}

#[test]
fn list_by_uid_yields_working_handles() {
    let store = Arc::new(ShmStore::new());
    let mut session = open(&store, vec![]);
    session.login(user(9, "solo"), 0).unwrap();

    let mut handles = session.list_by_uid(9).unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].id(), session.id());
    assert_eq!(handles[0].user().map(|u| u.uid()), Some(9));
}

#[test]
fn newborn_session_skips_renewal() {
    let store = Arc::new(ShmStore::new());
    let mut session = open(&store, vec![]);
    assert!(AutoRenew::new(&mut session).try_renew().unwrap());
}

#[test]
fn young_session_touches_instead_of_rotating() {
    let store = Arc::new(ShmStore::new());
    let sid = backdated_sid(60, 30);
    store.set(&sid, "k", json!(1)).unwrap();
    let mut session = open(&store, vec![sid.clone()]);

    assert!(!AutoRenew::new(&mut session).try_renew().unwrap());
    assert_eq!(session.id(), sid, "sid must be unchanged inside the interval");
    assert_eq!(store.ttl_passed(&sid, session.ttl_seconds()).unwrap(), 0, "must have touched");
}

#[test]
fn aged_session_rotates_and_marks_the_old_sid() {
    let store = Arc::new(ShmStore::new());
    let sid = backdated_sid(60, 700);
    store.set(&sid, "cart", json!("beer")).unwrap();
    let mut session = open(&store, vec![sid.clone()]);

    assert!(AutoRenew::new(&mut session).try_renew().unwrap());
    let rotated = session.id().to_string();
    assert_ne!(rotated, sid);

    // The old session survives with a marker pointing at the new sid,
    // and the state was carried over.
    assert_eq!(store.get(&sid, NEW_SID_FIELD).unwrap(), json!(rotated));
    assert_eq!(store.get(&rotated, "cart").unwrap(), json!("beer"));
    assert!(store.get(&rotated, NEW_SID_FIELD).is_err());
}

#[test]
fn grace_window_requests_touch_but_do_not_rotate_again() {
    let store = Arc::new(ShmStore::new());
    // 610 s old: past the 600 s interval, within the 120 s grace window.
    let sid = backdated_sid(60, 610);
    let (next_sid, _) = gen_sid(60);
    store.set(&sid, NEW_SID_FIELD, json!(next_sid)).unwrap();
    let mut session = open(&store, vec![sid.clone()]);

    assert!(!AutoRenew::new(&mut session).try_renew().unwrap());
    assert_eq!(session.id(), sid, "grace-window request keeps the old sid");
}

#[test]
fn committed_new_sid_destroys_the_old_session() {
    let store = Arc::new(ShmStore::new());
    // 800 s old: past interval and grace window.
    let sid = backdated_sid(60, 800);
    let (next_sid, _) = gen_sid(60);
    store.set(&sid, NEW_SID_FIELD, json!(next_sid)).unwrap();
    store.touch(&sid, 3600).unwrap();

    // The competing client touched the new sid more recently than the
    // old one was touched.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    store.set(&next_sid, "k", json!(1)).unwrap();
    store.touch(&next_sid, 3600).unwrap();

    let mut session = open(&store, vec![sid.clone()]);
    let err = AutoRenew::new(&mut session).try_renew().unwrap_err();
    assert!(matches!(err, Error::Closed { .. }), "loser gets a closed error: {err}");
    assert!(!store.exists(&sid), "the losing session is destroyed");
    assert!(store.exists(&next_sid), "the committed session survives");
}

#[test]
fn stale_new_sid_is_discarded_and_rotation_restarts() {
    let store = Arc::new(ShmStore::new());
    let sid = backdated_sid(60, 800);
    let (next_sid, _) = gen_sid(60);
    store.set(&sid, NEW_SID_FIELD, json!(next_sid)).unwrap();
    store.touch(&sid, 3600).unwrap();
    // The rotated-to session exists but nobody committed to it: its
    // last touch lies far in the past relative to its ttl.
    store.set(&next_sid, "k", json!(1)).unwrap();
    store.touch(&next_sid, 10).unwrap();

    let mut session = open(&store, vec![sid.clone()]);
    assert!(AutoRenew::new(&mut session).try_renew().unwrap());
    let fresh = session.id().to_string();
    assert_ne!(fresh, sid);
    assert_ne!(fresh, next_sid);
    assert!(!store.exists(&next_sid), "the abandoned rotation target is discarded");
    assert_eq!(store.get(&sid, NEW_SID_FIELD).unwrap(), json!(fresh));
    assert!(store.get(&fresh, NEW_SID_FIELD).is_err(), "marker must not carry into the new sid");
}

#[test]
fn custom_renew_config_shifts_the_interval() {
    let store = Arc::new(ShmStore::new());
    let sid = backdated_sid(60, 30);
    store.set(&sid, "k", json!(1)).unwrap();
    let mut session = open(&store, vec![sid.clone()]);

    let config = AutoRenewConfig {
        renew_interval_seconds: 10,
        ..AutoRenewConfig::default()
    };
    assert!(AutoRenew::with_config(&mut session, config).try_renew().unwrap());
    assert_ne!(session.id(), sid);
}
