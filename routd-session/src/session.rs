//! Core session: sid generation and parsing, value operations, renew.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use routd_x::Error;

use crate::store::Store;
use crate::user::{LoadState, UidUser};

/// Minimum length of a decoded sid: 64 hex chars of sha256, 4 hex chars
/// of ttl-minutes, and at least 8 hex chars of creation timestamp.
pub const MIN_SID_LEN: usize = 76;
pub const DEFAULT_TTL_MINUTES: u16 = 60;
/// TTL of a uid → sids index entry: a week.
pub const MAPPING_TTL_SECONDS: u32 = 60 * 60 * 24 * 7;

/// Reserved field holding the serialized user blob.
pub const USER_FIELD: &str = "$user";
/// Reserved field marking a rotated-away sid with its successor.
pub const NEW_SID_FIELD: &str = "$newid";
/// Reserved field holding the bound server address.
pub const SERVER_FIELD: &str = "$server";
/// Reserved field holding the bound client address.
pub const CLIENT_FIELD: &str = "$client";

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Generates a fresh sid for `ttl_minutes`:
/// `hex64(sha256(nanos ‖ rand64)) ‖ hex4(ttl) ‖ hex(create_unix)`.
/// Returns the sid and its creation timestamp.
pub fn gen_sid(ttl_minutes: u16) -> (String, i64) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let nanos = now.as_nanos();
    let seed: u64 = rand::random();
    let digest = Sha256::digest(format!("{nanos}-{seed}").as_bytes());
    let secs = now.as_secs() as i64;
    let mut sid = String::with_capacity(MIN_SID_LEN + 4);
    for byte in digest {
        let _ = write!(sid, "{byte:02X}");
    }
    let _ = write!(sid, "{ttl_minutes:04X}{secs:X}");
    (sid, secs)
}

/// Recovers `(ttl_minutes, create_unix)` from a sid's trailing
/// characters.
pub(crate) fn parse_sid(sid: &str) -> Result<(u16, i64), Error> {
    if sid.len() < MIN_SID_LEN || !sid.is_ascii() {
        return Err(Error::closed0(format!(
            "invalid sid \"{sid}\", shorter than {MIN_SID_LEN} chars"
        )));
    }
    let ttl_minutes = u16::from_str_radix(&sid[64..68], 16)
        .map_err(|e| Error::closed0(format!("invalid ttl in sid \"{sid}\": {e}")))?;
    let create_stamp = i64::from_str_radix(&sid[68..], 16)
        .map_err(|e| Error::closed0(format!("invalid timestamp in sid \"{sid}\": {e}")))?;
    Ok((ttl_minutes, create_stamp))
}

/// A handle on one durable session. Cloning a handle (same or different
/// sid) shares the backing store; two handles with the same sid refer to
/// the same durable state.
pub struct Session<U: UidUser> {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) sid: String,
    pub(crate) ttl_minutes: u16,
    pub(crate) create_stamp: i64,
    pub(crate) touched: bool,
    pub(crate) newborn: bool,
    pub(crate) sid_pool: Vec<String>,

    // User layer.
    pub(crate) load_state: LoadState,
    pub(crate) user: Option<U>,

    // Connection layer.
    pub(crate) request: bool,
    pub(crate) shadow: Option<Arc<Mutex<Session<U>>>>,
    pub(crate) server_to_bind: Option<String>,
    pub(crate) client_to_bind: Option<String>,
}

impl<U: UidUser> Session<U> {
    /// Opens a session handle. The first non-empty sid in `sid_pool`
    /// resumes that session; otherwise a newborn session is generated
    /// with `ttl_minutes`. Remaining pool entries are consumed by later
    /// rotations, which keeps rotation deterministic under test.
    pub fn new(store: Arc<dyn Store>, sid_pool: Vec<String>, ttl_minutes: u16) -> Result<Self, Error> {
        assert!(
            !sid_pool.is_empty() || ttl_minutes > 0,
            "session requires a sid pool or a non-zero ttl"
        );
        let mut sid_pool = sid_pool;
        let resumes = sid_pool.first().is_some_and(|first| !first.is_empty());
        let (sid, ttl_minutes, create_stamp, newborn) = if resumes {
            let sid = sid_pool.remove(0);
            let (ttl, stamp) = parse_sid(&sid)?;
            (sid, ttl, stamp, false)
        } else {
            let (sid, stamp) = gen_sid(ttl_minutes);
            (sid, ttl_minutes, stamp, true)
        };
        Ok(Session {
            store,
            sid,
            ttl_minutes,
            create_stamp,
            touched: false,
            newborn,
            sid_pool,
            load_state: LoadState::NotLoaded,
            user: None,
            request: false,
            shadow: None,
            server_to_bind: None,
            client_to_bind: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.sid
    }

    pub fn create_stamp(&self) -> i64 {
        self.create_stamp
    }

    pub fn ttl_seconds(&self) -> u32 {
        u32::from(self.ttl_minutes) * 60
    }

    pub fn ttl_minutes(&self) -> u16 {
        self.ttl_minutes
    }

    /// Whether this handle generated its sid rather than resuming one.
    pub fn newborn(&self) -> bool {
        self.newborn
    }

    /// Writes a field and refreshes the expiry (at most once per
    /// request).
    pub fn set<T: Serialize>(&mut self, field: &str, value: &T) -> Result<(), Error> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::closed0(format!("session value serialization failed: {e}")))?;
        self.try_touch()?;
        self.silent_set(field, value)
    }

    pub fn get<T: DeserializeOwned>(&mut self, field: &str) -> Result<T, Error> {
        let value = self.silent_get(field)?;
        self.try_touch()?;
        serde_json::from_value(value)
            .map_err(|e| Error::closed0(format!("session value deserialization failed: {e}")))
    }

    pub fn del(&mut self, field: &str) -> Result<(), Error> {
        self.silent_del(field)?;
        self.try_touch()
    }

    /// Value-level write without the touch side effect.
    pub fn silent_set(&mut self, field: &str, value: Value) -> Result<(), Error> {
        self.store.set(&self.sid, field, value)
    }

    pub fn silent_get(&mut self, field: &str) -> Result<Value, Error> {
        self.store.get(&self.sid, field)
    }

    pub fn silent_del(&mut self, field: &str) -> Result<(), Error> {
        self.store.del(&self.sid, field)
    }

    /// Removes the session state and, when the user is loaded, its
    /// reverse-index entry; unloaded entries are pruned lazily by the
    /// index itself.
    pub fn destroy(&mut self) -> Result<(), Error> {
        if self.load_state == LoadState::LoadedSome {
            let _ = self.unmap_user();
        }
        self.store.destroy(&self.sid)
    }

    /// Re-applies the TTL from now.
    pub fn touch(&mut self) -> Result<(), Error> {
        self.store.touch(&self.sid, self.ttl_seconds())
    }

    /// Touches at most once per handle lifetime; value operations call
    /// this so a request refreshes expiry exactly once.
    pub fn try_touch(&mut self) -> Result<(), Error> {
        if !self.touched {
            self.touch()?;
            self.touched = true;
        }
        Ok(())
    }

    pub fn load(&mut self, data: Map<String, Value>) -> Result<(), Error> {
        self.store.load(&self.sid, data)
    }

    pub fn raw(&mut self) -> Result<Map<String, Value>, Error> {
        self.store.raw(&self.sid)
    }

    /// Seconds since the session was last touched.
    pub fn ttl_passed(&self) -> Result<u32, Error> {
        self.store.ttl_passed(&self.sid, self.ttl_seconds())
    }

    /// Re-points this handle at `sid`, or at a freshly generated (or
    /// pool-drawn) sid when `None`.
    pub(crate) fn re_meta(&mut self, sid: Option<&str>) -> Result<(), Error> {
        self.touched = false;
        match sid {
            Some(sid) if !sid.is_empty() => {
                let (ttl, stamp) = parse_sid(sid)?;
                self.ttl_minutes = ttl;
                self.create_stamp = stamp;
                self.sid = sid.to_string();
            }
            _ => {
                let from_pool = self.sid_pool.first().is_some_and(|first| !first.is_empty());
                if from_pool {
                    let sid = self.sid_pool.remove(0);
                    let (_, stamp) = parse_sid(&sid)?;
                    self.sid = sid;
                    self.create_stamp = stamp;
                } else {
                    let (sid, stamp) = gen_sid(self.ttl_minutes);
                    self.sid = sid;
                    self.create_stamp = stamp;
                }
            }
        }
        Ok(())
    }

    /// Rotates the sid, carrying the state over. `filters` override the
    /// carried fields: `None` deletes a key, `Some` replaces it. The
    /// user mapping is refreshed and, on a request session, the rotation
    /// is propagated into the connection shadow.
    pub fn renew(&mut self, filters: HashMap<String, Option<Value>>) -> Result<(), Error> {
        let mut raw = self.raw()?;
        for (key, value) in filters {
            match value {
                None => {
                    raw.remove(&key);
                }
                Some(value) => {
                    raw.insert(key, value);
                }
            }
        }
        self.re_meta(None)?;
        if !raw.is_empty() {
            self.load(raw)?;
            self.try_touch()?;
        }
        self.load_state = LoadState::NotLoaded;
        let _ = self.map_user();
        if self.request {
            self.update_shadow()?;
        }
        Ok(())
    }

    /// A handle on the same session (`None`) or on `sid`, sharing the
    /// backing store. User state is reset so the clone loads it lazily;
    /// connection state is carried over.
    pub fn clone_session(&self, sid: Option<&str>) -> Result<Session<U>, Error> {
        let mut cloned = Session {
            store: self.store.clone(),
            sid: self.sid.clone(),
            ttl_minutes: self.ttl_minutes,
            create_stamp: self.create_stamp,
            touched: self.touched,
            newborn: self.newborn,
            sid_pool: self.sid_pool.clone(),
            load_state: LoadState::NotLoaded,
            user: None,
            request: self.request,
            shadow: self.shadow.clone(),
            server_to_bind: self.server_to_bind.clone(),
            client_to_bind: self.client_to_bind.clone(),
        };
        if let Some(sid) = sid {
            if !sid.is_empty() {
                cloned.re_meta(Some(sid))?;
            }
        }
        Ok(cloned)
    }

    /// Bulk handle creation; sids that fail to parse are skipped.
    pub fn list_by_sids(&self, sids: &[String]) -> Vec<Session<U>> {
        sids.iter()
            .filter_map(|sid| self.clone_session(Some(sid)).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::ShmStore;
    use crate::user::SimpleUser;

    fn store() -> Arc<ShmStore> {
        Arc::new(ShmStore::new())
    }

    #[test]
    fn generated_sid_parses_back() {
        let (sid, stamp) = gen_sid(90);
        assert!(sid.len() >= MIN_SID_LEN);
        let (ttl, parsed_stamp) = parse_sid(&sid).unwrap();
        assert_eq!(ttl, 90);
        assert_eq!(parsed_stamp, stamp);
    }

    #[test]
    fn short_sid_is_rejected() {
        assert!(parse_sid("deadbeef").is_err());
    }

    #[test]
    fn newborn_session_resumes_by_sid() {
        let store = store();
        let mut first: Session<SimpleUser> = Session::new(store.clone(), vec![], 60).unwrap();
        assert!(first.newborn());
        first.set("nick", &"drunk").unwrap();

        let mut second: Session<SimpleUser> =
            Session::new(store, vec![first.id().to_string()], 0).unwrap();
        assert!(!second.newborn());
        assert_eq!(second.id(), first.id());
        assert_eq!(second.get::<String>("nick").unwrap(), "drunk");
    }

    #[test]
    fn renew_rotates_and_carries_state() {
        let store = store();
        let mut session: Session<SimpleUser> = Session::new(store.clone(), vec![], 60).unwrap();
        session.set("kept", &1).unwrap();
        session.set("dropped", &2).unwrap();
        let old_sid = session.id().to_string();

        let mut filters = HashMap::new();
        filters.insert("dropped".to_string(), None);
        filters.insert("added".to_string(), Some(serde_json::json!(3)));
        session.renew(filters).unwrap();

        assert_ne!(session.id(), old_sid);
        assert_eq!(session.get::<i64>("kept").unwrap(), 1);
        assert_eq!(session.get::<i64>("added").unwrap(), 3);
        assert!(session.get::<i64>("dropped").is_err());
    }

    #[test]
    fn rotation_draws_from_the_sid_pool() {
        let store = store();
        let (initial, _) = gen_sid(60);
        let (reserve, _) = gen_sid(30);
        let mut session: Session<SimpleUser> =
            Session::new(store, vec![initial.clone(), reserve.clone()], 0).unwrap();
        assert!(!session.newborn());
        session.set("k", &1).unwrap();

        session.renew(HashMap::new()).unwrap();
        assert_eq!(session.id(), reserve);
        assert_eq!(session.ttl_minutes(), 60);
    }

    #[test]
    fn try_touch_is_idempotent_per_handle() {
        let store = store();
        let mut session: Session<SimpleUser> = Session::new(store.clone(), vec![], 60).unwrap();
        session.try_touch().unwrap();
        let first = store.ttl_passed(session.id(), session.ttl_seconds()).unwrap();
        session.try_touch().unwrap();
        let second = store.ttl_passed(session.id(), session.ttl_seconds()).unwrap();
        assert_eq!(first, second);
    }
}
