//! In-memory session store with TTL bookkeeping.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde_json::{Map, Value};

use routd_x::Error;

use crate::store::Store;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Default)]
struct ShmMeta {
    data: Map<String, Value>,
    expire_stamp: i64,
}

/// Concurrent-map session store: one map for session state keyed by sid,
/// one for the uid → sids reverse index. Expired entries are swept
/// opportunistically on touch.
#[derive(Default)]
pub struct ShmStore {
    sessions: DashMap<String, ShmMeta>,
    users: DashMap<String, Vec<String>>,
    sweep_lock: Mutex<()>,
}

impl ShmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort sweep: runs on roughly a fifth of touches, under a
    /// try-lock so concurrent touchers never queue up behind it.
    fn try_sweep(&self) {
        let Ok(_guard) = self.sweep_lock.try_lock() else { return };
        if rand::random::<u8>() % 10 >= 2 {
            return;
        }
        let now = now_unix();
        self.sessions.retain(|_, meta| !(meta.expire_stamp > 0 && meta.expire_stamp <= now));
    }

    /// Drops dead sids from a user's index entry and returns the live
    /// remainder.
    fn live_sids(&self, user_key: &str) -> Vec<String> {
        match self.users.get_mut(user_key) {
            Some(mut entry) => {
                entry.retain(|sid| self.sessions.contains_key(sid));
                entry.clone()
            }
            None => Vec::new(),
        }
    }
}

impl Store for ShmStore {
    fn set(&self, sid: &str, field: &str, value: Value) -> Result<(), Error> {
        self.sessions
            .entry(sid.to_string())
            .or_default()
            .data
            .insert(field.to_string(), value);
        Ok(())
    }

    fn get(&self, sid: &str, field: &str) -> Result<Value, Error> {
        let meta = self
            .sessions
            .get(sid)
            .ok_or_else(|| Error::closed0(format!("sid \"{sid}\" could not be found in the store")))?;
        meta.data
            .get(field)
            .cloned()
            .ok_or_else(|| Error::silent(format!("no session value with key \"{field}\"")))
    }

    fn del(&self, sid: &str, field: &str) -> Result<(), Error> {
        if let Some(mut meta) = self.sessions.get_mut(sid) {
            meta.data.remove(field);
        }
        Ok(())
    }

    fn destroy(&self, sid: &str) -> Result<(), Error> {
        self.sessions.remove(sid);
        Ok(())
    }

    fn touch(&self, sid: &str, ttl_seconds: u32) -> Result<(), Error> {
        self.sessions.entry(sid.to_string()).or_default().expire_stamp =
            now_unix() + i64::from(ttl_seconds);
        self.try_sweep();
        Ok(())
    }

    fn load(&self, sid: &str, data: Map<String, Value>) -> Result<(), Error> {
        self.sessions.entry(sid.to_string()).or_default().data = data;
        Ok(())
    }

    fn raw(&self, sid: &str) -> Result<Map<String, Value>, Error> {
        Ok(self.sessions.get(sid).map(|meta| meta.data.clone()).unwrap_or_default())
    }

    fn ttl_passed(&self, sid: &str, ttl_seconds: u32) -> Result<u32, Error> {
        let meta = self
            .sessions
            .get(sid)
            .ok_or_else(|| Error::closed0(format!("sid \"{sid}\" could not be found in the store")))?;
        if meta.expire_stamp < 1 {
            return Err(Error::closed0("ttl was not initialized yet"));
        }
        let passed = now_unix() - meta.expire_stamp + i64::from(ttl_seconds);
        Ok(passed.max(0) as u32)
    }

    fn exists(&self, sid: &str) -> bool {
        self.sessions.contains_key(sid)
    }

    fn map_sid(&self, user_key: &str, sid: &str, _mapping_ttl_seconds: u32) -> Result<(), Error> {
        let mut sids = self.live_sids(user_key);
        if !sids.iter().any(|s| s == sid) {
            sids.push(sid.to_string());
        }
        self.users.insert(user_key.to_string(), sids);
        Ok(())
    }

    fn unmap_sid(&self, user_key: &str, sid: &str) -> Result<(), Error> {
        let mut sids = self.live_sids(user_key);
        sids.retain(|s| s != sid);
        if sids.is_empty() {
            self.users.remove(user_key);
        } else {
            self.users.insert(user_key.to_string(), sids);
        }
        Ok(())
    }

    fn sids(&self, user_key: &str) -> Result<Vec<String>, Error> {
        if !self.users.contains_key(user_key) {
            return Err(Error::silent(format!("no user mapping with key \"{user_key}\"")));
        }
        Ok(self.live_sids(user_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_lifecycle() {
        let store = ShmStore::new();
        store.set("sid-a", "nick", json!("drunk")).unwrap();
        assert_eq!(store.get("sid-a", "nick").unwrap(), json!("drunk"));

        store.del("sid-a", "nick").unwrap();
        assert!(matches!(store.get("sid-a", "nick"), Err(Error::Silent(_))));

        store.destroy("sid-a").unwrap();
        assert!(matches!(store.get("sid-a", "nick"), Err(Error::Closed { .. })));
    }

    #[test]
    fn ttl_passed_requires_a_touch() {
        let store = ShmStore::new();
        store.set("sid-b", "k", json!(1)).unwrap();
        assert!(store.ttl_passed("sid-b", 60).is_err());

        store.touch("sid-b", 60).unwrap();
        assert_eq!(store.ttl_passed("sid-b", 60).unwrap(), 0);
    }

    #[test]
    fn user_index_prunes_dead_sids() {
        let store = ShmStore::new();
        store.set("sid-1", "k", json!(1)).unwrap();
        store.set("sid-2", "k", json!(1)).unwrap();
        store.map_sid("7", "sid-1", 60).unwrap();
        store.map_sid("7", "sid-2", 60).unwrap();

        store.destroy("sid-2").unwrap();
        assert_eq!(store.sids("7").unwrap(), vec!["sid-1".to_string()]);

        store.unmap_sid("7", "sid-1").unwrap();
        assert!(store.sids("7").is_err());
    }
}
