//! User layer: login/logout, lazy user loading and the uid → sids
//! reverse index.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use routd_x::Error;

use crate::session::{Session, MAPPING_TTL_SECONDS, USER_FIELD};

/// A user record storable in a session. The uid keys the reverse index.
pub trait UidUser: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn uid(&self) -> u64;
}

/// Minimal user record used by tests and demos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleUser {
    pub id: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub role_id: u16,
    pub nick: String,
}

fn is_zero(role_id: &u16) -> bool {
    *role_id == 0
}

impl UidUser for SimpleUser {
    fn uid(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LoadState {
    NotLoaded,
    LoadedNone,
    LoadedSome,
}

impl<U: UidUser> Session<U> {
    /// The logged-in user, loaded from the store on first access.
    pub fn user(&mut self) -> Option<&U> {
        if self.load_state == LoadState::NotLoaded {
            self.load_state = LoadState::LoadedNone;
            if let Ok(value) = self.store.get(&self.sid, USER_FIELD) {
                if let Ok(user) = serde_json::from_value::<U>(value) {
                    self.user = Some(user);
                    self.load_state = LoadState::LoadedSome;
                }
            }
        }
        match self.load_state {
            LoadState::LoadedSome => self.user.as_ref(),
            _ => None,
        }
    }

    pub fn uid(&mut self) -> Result<u64, Error> {
        self.user()
            .map(UidUser::uid)
            .ok_or_else(|| Error::closed0("user not loaded, cannot get uid"))
    }

    fn user_key(&mut self) -> Result<String, Error> {
        Ok(self.uid()?.to_string())
    }

    /// Logs `user` in: the current sid is retired and a fresh one takes
    /// over the state plus the user blob, which resists session
    /// fixation. A non-zero `ttl_minutes` overrides the session TTL.
    pub fn login(&mut self, user: U, ttl_minutes: u16) -> Result<(), Error> {
        self.do_login(Some(user), ttl_minutes)
    }

    /// Re-runs the login rotation for the already-stored user.
    pub fn auto_login(&mut self) -> Result<(), Error> {
        self.do_login(None, 0)
    }

    fn do_login(&mut self, user: Option<U>, ttl_minutes: u16) -> Result<(), Error> {
        let mut retired = self.clone_session(None)?;
        if ttl_minutes > 0 {
            self.ttl_minutes = ttl_minutes;
        }
        if let Some(user) = user {
            self.user = Some(user);
            self.load_state = LoadState::LoadedSome;
        }
        let mut filters = HashMap::new();
        if self.load_state == LoadState::LoadedSome {
            let value = serde_json::to_value(self.user.as_ref().expect("user just loaded"))
                .map_err(|e| Error::closed0(format!("user serialization failed: {e}")))?;
            filters.insert(USER_FIELD.to_string(), Some(value));
        }
        self.renew(filters)?;
        let _ = retired.destroy();
        Ok(())
    }

    /// Forgets the user: unmaps the sid from the reverse index and drops
    /// the stored blob. The session itself survives as a guest session.
    pub fn logout(&mut self) -> Result<(), Error> {
        if self.load_state < LoadState::LoadedSome {
            return Ok(());
        }
        self.unmap_user()?;
        self.user = None;
        self.load_state = LoadState::LoadedNone;
        self.silent_del(USER_FIELD)
    }

    /// All live sids mapped to `uid`.
    pub fn sids(&mut self, uid: u64) -> Result<Vec<String>, Error> {
        self.store.sids(&uid.to_string())
    }

    /// Writes `user` into every live session of its uid, so parallel
    /// sessions observe profile updates immediately.
    pub fn sync(&mut self, user: &U) -> Result<(), Error> {
        let sids = self.sids(user.uid())?;
        let value = serde_json::to_value(user)
            .map_err(|e| Error::closed0(format!("user serialization failed: {e}")))?;
        self.store.sync_user(&sids, USER_FIELD, value)
    }

    /// Session handles for every live sid of `uid`.
    pub fn list_by_uid(&mut self, uid: u64) -> Result<Vec<Session<U>>, Error> {
        let sids = self.sids(uid)?;
        Ok(self.list_by_sids(&sids))
    }

    pub(crate) fn map_user(&mut self) -> Result<(), Error> {
        let user_key = self.user_key()?;
        self.store.map_sid(&user_key, &self.sid, MAPPING_TTL_SECONDS)
    }

    pub(crate) fn unmap_user(&mut self) -> Result<(), Error> {
        let user_key = self.user_key()?;
        self.store.unmap_sid(&user_key, &self.sid)
    }
}
