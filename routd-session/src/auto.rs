//! Periodic sid rotation with a concurrency-safe grace window.
//!
//! Rotating a sid while the client still sends requests under the old
//! one would lose updates, so the rotation leaves a marker: the old
//! session keeps running and stores the new sid under a reserved field.
//! Concurrent requests arriving on the old sid discover the marker and
//! catch up; once the grace window passes, whichever side is still
//! active wins and the other session is destroyed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use routd_x::Error;

use crate::session::{now_unix, Session, NEW_SID_FIELD};
use crate::user::UidUser;

pub const DEFAULT_RENEW_INTERVAL_SECONDS: u16 = 600;
pub const DEFAULT_ORIGINAL_JUDGMENT_SECONDS: u16 = 120;
pub const DEFAULT_CLONED_INACTIVE_JUDGMENT_SECONDS: u16 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRenewConfig {
    /// Seconds a sid lives before rotation (measured from creation).
    pub renew_interval_seconds: u16,
    /// Grace window after the interval during which requests on the old
    /// sid only touch instead of racing the rotation.
    pub original_judgment_seconds: u16,
    /// A rotated-to session younger than this (by last touch) signals
    /// that another client already committed to the new sid.
    pub cloned_inactive_judgment_seconds: u16,
}

impl Default for AutoRenewConfig {
    fn default() -> Self {
        AutoRenewConfig {
            renew_interval_seconds: DEFAULT_RENEW_INTERVAL_SECONDS,
            original_judgment_seconds: DEFAULT_ORIGINAL_JUDGMENT_SECONDS,
            cloned_inactive_judgment_seconds: DEFAULT_CLONED_INACTIVE_JUDGMENT_SECONDS,
        }
    }
}

/// Per-request driver of the rotation state machine.
pub struct AutoRenew<'a, U: UidUser> {
    session: &'a mut Session<U>,
    config: AutoRenewConfig,
}

impl<'a, U: UidUser> AutoRenew<'a, U> {
    pub fn new(session: &'a mut Session<U>) -> Self {
        AutoRenew { session, config: AutoRenewConfig::default() }
    }

    pub fn with_config(session: &'a mut Session<U>, config: AutoRenewConfig) -> Self {
        AutoRenew { session, config }
    }

    /// Runs one step of the state machine. Returns whether the session
    /// now runs under a fresh (or newborn) sid; a destroyed-by-competing-
    /// rotation session yields a closed error telling the caller the sid
    /// is unusable.
    pub fn try_renew(&mut self) -> Result<bool, Error> {
        if self.session.newborn() {
            return Ok(true);
        }
        let from_renew =
            now_unix() - self.session.create_stamp() - i64::from(self.config.renew_interval_seconds);
        if from_renew < 0 {
            let _ = self.session.try_touch();
            return Ok(false);
        }
        let new_sid = match self.session.silent_get(NEW_SID_FIELD) {
            Ok(value) => value.as_str().map(ToString::to_string),
            Err(_) => None,
        };
        match new_sid {
            // A previous request already rotated; past the grace window
            // decide which side survives.
            Some(new_sid) if from_renew > i64::from(self.config.original_judgment_seconds) => {
                let mut rotated = self.session.clone_session(Some(&new_sid))?;
                let rotated_passed = rotated.ttl_passed().unwrap_or(u32::MAX);
                if rotated_passed < u32::from(self.config.cloned_inactive_judgment_seconds) {
                    if let Ok(original_passed) = self.session.ttl_passed() {
                        if rotated_passed < original_passed {
                            // The other client committed to the new sid;
                            // this one loses its session.
                            self.session.destroy()?;
                            return Err(Error::closed0(format!(
                                "session \"{}\" was destroyed, unable to continue use",
                                self.session.id(),
                            )));
                        }
                    }
                }
                rotated.destroy()?;
                let mut filters = HashMap::new();
                filters.insert(NEW_SID_FIELD.to_string(), None);
                self.rotate(filters)?;
                Ok(true)
            }
            Some(_) => {
                // Another request rotated within the grace window; keep
                // using the old sid for now.
                let _ = self.session.try_touch();
                Ok(false)
            }
            None => {
                self.rotate(HashMap::new())?;
                Ok(true)
            }
        }
    }

    /// Rotates the session and leaves the new sid as a marker in the old
    /// one so concurrent holders can catch up.
    fn rotate(&mut self, filters: HashMap<String, Option<Value>>) -> Result<(), Error> {
        let mut old = self.session.clone_session(None)?;
        self.session.renew(filters)?;
        let _ = old.touch();
        old.silent_set(NEW_SID_FIELD, Value::String(self.session.id().to_string()))?;
        debug!(old = %old.id(), new = %self.session.id(), "session sid rotated");
        Ok(())
    }
}
