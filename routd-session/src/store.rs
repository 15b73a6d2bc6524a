//! The session backing-store abstraction.

use serde_json::{Map, Value};

use routd_x::Error;

/// Durable session state, keyed by sid, plus the uid → sids reverse
/// index. The value currency is `serde_json::Value`: in-memory stores
/// keep values as-is, remote stores serialize them however their wire
/// format requires.
///
/// Backends namespace the keys themselves (a remote store would prefix
/// sids and user keys); callers always pass bare sids and uid strings.
pub trait Store: Send + Sync {
    fn set(&self, sid: &str, field: &str, value: Value) -> Result<(), Error>;

    /// A missing field yields a silent error; a missing session yields a
    /// closed error.
    fn get(&self, sid: &str, field: &str) -> Result<Value, Error>;

    fn del(&self, sid: &str, field: &str) -> Result<(), Error>;

    /// Removes the whole session.
    fn destroy(&self, sid: &str) -> Result<(), Error>;

    /// Re-applies the TTL from now.
    fn touch(&self, sid: &str, ttl_seconds: u32) -> Result<(), Error>;

    /// Replaces the session's state wholesale.
    fn load(&self, sid: &str, data: Map<String, Value>) -> Result<(), Error>;

    fn raw(&self, sid: &str) -> Result<Map<String, Value>, Error>;

    /// Seconds elapsed since the session was last touched, computed from
    /// the store's own expiry bookkeeping.
    fn ttl_passed(&self, sid: &str, ttl_seconds: u32) -> Result<u32, Error>;

    fn exists(&self, sid: &str) -> bool;

    /// Adds `sid` to the user's reverse index.
    fn map_sid(&self, user_key: &str, sid: &str, mapping_ttl_seconds: u32) -> Result<(), Error>;

    fn unmap_sid(&self, user_key: &str, sid: &str) -> Result<(), Error>;

    /// All live sids mapped to the user; dead entries are pruned on the
    /// way out.
    fn sids(&self, user_key: &str) -> Result<Vec<String>, Error>;

    /// Writes `value` under `field` in every listed session. Remote
    /// stores may pipeline this; the default is a per-sid loop.
    fn sync_user(&self, sids: &[String], field: &str, value: Value) -> Result<(), Error> {
        for sid in sids {
            self.set(sid, field, value.clone())?;
        }
        Ok(())
    }
}
