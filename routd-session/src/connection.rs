//! Connection layer: shadow sessions for stream transports.
//!
//! A stream transport loads one session per connection (the shadow) and
//! clones it for every incoming message. The request clone keeps a
//! handle back to the shadow so a sid rotation done while handling the
//! request also re-points the shadow; disconnect cleanup then operates
//! on the current sid.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use routd_x::Error;

use crate::session::{Session, CLIENT_FIELD, SERVER_FIELD};
use crate::user::UidUser;

impl<U: UidUser> Session<U> {
    /// Records the connection endpoints to bind into the session on the
    /// first request materialization.
    pub fn connect(mut self, server: impl Into<String>, client: impl Into<String>) -> Self {
        self.server_to_bind = Some(server.into());
        self.client_to_bind = Some(client.into());
        self
    }

    /// Wraps this session as a connection shadow.
    pub fn into_shadow(self) -> Arc<Mutex<Session<U>>> {
        Arc::new(Mutex::new(self))
    }

    /// Drops the bound endpoint fields on disconnect.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.silent_del(SERVER_FIELD)?;
        self.silent_del(CLIENT_FIELD)
    }

    /// Whether this handle is a request-scoped clone of a shadow.
    pub fn is_request(&self) -> bool {
        self.request
    }

    pub fn server_addr(&mut self) -> Option<String> {
        self.silent_get(SERVER_FIELD)
            .ok()
            .and_then(|value| value.as_str().map(ToString::to_string))
    }

    pub fn client_addr(&mut self) -> Option<String> {
        self.silent_get(CLIENT_FIELD)
            .ok()
            .and_then(|value| value.as_str().map(ToString::to_string))
    }

    /// Re-points the shadow at this session's (rotated) sid.
    pub(crate) fn update_shadow(&mut self) -> Result<(), Error> {
        if let Some(shadow) = self.shadow.clone() {
            let sid = self.sid.clone();
            let mut shadow = shadow.lock().map_err(|_| Error::closed0("shadow session poisoned"))?;
            shadow.re_meta(Some(&sid))?;
        }
        Ok(())
    }

    /// Clones the shadow for one request. A non-empty `sid` (from the
    /// packet) addresses that session, otherwise the shadow's own sid is
    /// used. On the first materialization the bound endpoints move from
    /// the shadow into the session state, so they are stored only once.
    pub fn clone_for_request(
        shadow: &Arc<Mutex<Session<U>>>,
        sid: &str,
    ) -> Result<Session<U>, Error> {
        let mut original = shadow.lock().map_err(|_| Error::closed0("shadow session poisoned"))?;
        let mut cloned = original.clone_session(Some(sid))?;
        cloned.newborn = false;
        cloned.request = true;
        cloned.shadow = Some(shadow.clone());
        if let Some(server) = original.server_to_bind.take() {
            let client = original.client_to_bind.take().unwrap_or_default();
            cloned.server_to_bind = Some(server.clone());
            cloned.client_to_bind = Some(client.clone());
            if cloned.silent_set(SERVER_FIELD, Value::String(server.clone())).is_ok() {
                let _ = cloned.silent_set(CLIENT_FIELD, Value::String(client));
            } else {
                // Binding failed; let a later request retry it.
                original.server_to_bind = Some(server);
                original.client_to_bind = Some(client);
            }
        }
        Ok(cloned)
    }
}
