//! The routable-protocol capability and its shared implementation base.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use routd_x::Error;

use crate::api::Api;

pub const CONTEXT_KEY_RESP_SID: &str = "Resp-Session-Id";
pub const HTTP_CONTENT_TYPE_KEY: &str = "Content-Type";
const SESSION_KEY: &str = "$#session#";

/// Implementation base for protocol adapters: the request value, the
/// buffered response, the latched error, a typed scratchpad shared with
/// middleware, and the cancellation surface.
///
/// The buffer and scratchpad sit behind a read-write lock so a handler
/// may fan work out to other tasks that write through a shared borrow.
pub struct Meta<Req> {
    pub req: Req,
    state: RwLock<MetaState>,
    err: Mutex<Option<Error>>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

struct MetaState {
    resp_buffer: BytesMut,
    ctx_data: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl<Req> Meta<Req> {
    pub fn new(req: Req) -> Self {
        Meta {
            req,
            state: RwLock::new(MetaState { resp_buffer: BytesMut::new(), ctx_data: HashMap::new() }),
            err: Mutex::new(None),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches a pre-populated scratchpad, letting an adapter seed
    /// per-connection context into every request.
    pub fn with_ctx_data(req: Req, ctx_data: HashMap<String, Arc<dyn Any + Send + Sync>>) -> Self {
        let meta = Self::new(req);
        meta.state.write().expect("meta state poisoned").ctx_data = ctx_data;
        meta
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn write(&self, bytes: &[u8]) {
        self.state.write().expect("meta state poisoned").resp_buffer.put_slice(bytes);
    }

    pub fn write_str(&self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Atomically drains the response buffer; the transport frames and
    /// writes whatever it gets back.
    pub fn clear_buffer(&self) -> Bytes {
        let mut state = self.state.write().expect("meta state poisoned");
        state.resp_buffer.split().freeze()
    }

    pub fn response_empty(&self) -> bool {
        self.state.read().expect("meta state poisoned").resp_buffer.is_empty()
    }

    pub fn set_error(&self, err: Error) {
        *self.err.lock().expect("meta error poisoned") = Some(err);
    }

    pub fn error(&self) -> Option<Error> {
        self.err.lock().expect("meta error poisoned").clone()
    }

    /// The `(code, message)` to serialize into a response, `(0, "")` when
    /// no error is latched.
    pub fn error_units(&self) -> (i32, String) {
        match self.error() {
            Some(err) => err.response_units(),
            None => (0, String::new()),
        }
    }

    /// Logs the latched error, if any: silent errors at debug, the rest
    /// at error level.
    pub fn log_error(&self) {
        match self.error() {
            Some(Error::Silent(message)) => debug!("{message}"),
            Some(err) => error!("{err}"),
            None => {}
        }
    }

    pub fn set_ctx_value<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.state
            .write()
            .expect("meta state poisoned")
            .ctx_data
            .insert(key.into(), Arc::new(value));
    }

    pub fn ctx_value<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let state = self.state.read().expect("meta state poisoned");
        let value = state.ctx_data.get(key)?.clone();
        drop(state);
        value.downcast().ok()
    }

    /// Stores the session handle for handlers and middleware. The
    /// concrete type is the adapter's choice; retrieval downcasts.
    pub fn set_session<S: Any + Send + Sync>(&self, session: Arc<S>) {
        let mut state = self.state.write().expect("meta state poisoned");
        state.ctx_data.insert(SESSION_KEY.to_string(), session);
    }

    pub fn session<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.ctx_value(SESSION_KEY)
    }

    /// Records a rotated sid for the adapter to send back to the client.
    pub fn set_resp_sid(&self, sid: impl Into<String>) {
        self.set_ctx_value(CONTEXT_KEY_RESP_SID, sid.into());
    }

    pub fn resp_sid(&self) -> String {
        self.ctx_value::<String>(CONTEXT_KEY_RESP_SID)
            .map(|sid| sid.as_ref().clone())
            .unwrap_or_default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The cancellation token propagated from the transport; handlers
    /// observe it and cease work, the router itself never cancels.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel_err(&self) -> Option<Error> {
        self.cancel
            .is_cancelled()
            .then(|| Error::closed0("request context cancelled"))
    }
}

/// Capability a transport adapter implements to make its requests
/// routable. Most plumbing is provided through [`Meta`]; an adapter
/// supplies the path/sid/id/body accessors and, where the transport has
/// one, a route discriminator.
pub trait RoutableProtocol: Send + Sync + 'static {
    type Req: Send + Sync;

    fn meta(&self) -> &Meta<Self::Req>;

    fn meta_mut(&mut self) -> &mut Meta<Self::Req>;

    /// The request path, slash-delimited without a leading slash.
    fn path(&self) -> &str;

    /// Lazily retrieves the request payload.
    fn body(&mut self) -> Result<Bytes, Error>;

    /// Request correlation id, 0 when the transport has none.
    fn id(&self) -> u32 {
        0
    }

    /// The session id as received; empty when the transport carries none.
    fn sid(&self) -> String {
        String::new()
    }

    /// Selects among routes sharing a path by transport-specific criteria
    /// (the HTTP adapter matches method and host); `None` maps to 404.
    fn match_api(&self, apis: &[&Api]) -> Option<usize> {
        (!apis.is_empty()).then_some(0)
    }

    fn write(&self, bytes: &[u8]) {
        self.meta().write(bytes);
    }

    fn write_str(&self, s: &str) {
        self.meta().write_str(s);
    }

    fn clear_buffer(&self) -> Bytes {
        self.meta().clear_buffer()
    }

    fn response_empty(&self) -> bool {
        self.meta().response_empty()
    }

    fn set_error(&self, err: Error) {
        self.meta().set_error(err);
    }

    fn error(&self) -> Option<Error> {
        self.meta().error()
    }

    fn error_units(&self) -> (i32, String) {
        self.meta().error_units()
    }

    fn log_error(&self) {
        self.meta().log_error();
    }

    fn set_ctx_value<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.meta().set_ctx_value(key, value);
    }

    fn ctx_value<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.meta().ctx_value(key)
    }

    fn set_resp_sid(&self, sid: String) {
        self.meta().set_resp_sid(sid);
    }

    fn resp_sid(&self) -> String {
        self.meta().resp_sid()
    }
}
