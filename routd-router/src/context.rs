//! Request-scoped routing context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use routd_x::Error;
use tokio_util::sync::CancellationToken;

use crate::api::RpApi;
use crate::protocol::RoutableProtocol;

/// A captured path variable: a single segment for required/optional
/// variables, an ordered segment list for the vector kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Scalar(String),
    Vector(Vec<String>),
}

impl Param {
    pub fn value(&self) -> &str {
        match self {
            Param::Scalar(value) => value,
            Param::Vector(_) => "",
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            Param::Scalar(_) => &[],
            Param::Vector(values) => values,
        }
    }
}

/// Per-request state handed to middleware and the controller: the
/// protocol value, the matched route, captured path params and the
/// matched suffix.
pub struct Context<Rp: RoutableProtocol> {
    pub rp: Rp,
    pub api: Option<Arc<RpApi<Rp>>>,
    params: HashMap<String, Param>,
    suffix: Option<String>,
    suffix_resolved: bool,
}

impl<Rp: RoutableProtocol> Context<Rp> {
    pub fn new(rp: Rp) -> Self {
        Context { rp, api: None, params: HashMap::new(), suffix: None, suffix_resolved: false }
    }

    pub(crate) fn set_routes(
        &mut self,
        api: Arc<RpApi<Rp>>,
        params: HashMap<String, Param>,
        suffix: Option<String>,
    ) {
        self.api = Some(api);
        self.params = params;
        self.suffix = suffix;
        self.suffix_resolved = false;
    }

    /// The matched suffix. When the route was found through the exact
    /// path map the suffix is resolved lazily against the route's
    /// declared set.
    pub fn suffix(&mut self) -> Option<&str> {
        if !self.suffix_resolved {
            if self.suffix.is_none() {
                if let Some(api) = &self.api {
                    self.suffix = api
                        .api
                        .suffixes
                        .iter()
                        .find(|suffix| !suffix.is_empty() && self.rp.path().ends_with(suffix.as_str()))
                        .cloned();
                }
            }
            self.suffix_resolved = true;
        }
        self.suffix.as_deref()
    }

    /// A scalar path variable, empty when absent.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(Param::value).unwrap_or("")
    }

    /// A vector path variable, empty when absent.
    pub fn params(&self, key: &str) -> &[String] {
        self.params.get(key).map(Param::values).unwrap_or(&[])
    }

    pub fn param_kind(&self, key: &str) -> Option<&Param> {
        self.params.get(key)
    }

    pub fn body(&mut self) -> Result<Bytes, Error> {
        self.rp.body()
    }

    pub fn write(&self, bytes: &[u8]) {
        self.rp.write(bytes);
    }

    pub fn write_str(&self, s: &str) {
        self.rp.write_str(s);
    }

    pub fn set_error(&self, err: Error) {
        self.rp.set_error(err);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.rp.meta().deadline()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.rp.meta().cancellation()
    }

    pub fn cancel_err(&self) -> Option<Error> {
        self.rp.meta().cancel_err()
    }

    pub fn value<T: std::any::Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.rp.ctx_value(key)
    }
}
