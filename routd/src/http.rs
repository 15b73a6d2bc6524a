//! HTTP adapter over `http` crate request/response values.
//!
//! The server itself is host-provided: hand [`HttpRouter::route`] a
//! materialized `http::Request<Bytes>` from whatever stack accepted it
//! (hyper, axum, a test) and write back the returned response.

use std::sync::Arc;

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};

use routd_router::{
    proto_router, Api, Context, Controller, Meta, Method, RoutableProtocol, Router,
    HTTP_CONTENT_TYPE_KEY,
};
use routd_x::Error;

pub const HTTP_GET: Method = Method(1);
pub const HTTP_POST: Method = Method(2);
pub const HTTP_PUT: Method = Method(3);
pub const HTTP_DELETE: Method = Method(4);
pub const HTTP_HEAD: Method = Method(5);
pub const HTTP_OPTIONS: Method = Method(6);
pub const HTTP_CONNECT: Method = Method(7);
pub const HTTP_PATCH: Method = Method(8);
pub const HTTP_TRACE: Method = Method(9);

/// Header carrying the sid in both directions.
pub const HEADER_SID_KEY: &str = "X-Session-Id";

const SID_COOKIE_NAMES: [&str; 3] = ["session_id", "session-id", "x-session-id"];

pub type Http = Context<HttpProtocol>;

pub fn to_method(method: &http::Method) -> Method {
    match *method {
        http::Method::GET => HTTP_GET,
        http::Method::POST => HTTP_POST,
        http::Method::PUT => HTTP_PUT,
        http::Method::DELETE => HTTP_DELETE,
        http::Method::HEAD => HTTP_HEAD,
        http::Method::OPTIONS => HTTP_OPTIONS,
        http::Method::CONNECT => HTTP_CONNECT,
        http::Method::PATCH => HTTP_PATCH,
        http::Method::TRACE => HTTP_TRACE,
        _ => Method::NONE,
    }
}

pub struct HttpProtocol {
    meta: Meta<Request<Bytes>>,
    path: String,
}

impl HttpProtocol {
    pub fn new(req: Request<Bytes>) -> Self {
        let path = req.uri().path().trim_start_matches('/').to_string();
        HttpProtocol { meta: Meta::new(req), path }
    }

    fn host(&self) -> String {
        if let Some(host) = self.meta.req.headers().get(header::HOST) {
            if let Ok(host) = host.to_str() {
                return host.to_string();
            }
        }
        self.meta
            .req
            .uri()
            .authority()
            .map(|authority| authority.to_string())
            .unwrap_or_default()
    }
}

impl RoutableProtocol for HttpProtocol {
    type Req = Request<Bytes>;

    fn meta(&self) -> &Meta<Request<Bytes>> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta<Request<Bytes>> {
        &mut self.meta
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn body(&mut self) -> Result<Bytes, Error> {
        Ok(self.meta.req.body().clone())
    }

    /// Sid lookup order: the `X-Session-Id` header, then the session
    /// cookies (case-insensitive names).
    fn sid(&self) -> String {
        if let Some(value) = self.meta.req.headers().get(HEADER_SID_KEY) {
            if let Ok(sid) = value.to_str() {
                if !sid.is_empty() {
                    return sid.to_string();
                }
            }
        }
        for cookies in self.meta.req.headers().get_all(header::COOKIE) {
            let Ok(cookies) = cookies.to_str() else { continue };
            for cookie in cookies.split(';') {
                if let Some((name, value)) = cookie.split_once('=') {
                    let name = name.trim().to_ascii_lowercase();
                    if SID_COOKIE_NAMES.contains(&name.as_str()) {
                        return value.trim().to_string();
                    }
                }
            }
        }
        String::new()
    }

    /// Selects by method mask, then by bound hosts when the route
    /// declares any: `host:port` matches exactly, a bare port matches
    /// the request port, a bare name matches the request host.
    fn match_api(&self, apis: &[&Api]) -> Option<usize> {
        let method = to_method(self.meta.req.method());
        apis.iter().position(|api| {
            if !method.matches(api.method) {
                return false;
            }
            let hosts = api.hosts();
            if hosts.is_empty() {
                return true;
            }
            let req_host = self.host();
            hosts.iter().any(|host| {
                if host.contains(':') {
                    *host == req_host
                } else if host.parse::<u32>().is_ok() {
                    req_host.ends_with(&format!(":{host}"))
                } else {
                    req_host.starts_with(&format!("{host}:"))
                }
            })
        })
    }
}

/// Verb-helper wrapper around the HTTP router. `get` implies `head`,
/// the mutating verbs imply `options`.
#[derive(Clone)]
pub struct HttpRouter {
    pub router: Arc<Router<HttpProtocol>>,
}

impl HttpRouter {
    pub fn new() -> Self {
        HttpRouter { router: Arc::new(Router::new()) }
    }

    /// The process-wide HTTP router singleton.
    pub fn shared() -> Self {
        HttpRouter { router: proto_router("http") }
    }

    pub fn get(&self, path: impl Into<String>, controller: impl Controller<HttpProtocol> + 'static) -> &Self {
        self.push_method(HTTP_GET | HTTP_HEAD, path, controller)
    }

    pub fn post(&self, path: impl Into<String>, controller: impl Controller<HttpProtocol> + 'static) -> &Self {
        self.push_method(HTTP_POST | HTTP_OPTIONS, path, controller)
    }

    pub fn put(&self, path: impl Into<String>, controller: impl Controller<HttpProtocol> + 'static) -> &Self {
        self.push_method(HTTP_PUT | HTTP_OPTIONS, path, controller)
    }

    pub fn patch(&self, path: impl Into<String>, controller: impl Controller<HttpProtocol> + 'static) -> &Self {
        self.push_method(HTTP_PATCH | HTTP_OPTIONS, path, controller)
    }

    pub fn delete(&self, path: impl Into<String>, controller: impl Controller<HttpProtocol> + 'static) -> &Self {
        self.push_method(HTTP_DELETE | HTTP_OPTIONS, path, controller)
    }

    fn push_method(
        &self,
        method: Method,
        path: impl Into<String>,
        controller: impl Controller<HttpProtocol> + 'static,
    ) -> &Self {
        self.push_api(Api::path(path).by_method(method), controller)
    }

    /// # Panics
    ///
    /// Panics when `api.method` is unset: an HTTP route must name its
    /// verbs.
    pub fn push_api(&self, api: Api, controller: impl Controller<HttpProtocol> + 'static) -> &Self {
        assert!(api.method != Method::NONE, "an http api must specify its method mask");
        self.router.push_api(api, controller);
        self
    }

    /// Routes one request and renders the response: content type and
    /// rotated sid from the context, status from the latched error
    /// (openly errors keep their code, everything else collapses to
    /// 503; an openly error with buffered output keeps 200 and the
    /// output).
    pub async fn route(&self, req: Request<Bytes>) -> Response<Bytes> {
        let mut ctx = Context::new(HttpProtocol::new(req));
        self.router.route(&mut ctx).await;
        ctx.rp.log_error();

        let mut response = Response::builder();
        if let Some(content_type) = ctx.rp.ctx_value::<String>(HTTP_CONTENT_TYPE_KEY) {
            response = response.header(header::CONTENT_TYPE, content_type.as_str());
        }
        let mut status = StatusCode::OK;
        if let Some(err) = ctx.rp.error() {
            if !err.is_openly() || ctx.rp.response_empty() {
                let (code, message) = err.response_units();
                status = u16::try_from(code)
                    .ok()
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
                if ctx.rp.response_empty() {
                    ctx.rp.write_str(&message);
                }
            }
        }
        let resp_sid = ctx.rp.resp_sid();
        if !resp_sid.is_empty() {
            response = response.header(HEADER_SID_KEY, resp_sid);
        }
        response
            .status(status)
            .body(ctx.rp.clear_buffer())
            .unwrap_or_else(|_| Response::new(Bytes::new()))
    }
}

impl Default for HttpRouter {
    fn default() -> Self {
        Self::new()
    }
}
