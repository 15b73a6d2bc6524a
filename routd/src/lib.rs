//! routd: protocol-agnostic request routing and session framework.
//!
//! Incoming requests (CLI argv, HTTP, raw TCP, UDP datagrams, WebSocket
//! frames, generic byte streams) are dispatched to handlers selected by
//! a path pattern. The flow for one request:
//!
//! 1. a transport adapter reads one message and builds a value
//!    implementing [`router::RoutableProtocol`];
//! 2. the adapter wraps it in a [`router::Context`] and calls
//!    [`router::Router::route`];
//! 3. the router locates the route, captures path variables, runs
//!    before-middleware, the controller, then after-middleware;
//! 4. the adapter serializes the buffered response (plus any rotated
//!    session id) and writes it back.
//!
//! Concrete listeners are the host's concern: adapters here take an
//! already-accepted connection, stream, datagram or argv and drive the
//! routing for it.

pub mod cli;
pub mod connmap;
pub mod flex;
pub mod http;

pub use routd_flex as codec;
pub use routd_router as router;
pub use routd_session as session;
pub use routd_x::Error;

pub use connmap::ConnectorMap;
