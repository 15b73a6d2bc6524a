//! Path-pattern request router with middleware and protocol-agnostic
//! request context.
//!
//! Transports implement the [`RoutableProtocol`] capability; the
//! [`Router`] matches the request path against registered [`Api`] routes
//! through a prefix tree over path segments, runs bound before/after
//! middleware, and dispatches the route's controller with a [`Context`]
//! carrying captured path variables and the response buffer.
//!
//! Pattern syntax (`/` separates segments):
//!
//! - `hello`: literal segment
//! - `{name}`: required variable
//! - `{name?}`: optional variable (last position)
//! - `{name+}`: vector variable, one or more trailing segments
//! - `{name*}`: emptable vector variable, zero or more trailing segments
//! - `home.html|xml`: suffix set on the last segment
//!
//! A route flagged as omission keeps its own segment out of the visible
//! path, so its children match as if attached to its parent.

pub mod api;
pub mod context;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod router;

pub use api::{Api, Method, RpApi, VarKind};
pub use context::{Context, Param};
pub use handler::{AsyncController, AsyncHook, Controller, Hook};
pub use protocol::{Meta, RoutableProtocol, CONTEXT_KEY_RESP_SID, HTTP_CONTENT_TYPE_KEY};
pub use registry::{clear_proto_routers, proto_router};
pub use router::{Router, CODE_NOT_FOUND};

pub use routd_x::Error;
