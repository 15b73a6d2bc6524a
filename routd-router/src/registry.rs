//! Process-wide named router registry.
//!
//! Each transport adapter pulls its singleton router by key; the router
//! is created on first access and lives for the process. Tests call
//! [`clear_proto_routers`] between cases.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::protocol::RoutableProtocol;
use crate::router::Router;

static ROUTERS: OnceLock<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>> {
    ROUTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The named singleton router for `key`, created on first access.
///
/// # Panics
///
/// Panics when `key` was first claimed by a router of a different
/// protocol type.
pub fn proto_router<Rp: RoutableProtocol>(key: &str) -> Arc<Router<Rp>> {
    let mut routers = registry().lock().expect("router registry poisoned");
    let entry = routers
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(Router::<Rp>::new()));
    entry
        .clone()
        .downcast::<Router<Rp>>()
        .unwrap_or_else(|_| panic!("router \"{key}\" is registered for a different protocol type"))
}

/// Drops every registered router. Test hook.
pub fn clear_proto_routers() {
    if let Some(routers) = ROUTERS.get() {
        routers.lock().expect("router registry poisoned").clear();
    }
}
