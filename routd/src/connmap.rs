//! Connection registry for stream transports.
//!
//! Maps remote address → connection handle and remote address → uid, so
//! handlers can push server-initiated messages to connected (and
//! logged-in) peers. One registry per transport router.

use dashmap::DashMap;
use tracing::debug;

pub struct ConnectorMap<C> {
    connections: DashMap<String, C>,
    uids: DashMap<String, u64>,
}

impl<C> Default for ConnectorMap<C> {
    fn default() -> Self {
        ConnectorMap { connections: DashMap::new(), uids: DashMap::new() }
    }
}

impl<C> ConnectorMap<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: impl Into<String>, conn: C) {
        self.connections.insert(addr.into(), conn);
    }

    /// Drops the connection and any uid binding.
    pub fn remove(&self, addr: &str) {
        self.connections.remove(addr);
        self.uids.remove(addr);
    }

    /// Disconnect-with-error cleanup; a read failure is an ordinary
    /// disconnect, so it logs at debug.
    pub fn except(&self, addr: &str, err: &dyn std::fmt::Display) {
        self.remove(addr);
        debug!(%addr, "client disconnected with: {err}");
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.connections.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Binds the peer to a uid, typically after login.
    pub fn set_uid(&self, addr: impl Into<String>, uid: u64) {
        self.uids.insert(addr.into(), uid);
    }

    pub fn unset_uid(&self, addr: &str) {
        self.uids.remove(addr);
    }

    pub fn uid(&self, addr: &str) -> Option<u64> {
        self.uids.get(addr).map(|entry| *entry)
    }

    /// Addresses of every connection bound to `uid`.
    pub fn addrs_by_uid(&self, uid: u64) -> Vec<String> {
        self.uids
            .iter()
            .filter(|entry| *entry.value() == uid)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl<C: Clone> ConnectorMap<C> {
    pub fn get(&self, addr: &str) -> Option<C> {
        self.connections.get(addr).map(|entry| entry.clone())
    }

    pub fn list_by(&self, filter: impl Fn(&str) -> bool) -> Vec<(String, C)> {
        self.connections
            .iter()
            .filter(|entry| filter(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_bindings_follow_the_connection() {
        let map: ConnectorMap<u8> = ConnectorMap::new();
        map.insert("10.0.0.9:50000", 1);
        map.set_uid("10.0.0.9:50000", 7);
        assert_eq!(map.uid("10.0.0.9:50000"), Some(7));
        assert_eq!(map.addrs_by_uid(7), vec!["10.0.0.9:50000".to_string()]);

        map.remove("10.0.0.9:50000");
        assert_eq!(map.uid("10.0.0.9:50000"), None);
        assert!(map.is_empty());
    }
}
