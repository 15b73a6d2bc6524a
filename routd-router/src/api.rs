//! Route configuration: the `Api` record, method masks and route
//! registration pairs.

use std::any::Any;
use std::collections::HashMap;
use std::ops::BitOr;
use std::sync::Arc;

use crate::handler::Controller;
use crate::protocol::RoutableProtocol;

pub const MARK_PATH_PART_SEPARATOR: &str = "/";
pub const MARK_SUFFIX_SEPARATOR: &str = "|";
pub const MARK_SUFFIX_BOUNDARY: &str = ".";
pub const MARK_VARIABLE_OPENER: &str = "{";
pub const MARK_VARIABLE_CLOSING: &str = "}";
pub const MARK_VAR_TYPE_OPTIONAL: &str = "?";
pub const MARK_VAR_TYPE_EMPTABLE_VECTOR: &str = "*";
pub const MARK_VAR_TYPE_VECTOR: &str = "+";

const EXTRA_SERVE_ADDR_KEY: &str = "$#bind-hosts#";

/// Classification of a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarKind {
    /// Literal segment, not a variable.
    #[default]
    None,
    /// `{name}`: exactly one segment.
    Required,
    /// `{name?}`: zero or one segment, last position.
    Optional,
    /// `{name+}`: one or more trailing segments.
    Vector,
    /// `{name*}`: zero or more trailing segments.
    EmptableVector,
}

/// Small-integer method mask. The HTTP adapter assigns 1..9 to its verbs
/// and unions them; other protocols may use the mask however they like.
/// A request method `m` matches a route mask when `m & mask == m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Method(pub u32);

impl Method {
    pub const NONE: Method = Method(0);

    pub fn matches(self, mask: Method) -> bool {
        self.0 >= 1 && self.0 & mask.0 == self.0
    }
}

impl BitOr for Method {
    type Output = Method;

    fn bitor(self, rhs: Method) -> Method {
        Method(self.0 | rhs.0)
    }
}

/// A route definition. Registered at configuration time, immutable once
/// the router is readied.
#[derive(Default)]
pub struct Api {
    pub method: Method,
    pub path: String,
    pub suffixes: Vec<String>,
    pub id: String,
    pub omission: bool,
    pub responsive: bool,
    pub redirect: String,
    pub name: String,
    extras: HashMap<String, Extra>,
}

enum Extra {
    One(Arc<dyn Any + Send + Sync>),
    Many(Vec<Arc<dyn Any + Send + Sync>>),
}

impl Api {
    /// A responsive route at `path`. Suffixes are declared on the path
    /// tail (`home.html|xml`), never via the `suffixes` field.
    pub fn path(path: impl Into<String>) -> Self {
        Api { path: path.into(), responsive: true, ..Api::default() }
    }

    pub fn by_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Marks this route's own segment transparent to path matching.
    pub fn as_omission(mut self) -> Self {
        self.omission = true;
        self
    }

    pub fn as_responsive(mut self) -> Self {
        self.responsive = true;
        self
    }

    /// An unresponsive route buffers output but the adapter never
    /// flushes it (server-push and fire-and-forget handlers).
    pub fn as_unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }

    pub fn by_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect = redirect.into();
        self
    }

    pub fn by_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn by_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attaches an arbitrary value under `key` in the extras map.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.extras.insert(key.into(), Extra::One(Arc::new(value)));
        self
    }

    /// Appends values to the list stored under `key`, creating it on
    /// first use.
    ///
    /// # Panics
    ///
    /// Panics when `key` already holds a non-list value.
    pub fn append<T, I>(mut self, key: impl Into<String>, items: I) -> Self
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = T>,
    {
        let key = key.into();
        let slot = self
            .extras
            .entry(key.clone())
            .or_insert_with(|| Extra::Many(Vec::new()));
        match slot {
            Extra::Many(list) => {
                list.extend(items.into_iter().map(|item| Arc::new(item) as Arc<dyn Any + Send + Sync>));
            }
            Extra::One(_) => {
                panic!("api \"{}\" already has a non-list extra keyed by \"{key}\"", self.path)
            }
        }
        self
    }

    pub fn extra<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        match self.extras.get(key)? {
            Extra::One(value) => value.downcast_ref(),
            Extra::Many(_) => None,
        }
    }

    pub fn extras<T: Any + Send + Sync>(&self, key: &str) -> Vec<&T> {
        match self.extras.get(key) {
            Some(Extra::Many(list)) => list.iter().filter_map(|v| v.downcast_ref()).collect(),
            _ => Vec::new(),
        }
    }

    /// Binds host addresses this route serves; the HTTP matcher filters
    /// against them.
    pub fn bind_hosts<S: Into<String>, I: IntoIterator<Item = S>>(self, hosts: I) -> Self {
        self.append(EXTRA_SERVE_ADDR_KEY, hosts.into_iter().map(Into::into))
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.extras::<String>(EXTRA_SERVE_ADDR_KEY)
            .into_iter()
            .map(String::as_str)
            .collect()
    }
}

/// An [`Api`] paired with its controller, the unit the router stores.
pub struct RpApi<Rp: RoutableProtocol> {
    pub api: Api,
    pub controller: Box<dyn Controller<Rp>>,
}

impl<Rp: RoutableProtocol> RpApi<Rp> {
    /// Splits the declared suffix set off the path tail. A route without
    /// a declared suffix accepts the bare path (suffix set `{""}`).
    ///
    /// # Panics
    ///
    /// Panics when `api.suffixes` was populated directly instead of via
    /// the path tail.
    pub fn new(mut api: Api, controller: impl Controller<Rp> + 'static) -> Self {
        assert!(
            api.suffixes.is_empty(),
            "declare suffixes on the end of the path, not via the suffixes field"
        );
        let last_part_from = api
            .path
            .rfind(MARK_PATH_PART_SEPARATOR)
            .map(|i| i + MARK_PATH_PART_SEPARATOR.len())
            .unwrap_or(0);
        if let Some(bound) = api.path[last_part_from..].find(MARK_SUFFIX_BOUNDARY) {
            let declared = api.path[last_part_from + bound + MARK_SUFFIX_BOUNDARY.len()..].to_string();
            api.suffixes = declared
                .split(MARK_SUFFIX_SEPARATOR)
                .map(ToString::to_string)
                .collect();
            api.path.truncate(last_part_from + bound);
        } else {
            api.suffixes = vec![String::new()];
        }
        RpApi { api, controller: Box::new(controller) }
    }
}
