//! Route registration, tree construction and the routing algorithm.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, warn};

use routd_x::{Error, NodeId, Traverse, Tree, TreeElement};

use crate::api::{
    Api, RpApi, VarKind, MARK_PATH_PART_SEPARATOR, MARK_VARIABLE_CLOSING, MARK_VARIABLE_OPENER,
    MARK_VAR_TYPE_EMPTABLE_VECTOR, MARK_VAR_TYPE_OPTIONAL, MARK_VAR_TYPE_VECTOR,
};
use crate::context::{Context, Param};
use crate::handler::{Controller, Hook};
use crate::protocol::RoutableProtocol;

pub const CODE_NOT_FOUND: i32 = 404;

/// Bound on redirect chains before the router gives up with 404.
const REDIRECT_LIMIT: usize = 8;

type Matcher<Rp> = Box<dyn Fn(&Rp, &[&Api]) -> Option<usize> + Send + Sync>;

/// Per-segment node of the route tree.
pub(crate) struct ApiBranch<Rp: RoutableProtocol> {
    pub path: String,
    pub var_kind: VarKind,
    pub var_name: String,
    pub is_mid_var: bool,
    pub is_omission: bool,
    pub apis: Vec<Arc<RpApi<Rp>>>,
    pub var_children: Vec<NodeId>,
    pub omitted_passed_children: HashMap<String, NodeId>,
}

impl<Rp: RoutableProtocol> ApiBranch<Rp> {
    fn new(path: String, apis: Vec<Arc<RpApi<Rp>>>) -> Self {
        let is_omission = apis.iter().any(|api| api.api.omission);
        let mut branch = ApiBranch {
            path,
            var_kind: VarKind::None,
            var_name: String::new(),
            is_mid_var: false,
            is_omission,
            apis,
            var_children: Vec::new(),
            omitted_passed_children: HashMap::new(),
        };
        let key = branch.key();
        if key.starts_with(MARK_VARIABLE_OPENER) && key.ends_with(MARK_VARIABLE_CLOSING) {
            assert!(!branch.is_omission, "a variable segment cannot be an omission route");
            let name = &key[MARK_VARIABLE_OPENER.len()..key.len() - MARK_VARIABLE_CLOSING.len()];
            let (kind, name) = if let Some(n) = name.strip_suffix(MARK_VAR_TYPE_OPTIONAL) {
                (VarKind::Optional, n)
            } else if let Some(n) = name.strip_suffix(MARK_VAR_TYPE_EMPTABLE_VECTOR) {
                (VarKind::EmptableVector, n)
            } else if let Some(n) = name.strip_suffix(MARK_VAR_TYPE_VECTOR) {
                (VarKind::Vector, n)
            } else {
                (VarKind::Required, name)
            };
            branch.var_kind = kind;
            branch.var_name = name.to_string();
        }
        branch
    }
}

impl<Rp: RoutableProtocol> TreeElement for ApiBranch<Rp> {
    type Key = String;

    fn key(&self) -> String {
        match self.path.rfind(MARK_PATH_PART_SEPARATOR) {
            Some(i) => self.path[i + MARK_PATH_PART_SEPARATOR.len()..].to_string(),
            None => self.path.clone(),
        }
    }

    fn child_of(&self, parent: &Self) -> bool {
        match self.path.rfind(MARK_PATH_PART_SEPARATOR) {
            Some(i) => self.path[..i] == parent.path,
            None => parent.path.is_empty() && !self.path.is_empty(),
        }
    }
}

struct Pending<Rp: RoutableProtocol> {
    separator: String,
    suffix_boundary: String,
    api_buffer: Vec<RpApi<Rp>>,
    raw_omitted_paths: Vec<String>,
    before: HashMap<String, Arc<dyn Hook<Rp>>>,
    after: HashMap<String, Arc<dyn Hook<Rp>>>,
    matcher: Option<Matcher<Rp>>,
}

struct Built<Rp: RoutableProtocol> {
    separator: String,
    suffix_boundary: String,
    apis_mapping: HashMap<String, Vec<Arc<RpApi<Rp>>>>,
    id_mapping: HashMap<String, Arc<RpApi<Rp>>>,
    /// Raw route path → visible (omission-stripped) path.
    visible_paths: HashMap<String, String>,
    tree: Tree<ApiBranch<Rp>>,
    matcher: Matcher<Rp>,
    before: HashMap<String, Arc<dyn Hook<Rp>>>,
    after: HashMap<String, Arc<dyn Hook<Rp>>>,
    path_before: HashMap<String, String>,
    path_after: HashMap<String, String>,
}

/// The path router. Registration buffers routes under a mutex; the first
/// `route` call readies the router once, after which all routing runs
/// lock-free against the published tree and path maps.
pub struct Router<Rp: RoutableProtocol> {
    pending: Mutex<Pending<Rp>>,
    built: OnceLock<Built<Rp>>,
}

impl<Rp: RoutableProtocol> Default for Router<Rp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rp: RoutableProtocol> Router<Rp> {
    pub fn new() -> Self {
        Router {
            pending: Mutex::new(Pending {
                separator: MARK_PATH_PART_SEPARATOR.to_string(),
                suffix_boundary: crate::api::MARK_SUFFIX_BOUNDARY.to_string(),
                api_buffer: Vec::new(),
                raw_omitted_paths: Vec::new(),
                before: HashMap::new(),
                after: HashMap::new(),
                matcher: None,
            }),
            built: OnceLock::new(),
        }
    }

    /// Overrides the request-path segment separator and suffix boundary.
    pub fn set_separator(&self, separator: impl Into<String>, suffix_boundary: impl Into<String>) -> &Self {
        let mut pending = self.pending.lock().expect("router pending poisoned");
        pending.separator = separator.into();
        pending.suffix_boundary = suffix_boundary.into();
        self
    }

    /// Registers a responsive route at `path`.
    pub fn push(&self, path: impl Into<String>, controller: impl Controller<Rp> + 'static) -> &Self {
        self.push_api(Api::path(path), controller)
    }

    pub fn push_api(&self, api: Api, controller: impl Controller<Rp> + 'static) -> &Self {
        self.push_conf(RpApi::new(api, controller))
    }

    pub fn push_conf(&self, api: RpApi<Rp>) -> &Self {
        let mut pending = self.pending.lock().expect("router pending poisoned");
        if self.built.get().is_some() {
            warn!(path = %api.api.path, "router already readied; late route registration is ignored");
            return self;
        }
        assert!(
            !api.api.path.starts_with(&pending.separator),
            "api path \"{}\" cannot start with \"{}\"",
            api.api.path,
            pending.separator,
        );
        if api.api.omission {
            pending.raw_omitted_paths.push(api.api.path.clone());
        }
        pending.api_buffer.push(api);
        self
    }

    /// Binds a pre-controller hook. The path works like route paths, with
    /// a trailing sigil widening the scope: none = this route only, `*` =
    /// this route and descendants, `+` = descendants only. Omission is
    /// not applied here; bind against the visible path.
    pub fn set_before(&self, path: impl Into<String>, hook: impl Hook<Rp> + 'static) -> &Self {
        let path = path.into();
        let mut pending = self.pending.lock().expect("router pending poisoned");
        if pending.before.contains_key(&path) {
            warn!(path = %path, "path already has a preprocessor; reassigning overwrites it");
        }
        pending.before.insert(path, Arc::new(hook));
        self
    }

    pub fn set_before_paths<S, I>(&self, paths: I, hook: impl Hook<Rp> + Clone + 'static) -> &Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        for path in paths {
            self.set_before(path, hook.clone());
        }
        self
    }

    /// Binds a post-controller hook; same path syntax as [`set_before`].
    ///
    /// [`set_before`]: Router::set_before
    pub fn set_after(&self, path: impl Into<String>, hook: impl Hook<Rp> + 'static) -> &Self {
        let path = path.into();
        let mut pending = self.pending.lock().expect("router pending poisoned");
        if pending.after.contains_key(&path) {
            warn!(path = %path, "path already has a postprocessor; reassigning overwrites it");
        }
        pending.after.insert(path, Arc::new(hook));
        self
    }

    pub fn set_after_paths<S, I>(&self, paths: I, hook: impl Hook<Rp> + Clone + 'static) -> &Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        for path in paths {
            self.set_after(path, hook.clone());
        }
        self
    }

    /// Replaces the default matcher (which defers to
    /// [`RoutableProtocol::match_api`]).
    pub fn set_api_matcher(
        &self,
        matcher: impl Fn(&Rp, &[&Api]) -> Option<usize> + Send + Sync + 'static,
    ) -> &Self {
        self.pending.lock().expect("router pending poisoned").matcher = Some(Box::new(matcher));
        self
    }

    /// Routes a request: locates the route by path, runs the bound
    /// before hook, the controller and the after hook, latching any
    /// error into the context.
    pub async fn route(&self, ctx: &mut Context<Rp>) {
        let built = self.ready();
        let req_path = ctx.rp.path().to_string();
        match Self::locate(built, &ctx.rp, &req_path) {
            Ok((api, params, suffix, hook_key)) => {
                if let Err(err) = Self::routed_handle(built, api, params, suffix, &hook_key, ctx).await {
                    ctx.rp.set_error(err);
                }
            }
            Err(err) => ctx.rp.set_error(err),
        }
    }

    /// Routes by route id instead of path: the request path is taken as
    /// the id registered via [`Api::by_id`], skipping tree lookup.
    pub async fn id_route(&self, ctx: &mut Context<Rp>) {
        let built = self.ready();
        let id = ctx.rp.path().to_string();
        let result = match built.id_mapping.get(&id).cloned() {
            Some(api) => {
                debug!(id = %id, api = %api.api.path, "id matched api");
                let hook_key = built
                    .visible_paths
                    .get(&api.api.path)
                    .cloned()
                    .unwrap_or_else(|| api.api.path.clone());
                Self::routed_handle(built, api, HashMap::new(), None, &hook_key, ctx).await
            }
            None => Err(Error::openly(
                CODE_NOT_FOUND,
                format!("id \"{id}\" route failed, could not be matched by the router"),
            )),
        };
        if let Err(err) = result {
            ctx.rp.set_error(err);
        }
    }

    /// One-shot lazy build: the first caller assembles the tree and path
    /// maps; concurrent callers wait for the published result and every
    /// later call is a plain read.
    fn ready(&self) -> &Built<Rp> {
        self.built.get_or_init(|| {
            let mut pending = self.pending.lock().expect("router pending poisoned");
            Self::build_router(&mut pending)
        })
    }

    async fn routed_handle(
        built: &Built<Rp>,
        api: Arc<RpApi<Rp>>,
        params: HashMap<String, Param>,
        suffix: Option<String>,
        hook_key: &str,
        ctx: &mut Context<Rp>,
    ) -> Result<(), Error> {
        ctx.set_routes(api.clone(), params, suffix);
        if let Some(before_key) = built.path_before.get(hook_key) {
            if let Some(hook) = built.before.get(before_key) {
                hook.call(ctx).await?;
            }
        }
        api.controller.handle(ctx).await;
        if let Some(after_key) = built.path_after.get(hook_key) {
            if let Some(hook) = built.after.get(after_key) {
                hook.call(ctx).await?;
            }
        }
        Ok(())
    }

    fn locate(
        built: &Built<Rp>,
        rp: &Rp,
        req_path: &str,
    ) -> Result<(Arc<RpApi<Rp>>, HashMap<String, Param>, Option<String>, String), Error> {
        let mut path = req_path.to_string();
        let mut params = HashMap::new();
        let mut suffix: Option<String> = None;
        for _ in 0..=REDIRECT_LIMIT {
            let mut key = path.clone();
            let mut found = built.apis_mapping.get(&key);
            if found.is_none() {
                if let Some((var_path, var_params, var_suffix)) = Self::match_var_path(built, &path) {
                    key = suffix_path(&var_path, var_suffix.as_deref().unwrap_or(""), &built.suffix_boundary);
                    found = built.apis_mapping.get(&key);
                    params = var_params;
                    suffix = var_suffix;
                }
            }
            if let Some(apis) = found {
                let refs: Vec<&Api> = apis.iter().map(|api| &api.api).collect();
                if let Some(index) = (built.matcher)(rp, &refs) {
                    let api = apis
                        .get(index)
                        .cloned()
                        .ok_or_else(|| Error::closed0("api matcher returned an out-of-range index"))?;
                    if api.api.redirect.is_empty() {
                        debug!(path = req_path, api = %api.api.path, "path matched api");
                        return Ok((api, params, suffix, key));
                    }
                    path = api.api.redirect.clone();
                    continue;
                }
            }
            if built.apis_mapping.is_empty() {
                warn!("router has no apis; push routes before routing");
            }
            return Err(Error::openly(
                CODE_NOT_FOUND,
                format!("path \"{path}\" route failed, could not be matched by the router"),
            ));
        }
        Err(Error::openly(
            CODE_NOT_FOUND,
            format!("path \"{req_path}\" route failed, redirect limit exceeded"),
        ))
    }

    /// Worklist walk over the route tree for paths containing variable
    /// segments. Literal children win over variables; among variable
    /// children registration order decides.
    fn match_var_path(
        built: &Built<Rp>,
        path: &str,
    ) -> Option<(String, HashMap<String, Param>, Option<String>)> {
        let tree = &built.tree;
        let parts: Vec<&str> = path.split(built.separator.as_str()).collect();
        let mut loop_items: Vec<(NodeId, usize)> = vec![(tree.root(), 0)];
        let mut params: HashMap<String, Param> = HashMap::new();
        let mut suffix: Option<String> = None;
        let mut target: Option<NodeId> = None;
        'outer: while let Some((branch, part_no)) = loop_items.pop() {
            let is_last_part = part_no + 1 == parts.len();
            let is_overflowed = part_no >= parts.len();
            if is_overflowed && !tree.element(branch).apis.is_empty() {
                // Input exhausted on a branch with routes: matched.
                target = Some(branch);
                break;
            }
            if !is_overflowed {
                if let Some((sub, matched_suffix)) =
                    Self::find_consider_suffix(built, parts[part_no], is_last_part, branch)
                {
                    loop_items.push((sub, part_no + 1));
                    suffix = matched_suffix;
                    continue;
                }
            }
            let insert_pos = loop_items.len();
            let var_children = tree.element(branch).var_children.clone();
            for var_child in var_children {
                let elem = tree.element(var_child);
                if !elem.is_mid_var {
                    match elem.var_kind {
                        VarKind::Optional if is_overflowed => {
                            params.insert(elem.var_name.clone(), Param::Scalar(String::new()));
                            target = Some(var_child);
                            break 'outer;
                        }
                        VarKind::Optional | VarKind::Required if is_last_part => {
                            let (value, stripped) =
                                strip_declared_suffix(parts[part_no], &elem.apis, &built.suffix_boundary);
                            if stripped.is_some() {
                                suffix = stripped;
                            }
                            params.insert(elem.var_name.clone(), Param::Scalar(value));
                            target = Some(var_child);
                            break 'outer;
                        }
                        VarKind::EmptableVector if is_overflowed => {
                            params.insert(elem.var_name.clone(), Param::Vector(Vec::new()));
                            target = Some(var_child);
                            break 'outer;
                        }
                        VarKind::EmptableVector | VarKind::Vector if !is_overflowed => {
                            let mut tail: Vec<String> =
                                parts[part_no..].iter().map(ToString::to_string).collect();
                            if let Some(last) = tail.last_mut() {
                                let (value, stripped) =
                                    strip_declared_suffix(last, &elem.apis, &built.suffix_boundary);
                                if stripped.is_some() {
                                    suffix = stripped;
                                }
                                *last = value;
                            }
                            params.insert(elem.var_name.clone(), Param::Vector(tail));
                            target = Some(var_child);
                            break 'outer;
                        }
                        _ => continue,
                    }
                } else if elem.var_kind == VarKind::Required && !is_overflowed {
                    // A mid-path variable consumes this segment and the
                    // walk continues below it.
                    params.insert(elem.var_name.clone(), Param::Scalar(parts[part_no].to_string()));
                    loop_items.insert(insert_pos, (var_child, part_no + 1));
                }
            }
        }
        target.map(|node| (tree.element(node).path.clone(), params, suffix))
    }

    /// Finds a literal child for `part`, trying omission passthrough
    /// children, then progressively shorter suffix boundaries on the last
    /// segment against each candidate's declared suffix set.
    fn find_consider_suffix(
        built: &Built<Rp>,
        part: &str,
        is_last_part: bool,
        branch: NodeId,
    ) -> Option<(NodeId, Option<String>)> {
        let tree = &built.tree;
        let lookup = |p: &str| {
            tree.child(branch, &p.to_string())
                .or_else(|| tree.element(branch).omitted_passed_children.get(p).copied())
        };
        if let Some(found) = lookup(part) {
            return Some((found, None));
        }
        if is_last_part {
            let boundary_mark = built.suffix_boundary.as_str();
            let mut boundary = part.rfind(boundary_mark);
            while let Some(at) = boundary {
                if let Some(found) = lookup(&part[..at]) {
                    let leftover = &part[at + boundary_mark.len()..];
                    if let Some(matched) = tree
                        .element(found)
                        .apis
                        .iter()
                        .flat_map(|api| api.api.suffixes.iter())
                        .find(|suffix| suffix.as_str() == leftover)
                    {
                        return Some((found, Some(matched.clone())));
                    }
                }
                boundary = part[..at].rfind(boundary_mark);
            }
        }
        None
    }

    fn build_router(pending: &mut Pending<Rp>) -> Built<Rp> {
        let separator = pending.separator.clone();
        let suffix_boundary = pending.suffix_boundary.clone();
        let apis: Vec<Arc<RpApi<Rp>>> = pending.api_buffer.drain(..).map(Arc::new).collect();
        let raw_omitted_paths = std::mem::take(&mut pending.raw_omitted_paths);

        let tree = Self::build_tree(&apis);

        let mut visible_paths = HashMap::new();
        for api in &apis {
            visible_paths.insert(
                api.api.path.clone(),
                omitted_path(&api.api.path, &raw_omitted_paths),
            );
        }

        // Group routes sharing a visible path; each declared suffix gets
        // its own mapping entry holding the routes accepting it.
        let mut apis_mapping: HashMap<String, Vec<Arc<RpApi<Rp>>>> = HashMap::new();
        let mut remaining: Vec<Arc<RpApi<Rp>>> = apis.clone();
        while !remaining.is_empty() {
            let first = remaining.remove(0);
            let path = visible_paths[&first.api.path].clone();
            let mut group = vec![first];
            let mut suffixes: Vec<String> = Vec::new();
            let mut i = 0;
            while i < remaining.len() {
                if visible_paths[&remaining[i].api.path] == path {
                    group.push(remaining.remove(i));
                } else {
                    i += 1;
                }
            }
            for api in &group {
                for suffix in &api.api.suffixes {
                    if !suffixes.contains(suffix) {
                        suffixes.push(suffix.clone());
                    }
                }
            }
            for suffix in &suffixes {
                let members: Vec<Arc<RpApi<Rp>>> = group
                    .iter()
                    .filter(|api| api.api.suffixes.contains(suffix))
                    .cloned()
                    .collect();
                apis_mapping.insert(suffix_path(&path, suffix, &suffix_boundary), members);
            }
        }

        let id_mapping = apis
            .iter()
            .filter(|api| !api.api.id.is_empty())
            .map(|api| (api.api.id.clone(), api.clone()))
            .collect();

        let matcher = pending
            .matcher
            .take()
            .unwrap_or_else(|| Box::new(|rp: &Rp, apis: &[&Api]| rp.match_api(apis)));

        let before = std::mem::take(&mut pending.before);
        let after = std::mem::take(&mut pending.after);
        let mapping_keys: Vec<String> = apis_mapping.keys().cloned().collect();
        let path_before = map_middleware(&before, &mapping_keys, &separator);
        let path_after = map_middleware(&after, &mapping_keys, &separator);

        Built {
            separator,
            suffix_boundary,
            apis_mapping,
            id_mapping,
            visible_paths,
            tree,
            matcher,
            before,
            after,
            path_before,
            path_after,
        }
    }

    fn build_tree(apis: &[Arc<RpApi<Rp>>]) -> Tree<ApiBranch<Rp>> {
        // One branch per unique raw path, in registration order.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Arc<RpApi<Rp>>>> = HashMap::new();
        for api in apis {
            let entry = groups.entry(api.api.path.clone()).or_default();
            if entry.is_empty() {
                order.push(api.api.path.clone());
            }
            entry.push(api.clone());
        }
        let elements: Vec<ApiBranch<Rp>> = order
            .into_iter()
            .map(|path| {
                let apis = groups.remove(&path).unwrap_or_default();
                ApiBranch::new(path, apis)
            })
            .collect();

        let mut tree = Tree::new(ApiBranch::new(String::new(), Vec::new()));
        tree.build(elements, |tree, remains| {
            // Orphans are routes whose intermediate path segments were
            // never registered; synthesize empty branches for each
            // missing prefix, replacing a synthesized branch when a real
            // one arrives for the same path.
            let mut fills: Vec<(String, ApiBranch<Rp>)> = Vec::new();
            for remain in remains {
                let parts: Vec<&str> = remain.path.split(MARK_PATH_PART_SEPARATOR).collect();
                for i in 0..parts.len() - 1 {
                    let prefix = parts[..=i].join(MARK_PATH_PART_SEPARATOR);
                    let keys: Vec<String> = parts[..=i].iter().map(ToString::to_string).collect();
                    if tree.child_by_path(tree.root(), &keys).is_none()
                        && !fills.iter().any(|(path, _)| *path == prefix)
                    {
                        fills.push((prefix.clone(), ApiBranch::new(prefix, Vec::new())));
                    }
                }
                if let Some(slot) = fills
                    .iter_mut()
                    .find(|(path, branch)| *path == remain.path && branch.apis.is_empty())
                {
                    slot.1 = remain;
                } else {
                    fills.push((remain.path.clone(), remain));
                }
            }
            // Lexicographic order puts every synthesized parent before
            // its children and keeps sibling insertion deterministic.
            fills.sort_by(|a, b| a.0.cmp(&b.0));
            for (path, branch) in fills {
                let keys: Vec<String> =
                    path.split(MARK_PATH_PART_SEPARATOR).map(ToString::to_string).collect();
                let _ = tree.insert_by_path(&keys, branch);
            }
        });

        // Annotate: walk each node's ancestry past omission branches to
        // the first visible parent, marking mid-path variables and
        // wiring var/omission-passthrough child links.
        tree.traverse(|tree, node| {
            let node_is_var = tree.element(node).var_kind != VarKind::None;
            let node_key = tree.element(node).key();
            let mut passed_omission = false;
            let mut parent = tree.parent(node);
            while let Some(p) = parent {
                if !tree.element(p).is_omission {
                    match tree.element(p).var_kind {
                        VarKind::Required => tree.element_mut(p).is_mid_var = true,
                        VarKind::None => {}
                        _ => panic!(
                            "ambiguous variable segment \"{}\" cannot sit mid-path",
                            tree.element(p).key(),
                        ),
                    }
                    if node_is_var {
                        tree.element_mut(p).var_children.push(node);
                    } else if passed_omission {
                        tree.element_mut(p).omitted_passed_children.insert(node_key.clone(), node);
                    }
                    break;
                }
                passed_omission = true;
                parent = tree.parent(p);
            }
            Traverse::Continue
        });
        tree
    }
}

fn suffix_path(path: &str, suffix: &str, boundary: &str) -> String {
    if suffix.is_empty() {
        path.to_string()
    } else {
        format!("{path}{boundary}{suffix}")
    }
}

/// Strips omission-marked segments out of a raw route path.
fn omitted_path(path: &str, raw_omitted_paths: &[String]) -> String {
    let parts: Vec<&str> = path.split(MARK_PATH_PART_SEPARATOR).collect();
    let kept: Vec<&str> = parts
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let prefix = parts[..=*i].join(MARK_PATH_PART_SEPARATOR);
            !raw_omitted_paths.contains(&prefix)
        })
        .map(|(_, part)| *part)
        .collect();
    kept.join(MARK_PATH_PART_SEPARATOR)
}

fn strip_declared_suffix<Rp: RoutableProtocol>(
    part: &str,
    apis: &[Arc<RpApi<Rp>>],
    boundary: &str,
) -> (String, Option<String>) {
    for api in apis {
        for suffix in &api.api.suffixes {
            let tail = format!("{boundary}{suffix}");
            if part.ends_with(&tail) {
                return (part[..part.len() - tail.len()].to_string(), Some(suffix.clone()));
            }
        }
    }
    (part.to_string(), None)
}

fn split_glob(key: &str) -> (&str, Option<char>) {
    match key.chars().last() {
        Some(sigil @ ('+' | '*')) => (&key[..key.len() - sigil.len_utf8()], Some(sigil)),
        _ => (key, None),
    }
}

/// Resolves glob middleware bindings against the visible route paths.
/// Each route path binds to the most specific matching pattern: exact
/// patterns beat globs, longer pattern paths beat shorter, the empty
/// glob is the global fallback.
fn map_middleware<Rp: RoutableProtocol>(
    handlers: &HashMap<String, Arc<dyn Hook<Rp>>>,
    mapping_keys: &[String],
    separator: &str,
) -> HashMap<String, String> {
    let mut path_mapping = HashMap::new();
    let mut candidates: Vec<&String> = mapping_keys.iter().collect();
    let mut keys: Vec<&String> = handlers.keys().collect();
    keys.sort_by(|a, b| {
        let (path_a, glob_a) = split_glob(a);
        let (path_b, glob_b) = split_glob(b);
        path_b
            .len()
            .cmp(&path_a.len())
            .then(glob_a.is_some().cmp(&glob_b.is_some()))
            .then(a.cmp(b))
    });
    for key in keys {
        let (path, glob) = split_glob(key);
        let mut i = 0;
        while i < candidates.len() {
            let api_path = candidates[i].as_str();
            let matched = (glob != Some('+') && path == api_path)
                || (glob.is_some()
                    && (path.is_empty() || api_path.starts_with(&format!("{path}{separator}"))));
            if matched {
                path_mapping.insert(api_path.to_string(), key.clone());
                candidates.remove(i);
            } else {
                i += 1;
            }
        }
    }
    path_mapping
}
