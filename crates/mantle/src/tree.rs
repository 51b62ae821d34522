//! The command tree: one node per subcommand path.
//!
//! Nodes are added by grafting subtrees. Each node carries its handler slot, its
//! middleware chain (outermost first) and the options registered directly on
//! it; options registered on ancestors are visible too.
//!
//! # Attach order
//!
//! Attach order is part of the contract:
//!
//! - [`CommandTree::attach_middleware`] prepends to the chain of the node at
//!   the given path, so the newest middleware wraps outside older ones.
//! - [`CommandTree::attach_subtree`] gives every grafted node the parent's
//!   chain *as it is at graft time*, followed by the node's own chain.
//!
//! Middleware attached to a parent after a subtree was grafted is therefore
//! not applied to that subtree.
//!
//! Every mutation is validated as a whole before it is committed, so a
//! rejected attach leaves the tree unchanged.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::handler::{Handler, HandlerSlot};
use crate::middleware::Middleware;
use crate::naming::{is_builtin, path_to_string, process_command_name};
use crate::option::{Opt, PosArgSpec};
use crate::resolve::{resolve, Pipeline};

const ROOT: &[String] = &[];

/// One entry of the command tree.
#[derive(Debug, Clone)]
pub struct CommandNode {
    name: String,
    doc: String,
    handler: HandlerSlot,
    middlewares: Vec<Middleware>,
    options: Vec<Opt>,
    posargs: Option<PosArgSpec>,
    post_posargs: Option<PosArgSpec>,
}

impl CommandNode {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            handler: HandlerSlot::Unbound,
            middlewares: Vec::new(),
            options: Vec::new(),
            posargs: None,
            post_posargs: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn handler(&self) -> &HandlerSlot {
        &self.handler
    }

    /// The middleware chain, outermost first.
    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    /// Options registered directly on this node.
    pub fn options(&self) -> &[Opt] {
        &self.options
    }

    pub fn posargs(&self) -> Option<&PosArgSpec> {
        self.posargs.as_ref()
    }

    pub fn post_posargs(&self) -> Option<&PosArgSpec> {
        self.post_posargs.as_ref()
    }

    fn posargs_provides(&self) -> impl Iterator<Item = &str> {
        self.posargs
            .iter()
            .chain(self.post_posargs.iter())
            .filter_map(PosArgSpec::get_provides)
    }
}

/// Mapping from path to [`CommandNode`]. The root is the empty path.
#[derive(Debug, Clone)]
pub struct CommandTree {
    nodes: BTreeMap<Vec<String>, CommandNode>,
}

impl CommandTree {
    /// Creates a tree holding only a root node.
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(Vec::new(), CommandNode::new(root_name));
        Self { nodes }
    }

    pub fn root(&self) -> &CommandNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, path: &[String]) -> Option<&CommandNode> {
        self.nodes.get(path)
    }

    fn node_or_err(&self, path: &[String]) -> Result<&CommandNode, Error> {
        self.nodes.get(path).ok_or_else(|| {
            Error::config(format!("unknown command path: {:?}", path_to_string(path)))
        })
    }

    fn node_mut(&mut self, path: &[String]) -> Result<&mut CommandNode, Error> {
        self.nodes.get_mut(path).ok_or_else(|| {
            Error::config(format!("unknown command path: {:?}", path_to_string(path)))
        })
    }

    pub fn contains(&self, path: &[String]) -> bool {
        self.nodes.contains_key(path)
    }

    /// All paths, parents before children.
    pub fn paths(&self) -> impl Iterator<Item = &Vec<String>> {
        self.nodes.keys()
    }

    /// `path` and every node below it.
    pub fn subtree_paths(&self, path: &[String]) -> Vec<Vec<String>> {
        self.nodes
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect()
    }

    /// Paths of the direct children of `path`.
    pub fn children(&self, path: &[String]) -> Vec<Vec<String>> {
        self.nodes
            .keys()
            .filter(|p| p.len() == path.len() + 1 && p.starts_with(path))
            .cloned()
            .collect()
    }

    /// Options visible at `path`: those registered on the root, then on each
    /// ancestor, then on the node itself. Identical re-registrations appear once.
    pub fn reachable_options(&self, path: &[String]) -> Vec<&Opt> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for depth in 0..=path.len() {
            if let Some(node) = self.nodes.get(&path[..depth]) {
                for opt in &node.options {
                    if seen.insert(opt.dest()) {
                        out.push(opt);
                    }
                }
            }
        }
        out
    }

    /// Names supplied for free at `path`: reachable option destinations and
    /// positional `provides` names.
    pub fn available_names(&self, path: &[String]) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .reachable_options(path)
            .iter()
            .map(|o| o.dest().to_string())
            .collect();
        if let Some(node) = self.nodes.get(path) {
            names.extend(node.posargs_provides().map(String::from));
        }
        names
    }

    pub(crate) fn set_root_doc(&mut self, doc: String) {
        if let Some(root) = self.nodes.get_mut(ROOT) {
            root.doc = doc;
        }
    }

    /// Registers a root option without conflict checks. Only for the help
    /// and flagfile options of a fresh tree, whose names cannot collide.
    pub(crate) fn push_root_option(&mut self, opt: Opt) {
        if let Some(root) = self.nodes.get_mut(ROOT) {
            root.options.push(opt);
        }
    }

    /// Binds or replaces the root handler.
    pub(crate) fn set_root_handler(&mut self, handler: Handler) {
        if let Some(root) = self.nodes.get_mut(ROOT) {
            root.handler = HandlerSlot::Bound(handler);
        }
    }

    /// Registers the handler for `path`; fails if one is already bound.
    pub fn bind_handler(&mut self, path: &[String], handler: Handler) -> Result<(), Error> {
        let node = self.node_mut(path)?;
        if let HandlerSlot::Bound(existing) = &node.handler {
            return Err(Error::config(format!(
                "command path {:?} already has handler '{}'",
                path_to_string(path),
                existing.name()
            )));
        }
        node.handler = HandlerSlot::Bound(handler);
        Ok(())
    }

    pub(crate) fn set_posargs(
        &mut self,
        path: &[String],
        spec: Option<PosArgSpec>,
        trailing: bool,
    ) -> Result<(), Error> {
        if let Some(spec) = &spec {
            spec.validate()?;
        }
        self.commit(path, |tree| {
            let node = tree.node_mut(path)?;
            if trailing {
                node.post_posargs = spec;
            } else {
                node.posargs = spec;
            }
            Ok(())
        })
    }

    /// Registers an option on `path`. Re-registering an identical option is a no-op.
    pub fn add_option(&mut self, path: &[String], opt: Opt) -> Result<(), Error> {
        self.node_or_err(path)?;
        if self
            .reachable_options(path)
            .iter()
            .any(|existing| existing.same_as(&opt))
        {
            return Ok(());
        }
        self.commit(path, |tree| {
            tree.node_mut(path)?.options.push(opt);
            Ok(())
        })
    }

    /// Removes an option registered directly on `path`.
    pub(crate) fn remove_option(&mut self, path: &[String], dest: &str) {
        if let Some(node) = self.nodes.get_mut(path) {
            node.options.retain(|o| o.dest() != dest);
        }
    }

    /// Drops `path` and everything below it. The root cannot be removed.
    pub(crate) fn remove_subtree(&mut self, path: &[String]) {
        if !path.is_empty() {
            self.nodes.retain(|p, _| !p.starts_with(path));
        }
    }

    /// Prepends `mw` to the chain of the node at `path` and registers the
    /// options it declares there.
    pub fn attach_middleware(&mut self, path: &[String], mw: Middleware) -> Result<(), Error> {
        self.node_or_err(path)?;
        self.commit(path, |tree| {
            for opt in mw.options() {
                if !tree
                    .reachable_options(path)
                    .iter()
                    .any(|existing| existing.same_as(opt))
                {
                    tree.node_mut(path)?.options.push(opt.clone());
                }
            }
            tree.node_mut(path)?.middlewares.insert(0, mw);
            Ok(())
        })
    }

    /// Grafts `subtree` below `parent`, under the subtree root's name.
    ///
    /// Returns the path of the grafted root.
    pub fn attach_subtree(
        &mut self,
        parent: &[String],
        subtree: CommandTree,
    ) -> Result<Vec<String>, Error> {
        let parent_node = self.node_or_err(parent)?;
        let parent_chain = parent_node.middlewares.clone();
        let name = process_command_name(subtree.root().name())?;

        let mut base = parent.to_vec();
        base.push(name.clone());
        if self.nodes.contains_key(&base) {
            return Err(Error::config(format!(
                "duplicate subcommand {:?} under {:?}",
                name,
                path_to_string(parent)
            )));
        }

        let inherited: Vec<Opt> = self.reachable_options(parent).into_iter().cloned().collect();
        let grafted_root = base.clone();
        self.commit(&grafted_root, move |tree| {
            for (sub_path, mut node) in subtree.nodes {
                let mut path = base.clone();
                path.extend(sub_path.iter().cloned());
                if sub_path.is_empty() {
                    node.name = name.clone();
                    node.options
                        .retain(|opt| !inherited.iter().any(|o| o.same_as(opt)));
                }
                let mut chain = parent_chain.clone();
                chain.append(&mut node.middlewares);
                node.middlewares = chain;
                tree.nodes.insert(path, node);
            }
            Ok(())
        })?;
        Ok(grafted_root)
    }

    /// Resolves the pipeline for `path`.
    pub fn resolve(&self, path: &[String]) -> Result<Pipeline, Error> {
        self.resolve_with(path, &BTreeSet::new())
    }

    /// Resolves the pipeline for `path`, treating `extra` as available too.
    pub fn resolve_with(&self, path: &[String], extra: &BTreeSet<String>) -> Result<Pipeline, Error> {
        let node = self.node_or_err(path)?;
        let handler = node.handler.handler().ok_or_else(|| {
            Error::config(format!(
                "no handler specified for command path: {:?}",
                path_to_string(path)
            ))
        })?;
        let mut available = self.available_names(path);
        available.extend(extra.iter().cloned());
        resolve(path, &node.middlewares, handler, &available)
    }

    /// Applies `mutate` to a copy, validates every path at or below `path`,
    /// and only then replaces `self`.
    fn commit<F>(&mut self, path: &[String], mutate: F) -> Result<(), Error>
    where
        F: FnOnce(&mut CommandTree) -> Result<(), Error>,
    {
        let mut next = self.clone();
        mutate(&mut next)?;
        for affected in next.subtree_paths(path) {
            next.validate_path(&affected)?;
        }
        *self = next;
        Ok(())
    }

    /// Checks the naming rules for one path.
    pub(crate) fn validate_path(&self, path: &[String]) -> Result<(), Error> {
        let node = self.node_or_err(path)?;
        let at = path_to_string(path);

        let mut dests: BTreeMap<&str, &Opt> = BTreeMap::new();
        let mut shorts: BTreeMap<char, &str> = BTreeMap::new();
        for depth in 0..=path.len() {
            let Some(level) = self.nodes.get(&path[..depth]) else {
                continue;
            };
            for opt in &level.options {
                if is_builtin(opt.dest()) {
                    return Err(Error::conflict(format!(
                        "option {} uses the reserved name {:?}",
                        opt.flag_name(),
                        opt.dest()
                    )));
                }
                if let Some(prev) = dests.get(opt.dest()) {
                    if !prev.same_as(opt) {
                        return Err(Error::conflict(format!(
                            "two different options named {} are visible at {:?}",
                            opt.flag_name(),
                            at
                        )));
                    }
                    continue;
                }
                if let Some(c) = opt.short_char() {
                    if let Some(other) = shorts.insert(c, opt.dest()) {
                        return Err(Error::conflict(format!(
                            "short flag -{} is used by both {:?} and {:?} at {:?}",
                            c,
                            other,
                            opt.dest(),
                            at
                        )));
                    }
                }
                dests.insert(opt.dest(), opt);
            }
        }

        let mut provided: BTreeMap<&str, &str> = BTreeMap::new();
        for mw in &node.middlewares {
            for name in mw.provided() {
                if is_builtin(name) {
                    return Err(Error::conflict(format!(
                        "middleware '{}' provides the reserved name {:?}",
                        mw.name(),
                        name
                    )));
                }
                if dests.contains_key(name.as_str()) {
                    return Err(Error::conflict(format!(
                        "middleware '{}' provides {:?}, which is also an option at {:?}",
                        mw.name(),
                        name,
                        at
                    )));
                }
                if let Some(other) = provided.insert(name.as_str(), mw.name()) {
                    return Err(Error::conflict(format!(
                        "{:?} is provided by both middleware '{}' and '{}' at {:?}",
                        name,
                        other,
                        mw.name(),
                        at
                    )));
                }
            }
        }

        for name in node.posargs_provides() {
            if is_builtin(name) || dests.contains_key(name) || provided.contains_key(name) {
                return Err(Error::conflict(format!(
                    "positional arguments at {:?} provide {:?}, which is already taken",
                    at, name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn p(s: &str) -> Vec<String> {
        crate::naming::string_to_path(s)
    }

    fn handler(name: &str, requires: &[&str]) -> Handler {
        Handler::new(name, |_| Ok(Value::Null)).requires(requires.iter().copied())
    }

    fn mw(name: &str, provides: &[&str]) -> Middleware {
        Middleware::new(name, |_, next| next.proceed()).provides(provides.iter().copied())
    }

    fn leaf(name: &str) -> CommandTree {
        let mut tree = CommandTree::new(name);
        tree.set_root_handler(handler(name, &[]));
        tree
    }

    #[test]
    fn test_bind_handler_twice_fails() {
        let mut tree = CommandTree::new("app");
        tree.bind_handler(&[], handler("a", &[])).unwrap();
        let err = tree.bind_handler(&[], handler("b", &[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bind_unknown_path_fails() {
        let mut tree = CommandTree::new("app");
        assert!(tree.bind_handler(&p("nope"), handler("a", &[])).is_err());
    }

    #[test]
    fn test_attach_subtree_inherits_parent_chain() {
        let mut tree = CommandTree::new("app");
        tree.attach_middleware(&[], mw("outer", &["a"])).unwrap();

        let mut sub = leaf("db");
        sub.attach_middleware(&[], mw("inner", &["b"])).unwrap();
        let grafted = tree.attach_subtree(&[], sub).unwrap();
        assert_eq!(grafted, p("db"));

        let names: Vec<&str> = tree.node(&p("db")).unwrap().middlewares().iter().map(Middleware::name).collect();
        assert_eq!(names, vec!["outer", "inner"]);
    }

    #[test]
    fn test_attach_middleware_prepends() {
        let mut tree = leaf("app");
        tree.attach_middleware(&[], mw("first", &[])).unwrap();
        tree.attach_middleware(&[], mw("second", &[])).unwrap();
        let names: Vec<&str> = tree.root().middlewares().iter().map(Middleware::name).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_later_middleware_not_applied_to_grafted_subtree() {
        let mut tree = CommandTree::new("app");
        tree.attach_middleware(&[], mw("m", &["x"])).unwrap();
        tree.attach_subtree(&[], leaf("s")).unwrap();
        tree.attach_middleware(&[], mw("m2", &["y"])).unwrap();

        let names: Vec<&str> = tree.node(&p("s")).unwrap().middlewares().iter().map(Middleware::name).collect();
        assert_eq!(names, vec!["m"]);
    }

    #[test]
    fn test_duplicate_subcommand_rejected() {
        let mut tree = CommandTree::new("app");
        tree.attach_subtree(&[], leaf("add")).unwrap();
        assert!(matches!(
            tree.attach_subtree(&[], leaf("add")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_provides_rejected_and_tree_unchanged() {
        let mut tree = leaf("app");
        tree.attach_middleware(&[], mw("a", &["db"])).unwrap();
        let err = tree.attach_middleware(&[], mw("b", &["db"])).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(tree.root().middlewares().len(), 1);
    }

    #[test]
    fn test_provide_colliding_with_option_rejected() {
        let mut tree = leaf("app");
        tree.add_option(&[], Opt::flag("--verbose").unwrap()).unwrap();
        let err = tree.attach_middleware(&[], mw("v", &["verbose"])).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_provide_of_builtin_rejected() {
        let mut tree = leaf("app");
        let err = tree.attach_middleware(&[], mw("bad", &["flags_"])).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_option_on_parent_conflicting_with_child_rejected() {
        let mut tree = CommandTree::new("app");
        tree.attach_subtree(&[], leaf("sub")).unwrap();
        tree.add_option(&p("sub"), Opt::new("--level").unwrap()).unwrap();
        let err = tree
            .add_option(&[], Opt::count("--level").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_identical_option_is_noop() {
        let mut tree = leaf("app");
        let opt = Opt::flag("--verbose").unwrap();
        tree.add_option(&[], opt.clone()).unwrap();
        tree.add_option(&[], opt).unwrap();
        assert_eq!(tree.root().options().len(), 1);
    }

    #[test]
    fn test_inherited_option_on_unknown_path_rejected() {
        let mut tree = leaf("app");
        let opt = Opt::flag("--verbose").unwrap();
        tree.add_option(&[], opt.clone()).unwrap();
        let err = tree.add_option(&p("no_such_path"), opt).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_short_flag_collision_rejected() {
        let mut tree = leaf("app");
        tree.add_option(&[], Opt::flag("--verbose").unwrap().short('v'))
            .unwrap();
        let err = tree
            .add_option(&[], Opt::flag("--version").unwrap().short('v'))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_reachable_options_inherit() {
        let mut tree = CommandTree::new("app");
        tree.add_option(&[], Opt::flag("--verbose").unwrap()).unwrap();
        tree.attach_subtree(&[], leaf("sub")).unwrap();
        tree.add_option(&p("sub"), Opt::new("--name").unwrap()).unwrap();

        let at_sub: Vec<&str> = tree.reachable_options(&p("sub")).iter().map(|o| o.dest()).collect();
        assert_eq!(at_sub, vec!["verbose", "name"]);
        let at_root: Vec<&str> = tree.reachable_options(&[]).iter().map(|o| o.dest()).collect();
        assert_eq!(at_root, vec!["verbose"]);
    }

    #[test]
    fn test_resolve_unbound_is_config_error() {
        let tree = CommandTree::new("app");
        assert!(matches!(tree.resolve(&[]), Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_uses_available_names() {
        let mut tree = CommandTree::new("app");
        tree.add_option(&[], Opt::flag("--verbose").unwrap()).unwrap();
        let mut sub = CommandTree::new("show");
        sub.set_root_handler(handler("show", &["verbose"]));
        tree.attach_subtree(&[], sub).unwrap();

        let pipeline = tree.resolve(&p("show")).unwrap();
        assert!(pipeline.dep_names().contains("verbose"));
    }

    #[test]
    fn test_posargs_provides_conflict() {
        let mut tree = leaf("app");
        tree.add_option(&[], Opt::new("--ints").unwrap()).unwrap();
        let err = tree
            .set_posargs(&[], Some(PosArgSpec::new().provides("ints")), false)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
