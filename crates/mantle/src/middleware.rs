//! Middleware: reusable layers wrapped around handlers.
//!
//! Middleware let cross-cutting concerns (logging, auth, verbosity) live
//! outside handler logic. Each middleware declares what it `requires` and
//! what it `provides`; anything it provides becomes available to every layer
//! nested inside it.
//!
//! # Pipeline Position
//!
//! ```text
//! parsed CLI args + builtins
//!   → outermost middleware   (may short-circuit, supplies `provides`)
//!     → inner middleware
//!       → handler
//! ```
//!
//! A middleware receives its own [`Injected`] values plus a [`Next`] it may
//! call to continue the pipeline:
//!
//! ```rust
//! use mantle::{Middleware, Opt, Value};
//!
//! let verbosity = Middleware::new("verbosity", |inj, next| {
//!     let level = if inj.get_as::<bool>("verbose")? { 2 } else { 1 };
//!     next.run([("verbosity", Value::from(level))])
//! })
//! .requires(["verbose"])
//! .provides(["verbosity"])
//! .option(Opt::flag("--verbose")?);
//! # Ok::<(), mantle::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::Error;
use crate::handler::{HandlerResult, Injected, Scope};
use crate::option::Opt;
use crate::resolve::Pipeline;

/// Type alias for middleware functions.
pub type MiddlewareFn = Rc<dyn Fn(&Injected<'_>, Next<'_>) -> HandlerResult>;

/// A layer wrapped around a handler.
#[derive(Clone)]
pub struct Middleware {
    name: String,
    provides: Vec<String>,
    requires: Vec<String>,
    options: Vec<Opt>,
    func: MiddlewareFn,
}

fn push_unique<I, S>(target: &mut Vec<String>, names: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for name in names {
        let name = name.into();
        if !target.contains(&name) {
            target.push(name);
        }
    }
}

impl Middleware {
    /// Creates a middleware that requires and provides nothing.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Injected<'_>, Next<'_>) -> HandlerResult + 'static,
    {
        Self {
            name: name.into(),
            provides: Vec::new(),
            requires: Vec::new(),
            options: Vec::new(),
            func: Rc::new(f),
        }
    }

    /// Declares names this middleware supplies to everything inside it.
    pub fn provides<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_unique(&mut self.provides, names);
        self
    }

    /// Declares names this middleware needs from outside itself.
    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        push_unique(&mut self.requires, names);
        self
    }

    /// Registers an option alongside the middleware wherever it is attached.
    pub fn option(mut self, opt: Opt) -> Self {
        self.options.push(opt);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provided(&self) -> &[String] {
        &self.provides
    }

    /// Required names, excluding anything the middleware provides itself.
    pub fn required(&self) -> Vec<String> {
        self.requires
            .iter()
            .filter(|name| !self.provides.contains(name))
            .cloned()
            .collect()
    }

    pub fn options(&self) -> &[Opt] {
        &self.options
    }

    pub(crate) fn call(&self, injected: &Injected<'_>, next: Next<'_>) -> HandlerResult {
        (self.func)(injected, next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .field("provides", &self.provides)
            .field("requires", &self.requires)
            .field("options", &self.options.len())
            .finish_non_exhaustive()
    }
}

/// The rest of the pipeline, as seen from inside a middleware.
pub struct Next<'a> {
    pipeline: &'a Pipeline,
    index: usize,
    scope: Scope<'a>,
    middleware: &'a Middleware,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        pipeline: &'a Pipeline,
        index: usize,
        scope: Scope<'a>,
        middleware: &'a Middleware,
    ) -> Self {
        Self {
            pipeline,
            index,
            scope,
            middleware,
        }
    }

    /// Runs the inner layers with `values` added to (or replacing entries in)
    /// the scope. Every declared provide must be among `values`.
    pub fn run<I, K>(self, values: I) -> HandlerResult
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: BTreeMap<String, Value> =
            values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if let Some(missing) = self
            .middleware
            .provided()
            .iter()
            .find(|name| !values.contains_key(*name))
        {
            return Err(Error::config(format!(
                "middleware '{}' did not provide {:?}",
                self.middleware.name(),
                missing
            ))
            .into());
        }
        let mut scope = self.scope;
        scope.values.extend(values);
        self.pipeline.run_from(self.index, scope)
    }

    /// Runs the inner layers unchanged. Only valid for middleware that
    /// provide nothing.
    pub fn proceed(self) -> HandlerResult {
        self.run(std::iter::empty::<(String, Value)>())
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("middleware", &self.middleware.name())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
