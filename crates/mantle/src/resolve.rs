//! Dependency resolution: from a middleware chain and a handler to a
//! runnable [`Pipeline`].
//!
//! The chain is ordered outermost first. Walking it from the outside in, a
//! layer's required name is satisfied when it is
//!
//! 1. a builtin context name (always available),
//! 2. provided by a layer strictly outside it, or
//! 3. in the set of names available for free (parsed option destinations and
//!    positional `provides` names).
//!
//! Names satisfied by (3) form the pipeline's dependency names: exactly the
//! option values the path can consume. Anything else is an
//! [`Error::UnresolvedDependency`].

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, trace};

use crate::error::Error;
use crate::handler::{Handler, HandlerResult, Injected, Scope};
use crate::middleware::{Middleware, Next};
use crate::naming::{is_builtin, path_to_string};

struct Layer {
    middleware: Middleware,
    inject: Vec<String>,
}

/// The resolved, ordered composition of middleware and handler for one path.
pub struct Pipeline {
    path: Vec<String>,
    layers: Vec<Layer>,
    handler: Handler,
    dep_names: BTreeSet<String>,
}

/// Resolves `middlewares` (outermost first) around `handler`.
///
/// `available` holds the names supplied for free at this path. Resolution is
/// pure: the same inputs always produce an equivalent pipeline.
pub fn resolve(
    path: &[String],
    middlewares: &[Middleware],
    handler: &Handler,
    available: &BTreeSet<String>,
) -> Result<Pipeline, Error> {
    let path_str = path_to_string(path);
    let mut provided: BTreeSet<String> = BTreeSet::new();
    let mut dep_names = BTreeSet::new();

    let mut check = |needed: &[String], layer: String, provided: &BTreeSet<String>| {
        for name in needed {
            if is_builtin(name) || provided.contains(name) {
                continue;
            }
            if available.contains(name) {
                dep_names.insert(name.clone());
                continue;
            }
            return Err(Error::UnresolvedDependency {
                name: name.clone(),
                layer,
                path: path_str.clone(),
            });
        }
        Ok(())
    };

    let mut layers = Vec::with_capacity(middlewares.len());
    for mw in middlewares {
        let inject = mw.required();
        check(&inject, format!("middleware '{}'", mw.name()), &provided)?;
        for name in mw.provided() {
            if !provided.insert(name.clone()) {
                return Err(Error::conflict(format!(
                    "{:?} is provided more than once in the middleware chain for {:?}",
                    name, path_str
                )));
            }
        }
        layers.push(Layer {
            middleware: mw.clone(),
            inject,
        });
    }
    check(
        handler.required(),
        format!("handler '{}'", handler.name()),
        &provided,
    )?;

    debug!(
        "resolved pipeline for {:?}: {} middleware, dependencies {:?}",
        path_str,
        layers.len(),
        dep_names
    );

    Ok(Pipeline {
        path: path.to_vec(),
        layers,
        handler: handler.clone(),
        dep_names,
    })
}

impl Pipeline {
    /// The command path this pipeline serves.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Names the pipeline consumes from outside (not builtin, not provided
    /// internally), sorted.
    pub fn dep_names(&self) -> &BTreeSet<String> {
        &self.dep_names
    }

    /// Middleware names, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.middleware.name()).collect()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub(crate) fn invoke<'a>(&'a self, scope: Scope<'a>) -> HandlerResult {
        self.run_from(0, scope)
    }

    pub(crate) fn run_from<'a>(&'a self, index: usize, scope: Scope<'a>) -> HandlerResult {
        match self.layers.get(index) {
            Some(layer) => {
                trace!(
                    "entering middleware '{}' with {:?}",
                    layer.middleware.name(),
                    layer.inject
                );
                let injected = Injected::select(&scope, &layer.inject)?;
                let next = Next::new(self, index + 1, scope, &layer.middleware);
                layer.middleware.call(&injected, next)
            }
            None => {
                trace!(
                    "calling handler '{}' with {:?}",
                    self.handler.name(),
                    self.handler.required()
                );
                let injected = Injected::select(&scope, self.handler.required())?;
                self.handler.call(&injected)
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("path", &self.path)
            .field("middleware", &self.middleware_names())
            .field("handler", &self.handler.name())
            .field("dep_names", &self.dep_names)
            .finish()
    }
}
