//! Handler types and the injected-value view passed to every layer.
//!
//! A handler is the innermost consumer of a pipeline. It declares the names
//! it needs up front and receives an [`Injected`] holding exactly those
//! names, nothing else:
//!
//! ```rust
//! use mantle::{Handler, Value};
//!
//! let add = Handler::new("add", |inj| {
//!     let nums: Vec<f64> = inj.get_as("posargs_")?;
//!     Ok(Value::from(nums.iter().sum::<f64>()))
//! })
//! .requires(["posargs_"]);
//!
//! assert_eq!(add.required(), ["posargs_"]);
//! ```
//!
//! Declaring needs as data (rather than reading them off function
//! signatures) keeps the dependency graph checkable before anything runs.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::command::Command;
use crate::console::{Console, StdConsole};
use crate::error::Error;
use crate::naming::{ARGS, CMD, COMMAND};
use crate::parser::ParseResult;

/// The result type for handlers and middleware.
///
/// Enables use of the `?` operator for error propagation.
pub type HandlerResult = Result<Value, anyhow::Error>;

/// Type alias for handler functions.
pub type HandlerFn = Rc<dyn Fn(&Injected<'_>) -> HandlerResult>;

/// Named values handed to one layer of a pipeline.
///
/// Only the names the layer declared are present. Builtin objects that are
/// not plain values (the parse result and the command) are reachable through
/// typed accessors when the corresponding builtin name was required.
pub struct Injected<'a> {
    values: BTreeMap<String, Value>,
    parse_result: Option<&'a ParseResult>,
    command: Option<&'a Command>,
    console: &'a dyn Console,
}

impl<'a> Injected<'a> {
    /// Creates a view over plain values, with no builtin objects attached.
    /// The console is the process's stdin and stdout.
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self {
            values,
            parse_result: None,
            command: None,
            console: &StdConsole,
        }
    }

    /// Selects `names` out of a scope.
    pub(crate) fn select(scope: &Scope<'a>, names: &[String]) -> Result<Self, Error> {
        let mut values = BTreeMap::new();
        for name in names {
            match scope.values.get(name) {
                Some(value) => {
                    values.insert(name.clone(), value.clone());
                }
                None => {
                    return Err(Error::config(format!(
                        "value {:?} was not supplied to the pipeline",
                        name
                    )))
                }
            }
        }
        let wants = |n: &str| names.iter().any(|name| name == n);
        Ok(Self {
            values,
            parse_result: wants(ARGS).then_some(scope.parse_result),
            command: (wants(CMD) || wants(COMMAND)).then_some(scope.command),
            console: scope.console,
        })
    }

    /// Gets an injected value.
    pub fn get(&self, name: &str) -> Result<&Value, Error> {
        self.values.get(name).ok_or_else(|| {
            Error::config(format!(
                "value {:?} was not declared as required by this layer",
                name
            ))
        })
    }

    /// Gets an injected value and deserializes it.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, anyhow::Error> {
        let value = self.get(name)?.clone();
        serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("value {:?} has unexpected shape: {}", name, e))
    }

    /// Returns true if `name` was injected.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over the injected names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The raw parse result, when `args_` was required.
    pub fn parse_result(&self) -> Option<&'a ParseResult> {
        self.parse_result
    }

    /// The command object, when `cmd_` or `command_` was required.
    pub fn command(&self) -> Option<&'a Command> {
        self.command
    }

    /// The console of the running command. Always available.
    pub fn console(&self) -> &'a dyn Console {
        self.console
    }
}

impl fmt::Debug for Injected<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injected")
            .field("values", &self.values)
            .field("has_parse_result", &self.parse_result.is_some())
            .field("has_command", &self.command.is_some())
            .finish()
    }
}

/// Everything available while a pipeline runs: builtins, options, extras and
/// whatever enclosing middleware supplied.
#[derive(Clone)]
pub(crate) struct Scope<'a> {
    pub(crate) values: BTreeMap<String, Value>,
    pub(crate) parse_result: &'a ParseResult,
    pub(crate) command: &'a Command,
    pub(crate) console: &'a dyn Console,
}

/// A command's endpoint function plus the names it requires.
#[derive(Clone)]
pub struct Handler {
    name: String,
    requires: Vec<String>,
    func: HandlerFn,
}

impl Handler {
    /// Creates a handler that requires nothing.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Injected<'_>) -> HandlerResult + 'static,
    {
        Self {
            name: name.into(),
            requires: Vec::new(),
            func: Rc::new(f),
        }
    }

    /// Declares the names this handler needs.
    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.requires.contains(&name) {
                self.requires.push(name);
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared names, in declaration order.
    pub fn required(&self) -> &[String] {
        &self.requires
    }

    /// Calls the handler function directly.
    pub fn call(&self, injected: &Injected<'_>) -> HandlerResult {
        (self.func)(injected)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

/// Handler binding state of a command node.
#[derive(Debug, Clone)]
pub enum HandlerSlot {
    /// A handler is bound.
    Bound(Handler),
    /// No handler; resolving this path fails.
    Unbound,
}

impl HandlerSlot {
    pub fn is_bound(&self) -> bool {
        matches!(self, HandlerSlot::Bound(_))
    }

    pub fn handler(&self) -> Option<&Handler> {
        match self {
            HandlerSlot::Bound(h) => Some(h),
            HandlerSlot::Unbound => None,
        }
    }
}
