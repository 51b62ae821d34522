//! The top-level [`Command`]: a command tree plus parsing and dispatch.
//!
//! A `Command` owns its [`CommandTree`], the help configuration, and a cache
//! of resolved pipelines keyed by path. Every mutation takes `&mut self` and
//! clears the cache, so a cached pipeline always matches the current tree.
//!
//! # Example
//!
//! ```rust
//! use mantle::{Command, Handler, PosArgSpec, ValueKind, Value};
//!
//! let mut calc = Command::new("calc").doc("a tiny calculator");
//! let add = Command::new("add")
//!     .handler(
//!         Handler::new("add", |inj| {
//!             let nums: Vec<f64> = inj.get_as("posargs_")?;
//!             Ok(Value::from(nums.iter().sum::<f64>()))
//!         })
//!         .requires(["posargs_"]),
//!     )
//!     .posargs(PosArgSpec::new().parse_as(ValueKind::Float))?;
//! calc.add_command(add)?;
//!
//! let result = calc.run(["calc", "add", "1.5", "2"])?;
//! assert_eq!(result, Value::from(3.5));
//! # Ok::<(), mantle::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use log::debug;
use serde_json::Value;

use crate::console::{Console, StdConsole};
use crate::error::{Error, ParseError, CMDLINE_ERROR_CODE};
use crate::flagfile::{self, Expanded, FLAGFILE_DEST};
use crate::handler::{Handler, Injected, Scope};
use crate::help::HelpHandler;
use crate::middleware::Middleware;
use crate::naming::{
    is_builtin, path_to_string, string_to_path, ARGS, CMD, COMMAND, FLAGS, POSARGS, POST_POSARGS,
    SUBCMDS,
};
use crate::option::{Opt, PosArgSpec, ValueKind};
use crate::parser::{self, ParseResult};
use crate::resolve::Pipeline;
use crate::tree::CommandTree;

/// Callback used to report command-line errors.
pub type PrintErrorFn = Rc<dyn Fn(&str)>;

fn default_print_error(msg: &str) {
    eprintln!("{}", msg);
}

fn flagfile_option() -> Opt {
    Opt::builtin(FLAGFILE_DEST, ValueKind::Str)
        .multi()
        .value_name("PATH")
        .doc("read additional arguments from a file")
}

/// Parses a dot-separated path, accepting dashed segments.
fn parse_path(path: &str) -> Vec<String> {
    string_to_path(path)
        .into_iter()
        .map(|segment| segment.replace('-', "_"))
        .collect()
}

/// A command, its subcommands, and everything needed to run them.
pub struct Command {
    tree: CommandTree,
    help: HelpHandler,
    flagfile: bool,
    print_error: PrintErrorFn,
    console: Rc<dyn Console>,
    cache: RefCell<HashMap<Vec<String>, Rc<Pipeline>>>,
}

impl Command {
    /// Creates a command with no handler, the default help flag and
    /// `--flagfile` support.
    pub fn new(name: impl Into<String>) -> Self {
        let mut tree = CommandTree::new(name);
        let help = HelpHandler::default();
        if let Some(flag) = help.get_flag() {
            tree.push_root_option(flag.clone());
        }
        tree.push_root_option(flagfile_option());
        Self {
            tree,
            help,
            flagfile: true,
            print_error: Rc::new(default_print_error),
            console: Rc::new(StdConsole),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Sets the description shown in help.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.tree.set_root_doc(doc.into());
        self
    }

    /// Binds (or replaces) the handler of this command's root.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.tree.set_root_handler(handler);
        self.invalidate();
        self
    }

    /// Accepts leading positional arguments.
    pub fn posargs(mut self, spec: PosArgSpec) -> Result<Self, Error> {
        self.tree.set_posargs(&[], Some(spec), false)?;
        self.invalidate();
        Ok(self)
    }

    /// Accepts positional arguments after `--`.
    pub fn post_posargs(mut self, spec: PosArgSpec) -> Result<Self, Error> {
        self.tree.set_posargs(&[], Some(spec), true)?;
        self.invalidate();
        Ok(self)
    }

    /// Replaces the help configuration.
    pub fn help(mut self, help: HelpHandler) -> Result<Self, Error> {
        if let Some(old) = self.help.get_flag() {
            self.tree.remove_option(&[], old.dest());
        }
        if let Some(old) = self.help.subcmd_name() {
            self.tree.remove_subtree(&parse_path(old));
        }
        if let Some(flag) = help.get_flag() {
            self.tree.add_option(&[], flag.clone())?;
        }
        if let Some(name) = help.subcmd_name() {
            let mut node = CommandTree::new(name);
            node.set_root_doc("show help for a command".to_string());
            node.set_root_handler(help.get_handler().clone());
            node.set_posargs(
                &[],
                Some(PosArgSpec::new().display_name("command")),
                false,
            )?;
            self.tree.attach_subtree(&[], node)?;
        }
        self.help = help;
        self.invalidate();
        Ok(self)
    }

    /// Sets the callback used to report command-line errors (default: stderr).
    pub fn print_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.print_error = Rc::new(f);
        self
    }

    /// Sets the console handed to handlers and middleware (default: stdin
    /// and stdout).
    pub fn console<C>(mut self, console: C) -> Self
    where
        C: Console + 'static,
    {
        self.console = Rc::new(console);
        self
    }

    /// Disables `--flagfile` expansion.
    pub fn no_flagfile(mut self) -> Self {
        self.tree.remove_option(&[], FLAGFILE_DEST);
        self.flagfile = false;
        self.invalidate();
        self
    }

    pub fn name(&self) -> &str {
        self.tree.root().name()
    }

    pub fn doc_text(&self) -> &str {
        self.tree.root().doc()
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn help_handler(&self) -> &HelpHandler {
        &self.help
    }

    fn invalidate(&mut self) {
        self.cache.get_mut().clear();
    }

    /// Grafts `sub` as a direct subcommand.
    pub fn add_command(&mut self, sub: Command) -> Result<(), Error> {
        self.attach_subtree("", sub)
    }

    /// Grafts `sub` below the dot-separated `path` (empty for the root).
    ///
    /// The new subcommands inherit the middleware attached at `path` so far;
    /// middleware attached there later does not reach them.
    pub fn attach_subtree(&mut self, path: &str, mut sub: Command) -> Result<(), Error> {
        // help and flagfile handling belong to the top-level command
        if let Some(flag) = sub.help.get_flag() {
            sub.tree.remove_option(&[], flag.dest());
        }
        if let Some(name) = sub.help.subcmd_name() {
            sub.tree.remove_subtree(&parse_path(name));
        }
        if sub.flagfile {
            sub.tree.remove_option(&[], FLAGFILE_DEST);
        }
        let grafted = self.tree.attach_subtree(&parse_path(path), sub.tree)?;
        debug!("added subcommand {:?}", path_to_string(&grafted));
        self.invalidate();
        Ok(())
    }

    /// Attaches middleware to the root command.
    pub fn add_middleware(&mut self, mw: Middleware) -> Result<(), Error> {
        self.attach_middleware("", mw)
    }

    /// Attaches middleware to the command at `path`, outside any middleware
    /// already there. Its options are registered on the same path.
    pub fn attach_middleware(&mut self, path: &str, mw: Middleware) -> Result<(), Error> {
        self.tree.attach_middleware(&parse_path(path), mw)?;
        self.invalidate();
        Ok(())
    }

    /// Registers an option on the root command.
    pub fn add_option(&mut self, opt: Opt) -> Result<(), Error> {
        self.add_option_at("", opt)
    }

    /// Registers an option on the command at `path`.
    pub fn add_option_at(&mut self, path: &str, opt: Opt) -> Result<(), Error> {
        self.tree.add_option(&parse_path(path), opt)?;
        self.invalidate();
        Ok(())
    }

    /// Binds the handler for an existing, unbound path.
    pub fn bind_handler(&mut self, path: &str, handler: Handler) -> Result<(), Error> {
        self.tree.bind_handler(&parse_path(path), handler)?;
        self.invalidate();
        Ok(())
    }

    /// Resolves (or fetches the cached) pipeline for `path`.
    pub fn resolve(&self, path: &[String]) -> Result<Rc<Pipeline>, Error> {
        if let Some(pipeline) = self.cache.borrow().get(path) {
            return Ok(Rc::clone(pipeline));
        }
        let pipeline = Rc::new(self.tree.resolve(path)?);
        self.cache
            .borrow_mut()
            .insert(path.to_vec(), Rc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Option names the pipeline at `path` consumes.
    pub fn dep_names(&self, path: &[String]) -> Result<BTreeSet<String>, Error> {
        Ok(self.resolve(path)?.dep_names().clone())
    }

    fn builtin_option_dests(&self) -> BTreeSet<String> {
        let mut dests = BTreeSet::new();
        if let Some(flag) = self.help.get_flag() {
            dests.insert(flag.dest().to_string());
        }
        if self.flagfile {
            dests.insert(FLAGFILE_DEST.to_string());
        }
        dests
    }

    /// Options that matter at `path`: those its pipeline consumes, plus the
    /// help and flagfile options.
    pub fn visible_options(&self, path: &[String]) -> Result<Vec<&Opt>, Error> {
        let deps = self.dep_names(path)?;
        let builtins = self.builtin_option_dests();
        Ok(self
            .tree
            .reachable_options(path)
            .into_iter()
            .filter(|opt| deps.contains(opt.dest()) || builtins.contains(opt.dest()))
            .collect())
    }

    /// Resolves every bound path, returning the first failure.
    pub fn prepare(&self) -> Result<(), Error> {
        for path in self.tree.paths() {
            let bound = self
                .tree
                .node(path)
                .is_some_and(|node| node.handler().is_bound());
            if bound {
                self.resolve(path)?;
            }
        }
        Ok(())
    }

    /// Renders help text for `path`.
    ///
    /// Only visible, non-hidden options are listed. Unbound group commands
    /// list only the help and flagfile options.
    pub fn render_help(&self, path: &[String]) -> Result<String, Error> {
        let node = self.tree.node(path).ok_or_else(|| {
            Error::config(format!("unknown command path: {:?}", path_to_string(path)))
        })?;
        let mut visible = self.builtin_option_dests();
        if node.handler().is_bound() {
            visible.extend(
                self.visible_options(path)?
                    .into_iter()
                    .map(|opt| opt.dest().to_string()),
            );
        }
        let mut cmd = parser::help_command(&self.tree, path, self.name(), &visible);
        Ok(cmd.render_help().to_string())
    }

    /// Parses `argv` (program name first) against the tree.
    pub fn parse<I, T>(&self, argv: I) -> Result<ParseResult, ParseError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        let expanded = if self.flagfile {
            flagfile::expand(&argv)?
        } else {
            Expanded {
                argv,
                loaded: Vec::new(),
            }
        };

        let matches = parser::build_clap(&self.tree, self.name())
            .try_get_matches_from(&expanded.argv)
            .map_err(|e| {
                parser::from_clap_error(&e, parser::guess_subcmds(&self.tree, &expanded.argv))
            })?;
        let help_dest = self.help.get_flag().map(Opt::dest);
        let mut result = parser::collect(&self.tree, self.name(), &matches, help_dest)?;
        if self.flagfile {
            result
                .flags
                .insert(FLAGFILE_DEST.to_string(), Value::from(expanded.loaded));
        }
        Ok(result)
    }

    /// Runs the pipeline for an already parsed command line.
    ///
    /// `extras` are made available to every layer under their names; parsed
    /// option values take precedence over same-named extras. Errors raised by
    /// handlers and middleware are returned as [`Error::Handler`].
    pub fn dispatch(
        &self,
        parse_result: &ParseResult,
        extras: BTreeMap<String, Value>,
    ) -> Result<Value, Error> {
        if let Some(name) = extras.keys().find(|name| is_builtin(name)) {
            return Err(Error::conflict(format!(
                "extra value {:?} uses a reserved name",
                name
            )));
        }
        let path = &parse_result.subcmds;
        let node = self.tree.node(path).ok_or_else(|| {
            Error::config(format!("unknown command path: {:?}", path_to_string(path)))
        })?;

        let extra_names: Vec<String> = extras.keys().cloned().collect();
        let mut values = extras;
        let args = serde_json::to_value(parse_result)
            .map_err(|e| Error::config(format!("could not serialize parse result: {}", e)))?;
        values.insert(ARGS.to_string(), args);
        values.insert(CMD.to_string(), Value::String(self.name().to_string()));
        values.insert(COMMAND.to_string(), Value::String(self.name().to_string()));
        values.insert(SUBCMDS.to_string(), Value::from(path.clone()));
        values.insert(
            POSARGS.to_string(),
            Value::Array(parse_result.posargs.clone()),
        );
        values.insert(
            POST_POSARGS.to_string(),
            Value::Array(parse_result.post_posargs.clone()),
        );
        values.insert(
            FLAGS.to_string(),
            Value::Object(parse_result.flags.clone().into_iter().collect()),
        );
        values.extend(parse_result.flags.clone());
        for (spec, given) in [
            (node.posargs(), &parse_result.posargs),
            (node.post_posargs(), &parse_result.post_posargs),
        ] {
            if let Some((spec, name)) = spec.and_then(|s| s.get_provides().map(|n| (s, n))) {
                values.insert(name.to_string(), spec.provided_value(given));
            }
        }

        let scope = Scope {
            values,
            parse_result,
            command: self,
            console: self.console.as_ref(),
        };

        let help_requested = self
            .help
            .get_flag()
            .and_then(|flag| parse_result.flags.get(flag.dest()))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if help_requested {
            debug!("help requested for {:?}", path_to_string(path));
            let handler = self.help.get_handler();
            let injected = Injected::select(&scope, handler.required())?;
            return handler.call(&injected).map_err(Error::from);
        }

        // extras that are not options widen what the pipeline may require
        let available = self.tree.available_names(path);
        let unknown_extras: BTreeSet<String> = extra_names
            .into_iter()
            .filter(|name| !available.contains(name))
            .collect();
        let pipeline = if unknown_extras.is_empty() {
            self.resolve(path)?
        } else {
            Rc::new(self.tree.resolve_with(path, &unknown_extras)?)
        };
        debug!(
            "dispatching {:?} through {:?}",
            path_to_string(path),
            pipeline.middleware_names()
        );
        pipeline.invoke(scope).map_err(Error::from)
    }

    /// Parses `argv` and dispatches it.
    ///
    /// A parse failure is reported through the `print_error` callback as
    /// `error: <name> <subcommands>: <message>` and returned as
    /// [`Error::CommandLine`]; no pipeline runs.
    pub fn run<I, T>(&self, argv: I) -> Result<Value, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.run_with(argv, BTreeMap::new())
    }

    /// Like [`Command::run`], with caller-supplied extra values.
    pub fn run_with<I, T>(&self, argv: I, extras: BTreeMap<String, Value>) -> Result<Value, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let parse_result = match self.parse(argv) {
            Ok(result) => result,
            Err(err) => {
                let mut msg = format!("error: {}", self.name());
                if !err.subcmds.is_empty() {
                    msg.push(' ');
                    msg.push_str(&err.subcmds.join(" "));
                }
                if !err.message.is_empty() {
                    msg.push_str(": ");
                    msg.push_str(&err.message);
                }
                (self.print_error)(&msg);
                return Err(Error::CommandLine {
                    message: msg,
                    code: CMDLINE_ERROR_CODE,
                });
            }
        };
        self.dispatch(&parse_result, extras)
    }

    /// Runs with the process arguments.
    pub fn run_from_env(&self) -> Result<Value, Error> {
        self.run(std::env::args())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name())
            .field("paths", &self.tree.paths().count())
            .field("help", &self.help)
            .field("flagfile", &self.flagfile)
            .field("cached", &self.cache.borrow().len())
            .finish_non_exhaustive()
    }
}
