//! Subcommand trees with dependency-injecting middleware for clap-based CLIs.
//!
//! `mantle` lets a program assemble a tree of named subcommands, each backed
//! by a handler, and wrap them in reusable middleware. Handlers and
//! middleware declare the named values they need; for every subcommand path
//! the library resolves a pipeline that supplies exactly those values from
//! parsed options, builtin context names, and whatever enclosing middleware
//! provide.
//!
//! # Features
//!
//! - **Command tree**: subcommands grafted at any depth, with unbound group nodes
//! - **Middleware**: `requires`/`provides` declarations, short-circuiting, options
//! - **Resolution**: missing dependencies and name conflicts found before anything runs
//! - **Scoped help**: `--help` at a subcommand lists only the options its pipeline consumes
//! - **Clap integration**: argument parsing, typed values, `--flagfile` expansion
//! - **Console**: handler I/O through a swappable [`Console`], so tests can feed input
//!
//! # Attach order
//!
//! Middleware attached to a command is inherited by subcommands added to it
//! *afterwards*. Attaching middleware after a subcommand was added does not
//! reach that subcommand:
//!
//! ```rust
//! use mantle::{Command, Handler, Middleware, Value};
//!
//! let tag = |name: &'static str| {
//!     Middleware::new(name, move |_, next| next.run([(name, Value::Bool(true))]))
//!         .provides([name])
//! };
//!
//! let mut app = Command::new("app");
//! app.add_middleware(tag("early"))?;
//! app.add_command(Command::new("sub").handler(
//!     Handler::new("sub", |inj| Ok(Value::from(inj.contains("early")))).requires(["early"]),
//! ))?;
//! app.add_middleware(tag("late"))?;
//!
//! assert_eq!(app.run(["app", "sub"])?, Value::Bool(true));
//! assert_eq!(app.resolve(&["sub".to_string()])?.middleware_names(), vec!["early"]);
//! # Ok::<(), mantle::Error>(())
//! ```
//!
//! # Builtin names
//!
//! Every layer may require these without anything providing them:
//! `args_`, `cmd_`, `subcmds_`, `posargs_`, `post_posargs_`, `flags_`,
//! `command_`. Option names can never end in `_`, so they never collide.

mod command;
mod console;
mod error;
mod flagfile;
mod handler;
mod help;
mod middleware;
mod naming;
mod option;
mod parser;
mod resolve;
mod tree;

pub use command::{Command, PrintErrorFn};

pub use console::{BufferConsole, Console, StdConsole};

pub use error::{Error, ParseError, CMDLINE_ERROR_CODE};

pub use flagfile::{expand as expand_flagfiles, Expanded, FLAGFILE_DEST, FLAGFILE_FLAG};

pub use handler::{Handler, HandlerFn, HandlerResult, HandlerSlot, Injected};

pub use help::HelpHandler;

pub use middleware::{Middleware, MiddlewareFn, Next};

pub use naming::{
    flag_to_identifier, identifier_to_flag, is_builtin, path_to_string, process_command_name,
    string_to_path, ARGS, BUILTIN_NAMES, CMD, COMMAND, FLAGS, POSARGS, POST_POSARGS, SUBCMDS,
};

pub use option::{Opt, ParseFn, PosArgSpec, ValueKind};

pub use parser::ParseResult;

pub use resolve::{resolve, Pipeline};

pub use tree::{CommandNode, CommandTree};

pub use serde_json::Value;
