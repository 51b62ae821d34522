//! In-process test harness for commands built with `mantle`.
//!
//! [`CommandChecker`] runs a [`Command`] the way a shell would, but inside the
//! test process. Environment overrides and the working directory are applied
//! for the duration of the call and restored afterwards. Input is fed to the
//! command's console, its console output and error stream are captured, and
//! the outcome comes back as a [`CheckResult`].
//!
//! Because the environment and working directory are process-wide, tests that
//! use them should be marked [`serial`]:
//!
//! ```rust,ignore
//! use mantle_test::{serial, CommandChecker, RunOptions};
//!
//! #[test]
//! #[serial]
//! fn halve_uses_env() {
//!     let checker = CommandChecker::new(calc::build()?);
//!     let opts = RunOptions::new().input("4").env("CALC_TWO", "-2");
//!     let res = checker.run_with("calc halve", opts)?;
//!     assert_eq!(res.stdout().trim(), "Enter a number: \n-2.0");
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mantle::{BufferConsole, Command, Console, Error, Value};
use thiserror::Error as ThisError;

pub use serial_test::serial;

/// Errors raised by the harness itself, or re-raised from the command.
#[derive(Debug, ThisError)]
pub enum CheckError {
    /// A string argv could not be split with shell quoting rules.
    #[error("could not split command line {line:?}: {source}")]
    Split {
        line: String,
        #[source]
        source: shell_words::ParseError,
    },

    /// The working directory could not be changed or restored.
    #[error("could not change directory to {path:?}: {source}")]
    Chdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A temporary directory could not be created.
    #[error("could not create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    /// An error from the command, re-raised because the checker was
    /// configured with `reraise`.
    #[error(transparent)]
    Command(#[from] Error),
}

/// The argv to run: a list of arguments or a shell-like line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    List(Vec<String>),
    Line(String),
}

impl Args {
    fn into_argv(self) -> Result<Vec<String>, CheckError> {
        match self {
            Args::List(args) => Ok(args),
            Args::Line(line) => {
                shell_words::split(&line).map_err(|source| CheckError::Split { line, source })
            }
        }
    }
}

impl From<&str> for Args {
    fn from(line: &str) -> Self {
        Args::Line(line.to_string())
    }
}

impl From<String> for Args {
    fn from(line: String) -> Self {
        Args::Line(line)
    }
}

impl From<Vec<String>> for Args {
    fn from(args: Vec<String>) -> Self {
        Args::List(args)
    }
}

impl From<Vec<&str>> for Args {
    fn from(args: Vec<&str>) -> Self {
        Args::List(args.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Args {
    fn from(args: &[&str]) -> Self {
        Args::List(args.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Args {
    fn from(args: [&str; N]) -> Self {
        Args::List(args.iter().map(|s| s.to_string()).collect())
    }
}

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    input: Option<String>,
    env: BTreeMap<String, Option<String>>,
    chdir: Option<PathBuf>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text the command reads from its console.
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Sets an environment variable for this run.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    /// Removes an environment variable for this run.
    pub fn unset_env(mut self, key: impl Into<String>) -> Self {
        self.env.insert(key.into(), None);
        self
    }

    /// Runs with `path` as the working directory.
    pub fn chdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.chdir = Some(path.into());
        self
    }
}

/// The captured outcome of one run.
pub struct CheckResult {
    /// The value returned by the handler, if it ran to completion.
    pub value: Option<Value>,
    /// 0 on success, the command-line error code on parse failure, 1 otherwise.
    pub exit_code: i32,
    /// The error, when the run failed and was not re-raised.
    pub error: Option<Error>,
    stdout: String,
    stderr: Option<String>,
}

impl CheckResult {
    /// Everything written to the console, plus the error stream when the
    /// checker mixes it in.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// The captured error stream; `None` when it was mixed into [`stdout`].
    ///
    /// [`stdout`]: CheckResult::stdout
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl fmt::Debug for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(err) => write!(f, "<CheckResult {:?}>", err),
            None => write!(f, "<CheckResult exit_code={}>", self.exit_code),
        }
    }
}

/// Runs a command in-process and captures what it reports.
pub struct CommandChecker {
    cmd: Command,
    env: BTreeMap<String, Option<String>>,
    mix_stderr: Rc<Cell<bool>>,
    reraise: bool,
    console: Rc<BufferConsole>,
    stderr: Rc<RefCell<String>>,
}

impl CommandChecker {
    /// Wraps `cmd`. Its console and `print_error` callback are redirected
    /// into the checker.
    ///
    /// By default errors are re-raised and stderr is kept separate.
    pub fn new(cmd: Command) -> Self {
        let console = Rc::new(BufferConsole::new());
        let stderr = Rc::new(RefCell::new(String::new()));
        let mix_stderr = Rc::new(Cell::new(false));

        let (out, err, mix) = (Rc::clone(&console), Rc::clone(&stderr), Rc::clone(&mix_stderr));
        let cmd = cmd
            .console(Rc::clone(&console))
            .print_error(move |msg| {
                let line = format!("{}\n", msg);
                if mix.get() {
                    let _ = out.write_str(&line);
                } else {
                    err.borrow_mut().push_str(&line);
                }
            });
        Self {
            cmd,
            env: BTreeMap::new(),
            mix_stderr,
            reraise: true,
            console,
            stderr,
        }
    }

    /// Sets an environment variable for every run.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Some(value.into()));
        self
    }

    /// Reports the error stream through [`CheckResult::stdout`] instead of
    /// [`CheckResult::stderr`].
    pub fn mix_stderr(self, mix: bool) -> Self {
        self.mix_stderr.set(mix);
        self
    }

    /// Writes consumed input lines to stdout, as a terminal would show them.
    pub fn echo_stdin(self, echo: bool) -> Self {
        self.console.set_echo_input(echo);
        self
    }

    /// When false, handler and configuration errors are captured in the
    /// result instead of being returned as `Err`.
    pub fn reraise(mut self, reraise: bool) -> Self {
        self.reraise = reraise;
        self
    }

    pub fn command(&self) -> &Command {
        &self.cmd
    }

    /// Runs `args` (program name first).
    pub fn run(&self, args: impl Into<Args>) -> Result<CheckResult, CheckError> {
        self.run_with(args, RunOptions::default())
    }

    /// Runs `args` inside a fresh temporary directory.
    pub fn run_in_temp_dir(&self, args: impl Into<Args>) -> Result<CheckResult, CheckError> {
        let dir = tempfile::tempdir().map_err(CheckError::TempDir)?;
        self.run_with(args, RunOptions::new().chdir(dir.path()))
    }

    /// Runs `args` with per-run overrides.
    pub fn run_with(
        &self,
        args: impl Into<Args>,
        opts: RunOptions,
    ) -> Result<CheckResult, CheckError> {
        let argv = args.into().into_argv()?;

        let mut env_overrides = self.env.clone();
        env_overrides.extend(opts.env);
        let _guard = Isolation::enter(&env_overrides, opts.chdir.as_deref())?;

        self.console.set_input(opts.input.unwrap_or_default());
        self.console.take_output();
        self.stderr.borrow_mut().clear();
        let outcome = self.cmd.run(argv);
        let stdout = self.console.take_output();
        let stderr = std::mem::take(&mut *self.stderr.borrow_mut());

        let (value, exit_code, error) = match outcome {
            Ok(value) => (Some(value), 0, None),
            Err(err @ Error::CommandLine { .. }) => (None, err.exit_code(), Some(err)),
            Err(err) if self.reraise => return Err(CheckError::Command(err)),
            Err(err) => (None, err.exit_code(), Some(err)),
        };

        Ok(CheckResult {
            value,
            exit_code,
            error,
            stdout,
            stderr: (!self.mix_stderr.get()).then_some(stderr),
        })
    }
}

impl fmt::Debug for CommandChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChecker")
            .field("cmd", &self.cmd.name())
            .field("env", &self.env)
            .field("mix_stderr", &self.mix_stderr.get())
            .field("reraise", &self.reraise)
            .finish()
    }
}

/// Applies env and cwd overrides, restoring both on drop.
struct Isolation {
    old_env: Vec<(String, Option<String>)>,
    old_cwd: Option<PathBuf>,
}

impl Isolation {
    fn enter(
        overrides: &BTreeMap<String, Option<String>>,
        chdir: Option<&Path>,
    ) -> Result<Self, CheckError> {
        let mut guard = Isolation {
            old_env: Vec::with_capacity(overrides.len()),
            old_cwd: None,
        };
        for (key, value) in overrides {
            guard.old_env.push((key.clone(), env::var(key).ok()));
            set_or_remove(key, value.as_deref());
        }
        if let Some(path) = chdir {
            let old = env::current_dir().map_err(|source| CheckError::Chdir {
                path: path.to_path_buf(),
                source,
            })?;
            env::set_current_dir(path).map_err(|source| CheckError::Chdir {
                path: path.to_path_buf(),
                source,
            })?;
            guard.old_cwd = Some(old);
        }
        Ok(guard)
    }
}

fn set_or_remove(key: &str, value: Option<&str>) {
    match value {
        Some(value) => env::set_var(key, value),
        None => env::remove_var(key),
    }
}

impl Drop for Isolation {
    fn drop(&mut self) {
        if let Some(cwd) = self.old_cwd.take() {
            let _ = env::set_current_dir(cwd);
        }
        for (key, value) in self.old_env.drain(..).rev() {
            set_or_remove(&key, value.as_deref());
        }
    }
}
