//! The help handler: what `--help` (and optionally a `help` subcommand) runs.
//!
//! When the help flag parses as true, dispatch runs the help handler in place
//! of the path's pipeline. The handler is an ordinary [`Handler`] with its own
//! declared requirements; the default one renders help for the matched path,
//! writes it to the command's console, and returns the text.

use serde_json::Value;

use crate::console::Console;
use crate::error::Error;
use crate::handler::Handler;
use crate::naming::{process_command_name, CMD, POSARGS, SUBCMDS};
use crate::option::{Opt, ValueKind};

/// Configures the help entry points of a command.
#[derive(Debug, Clone)]
pub struct HelpHandler {
    flag: Option<Opt>,
    subcmd: Option<String>,
    handler: Handler,
}

impl Default for HelpHandler {
    fn default() -> Self {
        Self {
            flag: Some(default_flag()),
            subcmd: None,
            handler: default_handler(),
        }
    }
}

fn default_flag() -> Opt {
    Opt::builtin("help", ValueKind::Flag)
        .short('h')
        .doc("show this help message and exit")
}

fn default_handler() -> Handler {
    Handler::new("help", |inj| {
        let cmd = inj
            .command()
            .ok_or_else(|| Error::config("help handler requires the command object"))?;
        let mut path: Vec<String> = inj.get_as(SUBCMDS)?;
        let help_path = cmd
            .help_handler()
            .subcmd_name()
            .and_then(|name| process_command_name(name).ok());
        if path.len() == 1 && help_path.as_deref() == Some(path[0].as_str()) {
            // `prog help sub cmd` shows help for `prog sub cmd`
            let targets: Vec<String> = inj.get_as(POSARGS)?;
            path = targets.iter().map(|t| t.replace('-', "_")).collect();
        }
        let text = cmd.render_help(&path)?;
        inj.console().write_str(&text)?;
        Ok(Value::String(text))
    })
    .requires([CMD, SUBCMDS, POSARGS])
}

impl HelpHandler {
    /// The default: a `--help`/`-h` flag and no help subcommand.
    pub fn new() -> Self {
        Self::default()
    }

    /// No help flag and no help subcommand.
    pub fn disabled() -> Self {
        Self {
            flag: None,
            subcmd: None,
            handler: default_handler(),
        }
    }

    /// Replaces the help flag. It must be a boolean flag.
    pub fn flag(mut self, opt: Opt) -> Result<Self, Error> {
        if opt.kind().takes_value() {
            return Err(Error::config(format!(
                "help flag {} must not take a value",
                opt.flag_name()
            )));
        }
        self.flag = Some(opt);
        Ok(self)
    }

    /// Removes the help flag.
    pub fn no_flag(mut self) -> Self {
        self.flag = None;
        self
    }

    /// Adds a help subcommand, e.g. `help` for `prog help sub`.
    pub fn subcmd(mut self, name: impl Into<String>) -> Self {
        self.subcmd = Some(name.into());
        self
    }

    /// Replaces the function run when help is requested.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = handler;
        self
    }

    pub fn get_flag(&self) -> Option<&Opt> {
        self.flag.as_ref()
    }

    pub fn subcmd_name(&self) -> Option<&str> {
        self.subcmd.as_deref()
    }

    pub fn get_handler(&self) -> &Handler {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_flag_only() {
        let help = HelpHandler::default();
        let flag = help.get_flag().unwrap();
        assert_eq!(flag.dest(), "help");
        assert_eq!(flag.short_char(), Some('h'));
        assert!(help.subcmd_name().is_none());
        assert_eq!(help.get_handler().required(), [CMD, SUBCMDS, POSARGS]);
    }

    #[test]
    fn test_disabled() {
        let help = HelpHandler::disabled();
        assert!(help.get_flag().is_none());
        assert!(help.subcmd_name().is_none());
    }

    #[test]
    fn test_valued_flag_rejected() {
        let err = HelpHandler::new()
            .flag(Opt::new("--usage").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_custom_flag_and_subcmd() {
        let help = HelpHandler::new()
            .flag(Opt::flag("--usage").unwrap())
            .unwrap()
            .subcmd("help");
        assert_eq!(help.get_flag().map(Opt::dest), Some("usage"));
        assert_eq!(help.subcmd_name(), Some("help"));
    }
}
