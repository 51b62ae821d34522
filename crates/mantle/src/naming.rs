//! Name validation and command path helpers.

use crate::error::Error;

/// The raw parse result.
pub const ARGS: &str = "args_";
/// The command object.
pub const CMD: &str = "cmd_";
/// The matched subcommand path.
pub const SUBCMDS: &str = "subcmds_";
/// Leading positional arguments.
pub const POSARGS: &str = "posargs_";
/// Trailing positional arguments (after `--`).
pub const POST_POSARGS: &str = "post_posargs_";
/// Mapping of every parsed option.
pub const FLAGS: &str = "flags_";
/// The top-level command object.
pub const COMMAND: &str = "command_";

/// Names every pipeline layer may require without anything providing them.
pub const BUILTIN_NAMES: [&str; 7] = [ARGS, CMD, SUBCMDS, POSARGS, POST_POSARGS, FLAGS, COMMAND];

/// Returns true if `name` is one of the reserved builtin context names.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Converts a command path to a dot-separated string.
///
/// For example, `["db", "migrate"]` becomes `"db.migrate"`.
pub fn path_to_string(path: &[String]) -> String {
    path.join(".")
}

/// Parses a dot-separated command path string into a vector.
///
/// The empty string is the root path.
pub fn string_to_path(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').map(String::from).collect()
    }
}

fn check_identifier_chars(name: &str, what: &str) -> Result<(), Error> {
    if name.ends_with('-') || name.ends_with('_') {
        return Err(Error::config(format!(
            "expected {} without trailing dashes or underscores, not: {:?}",
            what, name
        )));
    }
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !starts_with_letter || !rest_ok {
        return Err(Error::config(format!(
            "valid {} must begin with a letter and consist only of letters, digits, \
             underscores, and dashes, not: {:?}",
            what, name
        )));
    }
    Ok(())
}

fn normalize(name: &str) -> String {
    let stripped = name.trim_start_matches('-');
    let mut ret = stripped.to_string();
    // only single-character names are case-sensitive
    if name.len() - stripped.len() > 1 || stripped.len() > 1 {
        ret = ret.to_lowercase();
    }
    ret.replace('-', "_")
}

/// Validates a subcommand name and returns its canonical (underscored) form.
pub fn process_command_name(name: &str) -> Result<String, Error> {
    if name.is_empty() {
        return Err(Error::config("expected non-empty subcommand name"));
    }
    check_identifier_chars(name, "subcommand name")?;
    Ok(normalize(name))
}

/// Validates a flag name (`--flag-name` or `flag_name`) and returns the
/// destination identifier it injects under.
pub fn flag_to_identifier(flag: &str) -> Result<String, Error> {
    if flag.is_empty() {
        return Err(Error::config("expected non-empty flag name"));
    }
    let bare = flag.strip_prefix("--").unwrap_or(flag);
    check_identifier_chars(bare, "flag name")?;
    Ok(normalize(bare))
}

/// Turns an identifier back into its long flag form (`dry_run` -> `--dry-run`).
pub fn identifier_to_flag(identifier: &str) -> String {
    format!("--{}", identifier_to_token(identifier))
}

/// The command-line spelling of an identifier (`add_two_ints` -> `add-two-ints`).
pub fn identifier_to_token(identifier: &str) -> String {
    identifier.to_lowercase().replace('_', "-")
}
