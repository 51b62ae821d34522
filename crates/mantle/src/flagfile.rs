//! `--flagfile` expansion.
//!
//! A flagfile holds command-line arguments, one or more per line. Blank lines
//! and lines starting with `#` are skipped; every other line is split with
//! shell quoting rules and spliced into argv where the `--flagfile PATH`
//! pair stood. Flagfiles may name further flagfiles.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::ParseError;

/// Long name of the flagfile option.
pub const FLAGFILE_FLAG: &str = "--flagfile";

/// Destination name the loaded flagfile paths are injected under.
pub const FLAGFILE_DEST: &str = "flagfile";

/// The result of expanding an argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expanded {
    /// argv with every flagfile reference replaced by the file's arguments
    pub argv: Vec<String>,
    /// Paths of the loaded flagfiles, in load order
    pub loaded: Vec<String>,
}

/// Expands every `--flagfile PATH` (or `--flagfile=PATH`) in `argv`.
///
/// The first element is the program name and is kept as is. Arguments after
/// a bare `--` are never expanded.
pub fn expand(argv: &[String]) -> Result<Expanded, ParseError> {
    let mut out = Expanded {
        argv: Vec::with_capacity(argv.len()),
        loaded: Vec::new(),
    };
    let Some((program, rest)) = argv.split_first() else {
        return Ok(out);
    };
    out.argv.push(program.clone());
    let mut stack = Vec::new();
    expand_into(rest, &mut stack, &mut out)?;
    Ok(out)
}

fn expand_into(
    args: &[String],
    stack: &mut Vec<PathBuf>,
    out: &mut Expanded,
) -> Result<(), ParseError> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            out.argv.push(arg.clone());
            out.argv.extend(iter.cloned());
            break;
        }
        let path = if arg == FLAGFILE_FLAG {
            match iter.next() {
                Some(path) => path.clone(),
                None => {
                    return Err(ParseError::new(
                        format!("{} expects a path", FLAGFILE_FLAG),
                        Vec::new(),
                    ))
                }
            }
        } else if let Some(path) = arg.strip_prefix("--flagfile=") {
            path.to_string()
        } else {
            out.argv.push(arg.clone());
            continue;
        };
        load(Path::new(&path), stack, out)?;
    }
    Ok(())
}

fn load(path: &Path, stack: &mut Vec<PathBuf>, out: &mut Expanded) -> Result<(), ParseError> {
    let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if stack.contains(&key) {
        warn!("flagfile cycle detected at {}", path.display());
        return Err(ParseError::new(
            format!("flagfile {} includes itself", path.display()),
            Vec::new(),
        ));
    }

    let content = fs::read_to_string(path).map_err(|e| {
        warn!("could not read flagfile {}: {}", path.display(), e);
        ParseError::new(
            format!("could not read flagfile {}: {}", path.display(), e),
            Vec::new(),
        )
    })?;
    debug!("expanding flagfile {}", path.display());
    out.loaded.push(path.display().to_string());

    let mut args = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts = shell_words::split(line).map_err(|e| {
            ParseError::new(
                format!(
                    "could not parse flagfile {} line {}: {}",
                    path.display(),
                    lineno + 1,
                    e
                ),
                Vec::new(),
            )
        })?;
        args.extend(parts);
    }

    stack.push(key);
    let result = expand_into(&args, stack, out);
    stack.pop();
    result
}
