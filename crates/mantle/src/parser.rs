//! Argument parsing on top of clap.
//!
//! The command tree is rendered into a dynamic `clap::Command` hierarchy.
//! Every level carries all options reachable at that level, so an option
//! registered on the root may be given before or after a subcommand name;
//! values given at a deeper level win. Clap's own help flag, help subcommand
//! and version flag are disabled: help is an ordinary option here.

use std::collections::{BTreeMap, BTreeSet};

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, ColorChoice};
use serde::Serialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::naming::{identifier_to_token, POSARGS, POST_POSARGS};
use crate::option::{Opt, PosArgSpec, ValueKind};
use crate::tree::CommandTree;

/// The outcome of parsing one argv.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ParseResult {
    /// The program name (argv[0])
    pub name: String,
    /// The matched subcommand path; empty for the root
    pub subcmds: Vec<String>,
    /// Every option reachable at the matched path, by destination name
    pub flags: BTreeMap<String, Value>,
    /// Leading positional arguments
    pub posargs: Vec<Value>,
    /// Positional arguments after `--`
    pub post_posargs: Vec<Value>,
}

impl ParseResult {
    /// Creates an empty result for a path.
    pub fn new(name: impl Into<String>, subcmds: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subcmds,
            ..Default::default()
        }
    }

    /// Sets an option value.
    pub fn flag(mut self, dest: impl Into<String>, value: impl Into<Value>) -> Self {
        self.flags.insert(dest.into(), value.into());
        self
    }

    /// Sets the leading positional arguments.
    pub fn posargs<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.posargs = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the trailing positional arguments.
    pub fn post_posargs<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.post_posargs = values.into_iter().map(Into::into).collect();
        self
    }
}

fn value_arg(id: &str, kind: &ValueKind) -> Arg {
    let kind = kind.clone();
    Arg::new(id.to_string()).value_parser(move |raw: &str| kind.parse(raw))
}

fn option_arg(opt: &Opt, hide: bool) -> Arg {
    let mut arg = match opt.kind() {
        ValueKind::Flag => Arg::new(opt.dest().to_string()).action(ArgAction::SetTrue),
        ValueKind::Count => Arg::new(opt.dest().to_string()).action(ArgAction::Count),
        kind => {
            let action = if opt.is_multi() {
                ArgAction::Append
            } else {
                ArgAction::Set
            };
            let value_name = opt
                .get_value_name()
                .map(String::from)
                .unwrap_or_else(|| opt.dest().to_uppercase());
            value_arg(opt.dest(), kind)
                .action(action)
                .num_args(1)
                .value_name(value_name)
        }
    };
    arg = arg
        .long(identifier_to_token(opt.dest()))
        .help(opt.doc_text().to_string())
        .hide(hide);
    if let Some(c) = opt.short_char() {
        arg = arg.short(c);
    }
    arg
}

fn positional_arg(id: &str, spec: &PosArgSpec, trailing: bool) -> Arg {
    // minimum counts are enforced after parsing so `--help` works without them
    let arg = value_arg(id, spec.kind())
        .action(ArgAction::Append)
        .value_name(spec.name().to_uppercase())
        .required(false);
    let arg = match spec.get_max_count() {
        Some(max) => arg.num_args(1..=max),
        None => arg.num_args(1..),
    };
    if trailing {
        arg.last(true)
    } else {
        arg
    }
}

/// Builds the clap command for one node, without its children.
fn node_command<F>(tree: &CommandTree, path: &[String], name: String, hide: F) -> clap::Command
where
    F: Fn(&Opt) -> bool,
{
    let mut cmd = clap::Command::new(name)
        .disable_help_flag(true)
        .disable_help_subcommand(true)
        .disable_version_flag(true)
        .color(ColorChoice::Never);

    if let Some(node) = tree.node(path) {
        if !node.doc().is_empty() {
            cmd = cmd.about(node.doc().to_string());
        }
        if let Some(spec) = node.posargs() {
            cmd = cmd.arg(positional_arg(POSARGS, spec, false));
        }
        if let Some(spec) = node.post_posargs() {
            cmd = cmd.arg(positional_arg(POST_POSARGS, spec, true));
        }
    }
    for opt in tree.reachable_options(path) {
        cmd = cmd.arg(option_arg(opt, hide(opt)));
    }
    cmd
}

fn subcommand_name(tree: &CommandTree, path: &[String]) -> (String, Option<String>) {
    let name = tree
        .node(path)
        .map(|n| n.name().to_string())
        .unwrap_or_default();
    let token = identifier_to_token(&name);
    let alias = (token != name).then_some(name);
    (token, alias)
}

fn build_level(tree: &CommandTree, path: &[String], name: String) -> clap::Command {
    let mut cmd = node_command(tree, path, name, Opt::is_hidden);
    for child in tree.children(path) {
        let (token, alias) = subcommand_name(tree, &child);
        let mut sub = build_level(tree, &child, token);
        if let Some(alias) = alias {
            sub = sub.alias(alias);
        }
        cmd = cmd.subcommand(sub);
    }
    cmd
}

/// Builds the full clap command hierarchy used for parsing.
pub(crate) fn build_clap(tree: &CommandTree, bin_name: &str) -> clap::Command {
    build_level(tree, &[], bin_name.to_string()).bin_name(bin_name.to_string())
}

/// Builds a clap command for rendering help at `path`: only options in
/// `visible` (and not hidden) are listed; children appear as bare entries.
pub(crate) fn help_command(
    tree: &CommandTree,
    path: &[String],
    bin_name: &str,
    visible: &BTreeSet<String>,
) -> clap::Command {
    let mut full_name = bin_name.to_string();
    for segment in path {
        full_name.push(' ');
        full_name.push_str(&identifier_to_token(segment));
    }
    let name = match path.last() {
        Some(_) => subcommand_name(tree, path).0,
        None => bin_name.to_string(),
    };
    let mut cmd = node_command(tree, path, name, |opt| {
        opt.is_hidden() || !visible.contains(opt.dest())
    })
    .bin_name(full_name);

    for child in tree.children(path) {
        let (token, _) = subcommand_name(tree, &child);
        let mut sub = clap::Command::new(token);
        if let Some(doc) = tree.node(&child).map(|n| n.doc()).filter(|d| !d.is_empty()) {
            sub = sub.about(doc.to_string());
        }
        cmd = cmd.subcommand(sub);
    }
    cmd
}

fn option_value(matches: &ArgMatches, opt: &Opt) -> Value {
    let id = opt.dest();
    match opt.kind() {
        ValueKind::Flag => Value::Bool(matches.get_flag(id)),
        ValueKind::Count => Value::from(matches.get_count(id)),
        _ if opt.is_multi() => Value::Array(
            matches
                .get_many::<Value>(id)
                .map(|vals| vals.cloned().collect())
                .unwrap_or_default(),
        ),
        _ => matches.get_one::<Value>(id).cloned().unwrap_or(Value::Null),
    }
}

fn positional_values(matches: &ArgMatches, id: &str) -> Vec<Value> {
    matches
        .get_many::<Value>(id)
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default()
}

/// Turns clap matches into a [`ParseResult`], applying defaults and the
/// checks clap is not asked to make (minimum positional counts, required
/// options). Those checks are skipped when `help_dest` is set to true.
pub(crate) fn collect(
    tree: &CommandTree,
    name: &str,
    matches: &ArgMatches,
    help_dest: Option<&str>,
) -> Result<ParseResult, ParseError> {
    let mut levels: Vec<(Vec<String>, &ArgMatches)> = vec![(Vec::new(), matches)];
    let mut current = matches;
    let mut path: Vec<String> = Vec::new();
    while let Some((token, sub)) = current.subcommand() {
        path.push(token.replace('-', "_"));
        levels.push((path.clone(), sub));
        current = sub;
    }

    let mut flags = BTreeMap::new();
    for opt in tree.reachable_options(&path) {
        let mut value = None;
        for (level_path, level) in &levels {
            let defined = tree
                .reachable_options(level_path)
                .iter()
                .any(|o| o.dest() == opt.dest());
            if defined && level.value_source(opt.dest()) == Some(ValueSource::CommandLine) {
                value = Some(option_value(level, opt));
            }
        }
        flags.insert(
            opt.dest().to_string(),
            value.unwrap_or_else(|| opt.missing_value()),
        );
    }

    let node = tree.node(&path);
    let posargs = match node.and_then(|n| n.posargs()) {
        Some(_) => positional_values(current, POSARGS),
        None => Vec::new(),
    };
    let post_posargs = match node.and_then(|n| n.post_posargs()) {
        Some(_) => positional_values(current, POST_POSARGS),
        None => Vec::new(),
    };

    let help_requested = help_dest
        .and_then(|dest| flags.get(dest))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !help_requested {
        if let Some(node) = node {
            if let Some(spec) = node.posargs() {
                spec.check_count(posargs.len())
                    .map_err(|m| ParseError::new(m, path.clone()))?;
            }
            if let Some(spec) = node.post_posargs() {
                spec.check_count(post_posargs.len())
                    .map_err(|m| ParseError::new(m, path.clone()))?;
            }
        }
        for opt in tree.reachable_options(&path) {
            if opt.is_required() && flags.get(opt.dest()).map_or(true, Value::is_null) {
                return Err(ParseError::new(
                    format!("missing required option: {}", opt.flag_name()),
                    path.clone(),
                ));
            }
        }
    }

    Ok(ParseResult {
        name: name.to_string(),
        subcmds: path,
        flags,
        posargs,
        post_posargs,
    })
}

/// Best-effort subcommand path named in `argv`, for error messages.
pub(crate) fn guess_subcmds(tree: &CommandTree, argv: &[String]) -> Vec<String> {
    let mut path: Vec<String> = Vec::new();
    for token in argv.iter().skip(1) {
        if token == "--" {
            break;
        }
        if token.starts_with('-') {
            continue;
        }
        let mut candidate = path.clone();
        candidate.push(token.replace('-', "_"));
        if tree.contains(&candidate) {
            path = candidate;
        } else {
            break;
        }
    }
    path
}

/// Converts a clap error into a one-line [`ParseError`].
pub(crate) fn from_clap_error(err: &clap::Error, subcmds: Vec<String>) -> ParseError {
    let rendered = err.render().to_string();
    let first_line = rendered.lines().next().unwrap_or_default();
    let message = first_line.strip_prefix("error: ").unwrap_or(first_line);
    ParseError::new(message.trim(), subcmds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use serde_json::json;

    fn calc_tree() -> CommandTree {
        let mut tree = CommandTree::new("calc");
        tree.add_option(&[], Opt::flag("--verbose").unwrap().short('v'))
            .unwrap();

        let mut add = CommandTree::new("add_two_ints");
        add.set_root_handler(Handler::new("add", |_| Ok(Value::Null)));
        add.set_posargs(
            &[],
            Some(
                PosArgSpec::new()
                    .count(2)
                    .parse_as(ValueKind::Int)
                    .provides("ints"),
            ),
            false,
        )
        .unwrap();
        add.add_option(&[], Opt::new("--base").unwrap().parse_as(ValueKind::Int).default_value(10))
            .unwrap();
        tree.attach_subtree(&[], add).unwrap();
        tree
    }

    fn parse(tree: &CommandTree, argv: &[&str]) -> Result<ParseResult, ParseError> {
        let argv: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        let matches = build_clap(tree, "calc")
            .try_get_matches_from(&argv)
            .map_err(|e| from_clap_error(&e, guess_subcmds(tree, &argv)))?;
        collect(tree, "calc", &matches, None)
    }

    #[test]
    fn test_parse_subcommand_with_dashes() {
        let tree = calc_tree();
        let res = parse(&tree, &["calc", "add-two-ints", "1", "2"]).unwrap();
        assert_eq!(res.subcmds, vec!["add_two_ints"]);
        assert_eq!(res.posargs, vec![json!(1), json!(2)]);
        assert_eq!(res.flags["verbose"], json!(false));
        assert_eq!(res.flags["base"], json!(10));
    }

    #[test]
    fn test_parse_underscore_alias() {
        let tree = calc_tree();
        let res = parse(&tree, &["calc", "add_two_ints", "1", "2"]).unwrap();
        assert_eq!(res.subcmds, vec!["add_two_ints"]);
    }

    #[test]
    fn test_root_option_given_before_or_after_subcommand() {
        let tree = calc_tree();
        let before = parse(&tree, &["calc", "-v", "add-two-ints", "1", "2"]).unwrap();
        let after = parse(&tree, &["calc", "add-two-ints", "1", "2", "--verbose"]).unwrap();
        assert_eq!(before.flags["verbose"], json!(true));
        assert_eq!(after.flags["verbose"], json!(true));
    }

    #[test]
    fn test_bad_integer_rejected() {
        let tree = calc_tree();
        let err = parse(&tree, &["calc", "add-two-ints", "not", "numbers"]).unwrap_err();
        assert_eq!(err.subcmds, vec!["add_two_ints"]);
        assert!(err.message.contains("expected integer"));
    }

    #[test]
    fn test_positional_counts_enforced() {
        let tree = calc_tree();
        assert!(parse(&tree, &["calc", "add-two-ints", "1", "2", "3"]).is_err());
        let err = parse(&tree, &["calc", "add-two-ints", "1"]).unwrap_err();
        assert!(err.message.contains("at least 2"));
    }

    #[test]
    fn test_unexpected_positional_on_root() {
        let tree = calc_tree();
        let err = parse(&tree, &["calc", "bogus"]).unwrap_err();
        assert!(err.subcmds.is_empty());
        assert!(!err.message.starts_with("error:"));
    }

    #[test]
    fn test_required_option_missing() {
        let mut tree = calc_tree();
        tree.add_option(&[], Opt::new("--token").unwrap().required())
            .unwrap();
        let err = parse(&tree, &["calc"]).unwrap_err();
        assert!(err.message.contains("--token"));
    }

    #[test]
    fn test_trailing_positionals() {
        let mut tree = CommandTree::new("run");
        tree.set_posargs(&[], Some(PosArgSpec::new().max_count(1)), false)
            .unwrap();
        tree.set_posargs(&[], Some(PosArgSpec::new()), true).unwrap();
        let argv = ["run", "script", "--", "-x", "y"];
        let matches = build_clap(&tree, "run").try_get_matches_from(argv).unwrap();
        let res = collect(&tree, "run", &matches, None).unwrap();
        assert_eq!(res.posargs, vec![json!("script")]);
        assert_eq!(res.post_posargs, vec![json!("-x"), json!("y")]);
    }

    #[test]
    fn test_help_command_hides_unconsumed() {
        let tree = calc_tree();
        let visible: BTreeSet<String> = ["base".to_string()].into_iter().collect();
        let mut cmd = help_command(&tree, &["add_two_ints".to_string()], "calc", &visible);
        let help = cmd.render_help().to_string();
        assert!(help.contains("--base"));
        assert!(!help.contains("--verbose"));
    }

    #[test]
    fn test_parse_result_builder() {
        let res = ParseResult::new("calc", vec!["add".into()])
            .flag("verbose", true)
            .posargs([1.5, 2.0]);
        assert_eq!(res.flags["verbose"], json!(true));
        assert_eq!(res.posargs, vec![json!(1.5), json!(2.0)]);
    }
}
