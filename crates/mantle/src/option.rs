//! Options and positional argument specs.
//!
//! An [`Opt`] is a named, typed leaf value. Its destination identifier is the
//! name it is injected under, so `--dry-run` reaches handlers as `dry_run`.
//! Options are registered on a node of the command tree and are visible at
//! that node and every node below it.

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::error::Error;
use crate::naming::{flag_to_identifier, identifier_to_flag};

/// Parses one raw command-line string into a value.
pub type ParseFn = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// How an option or positional argument turns raw strings into values.
#[derive(Clone)]
pub enum ValueKind {
    /// Takes no value; `true` when present.
    Flag,
    /// Takes no value; the number of occurrences.
    Count,
    /// A signed integer.
    Int,
    /// A finite decimal number.
    Float,
    /// The raw string.
    Str,
    /// A caller-supplied parser, with a description used in messages.
    Custom(String, ParseFn),
}

impl ValueKind {
    /// Builds a custom value kind from a parsing closure.
    pub fn custom<F>(desc: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        ValueKind::Custom(desc.into(), Arc::new(f))
    }

    /// Returns true for kinds that consume a value from the command line.
    pub fn takes_value(&self) -> bool {
        !matches!(self, ValueKind::Flag | ValueKind::Count)
    }

    /// Short description of the accepted values.
    pub fn describe(&self) -> &str {
        match self {
            ValueKind::Flag | ValueKind::Count => "flag",
            ValueKind::Int => "integer",
            ValueKind::Float => "decimal",
            ValueKind::Str => "string",
            ValueKind::Custom(desc, _) => desc,
        }
    }

    /// Parses a raw string according to this kind.
    pub fn parse(&self, raw: &str) -> Result<Value, String> {
        match self {
            ValueKind::Flag | ValueKind::Count => Err(format!("{} takes no value", raw)),
            ValueKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected integer value, not {:?}", raw)),
            ValueKind::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected decimal value, not {:?}", raw)),
            ValueKind::Str => Ok(Value::String(raw.to_string())),
            ValueKind::Custom(_, f) => f(raw),
        }
    }

    fn same_as(&self, other: &ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Custom(a, fa), ValueKind::Custom(b, fb)) => a == b && Arc::ptr_eq(fa, fb),
            (ValueKind::Custom(..), _) | (_, ValueKind::Custom(..)) => false,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Debug for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Custom(desc, _) => f.debug_tuple("Custom").field(desc).finish(),
            other => f.write_str(other.describe()),
        }
    }
}

/// A named command-line option.
#[derive(Debug, Clone)]
pub struct Opt {
    dest: String,
    short: Option<char>,
    doc: String,
    kind: ValueKind,
    multi: bool,
    required: bool,
    default: Option<Value>,
    hidden: bool,
    value_name: Option<String>,
}

impl Opt {
    /// Creates a string-valued option from a flag name such as `--name`.
    pub fn new(name: &str) -> Result<Self, Error> {
        Ok(Self {
            dest: flag_to_identifier(name)?,
            short: None,
            doc: String::new(),
            kind: ValueKind::Str,
            multi: false,
            required: false,
            default: None,
            hidden: false,
            value_name: None,
        })
    }

    /// Builds an option from an identifier already known to be valid.
    pub(crate) fn builtin(dest: &str, kind: ValueKind) -> Self {
        Self {
            dest: dest.to_string(),
            short: None,
            doc: String::new(),
            kind,
            multi: false,
            required: false,
            default: None,
            hidden: false,
            value_name: None,
        }
    }

    /// Creates a boolean flag that defaults to `false`.
    pub fn flag(name: &str) -> Result<Self, Error> {
        Ok(Self::new(name)?.parse_as(ValueKind::Flag))
    }

    /// Creates a counting flag (`-vvv` is 3) that defaults to `0`.
    pub fn count(name: &str) -> Result<Self, Error> {
        Ok(Self::new(name)?.parse_as(ValueKind::Count))
    }

    /// Sets the value kind.
    pub fn parse_as(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets a single-character alias.
    pub fn short(mut self, c: char) -> Self {
        self.short = Some(c);
        self
    }

    /// Sets the help text.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Allows the option to repeat; its value becomes an array.
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Makes the option mandatory.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value injected when the option is absent.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Keeps the option out of help listings; it still parses.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Placeholder shown for the value in help (`--file PATH`).
    pub fn value_name(mut self, name: impl Into<String>) -> Self {
        self.value_name = Some(name.into());
        self
    }

    /// The injection name.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// The long flag spelling, e.g. `--dry-run`.
    pub fn flag_name(&self) -> String {
        identifier_to_flag(&self.dest)
    }

    pub fn short_char(&self) -> Option<char> {
        self.short
    }

    pub fn doc_text(&self) -> &str {
        &self.doc
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn get_value_name(&self) -> Option<&str> {
        self.value_name.as_deref()
    }

    /// The value injected when the option does not appear on the command line.
    pub fn missing_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match self.kind {
            ValueKind::Flag => Value::Bool(false),
            ValueKind::Count => Value::from(0),
            _ if self.multi => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Whether two registrations describe the same option.
    pub fn same_as(&self, other: &Opt) -> bool {
        self.dest == other.dest
            && self.short == other.short
            && self.kind.same_as(&other.kind)
            && self.multi == other.multi
            && self.required == other.required
            && self.default == other.default
            && self.hidden == other.hidden
    }
}

/// Describes the positional arguments a command accepts.
#[derive(Debug, Clone)]
pub struct PosArgSpec {
    name: String,
    min_count: usize,
    max_count: Option<usize>,
    kind: ValueKind,
    provides: Option<String>,
}

impl Default for PosArgSpec {
    fn default() -> Self {
        Self {
            name: "arg".to_string(),
            min_count: 0,
            max_count: None,
            kind: ValueKind::Str,
            provides: None,
        }
    }
}

impl PosArgSpec {
    /// Accepts any number of string arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name used in usage lines.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Requires exactly `n` arguments.
    pub fn count(mut self, n: usize) -> Self {
        self.min_count = n;
        self.max_count = Some(n);
        self
    }

    pub fn min_count(mut self, n: usize) -> Self {
        self.min_count = n;
        self
    }

    pub fn max_count(mut self, n: usize) -> Self {
        self.max_count = Some(n);
        self
    }

    /// Sets how each argument is parsed.
    pub fn parse_as(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Also injects the parsed arguments under `name`.
    pub fn provides(mut self, name: impl Into<String>) -> Self {
        self.provides = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_min_count(&self) -> usize {
        self.min_count
    }

    pub fn get_max_count(&self) -> Option<usize> {
        self.max_count
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn get_provides(&self) -> Option<&str> {
        self.provides.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !self.kind.takes_value() {
            return Err(Error::config(format!(
                "positional arguments {:?} must take values",
                self.name
            )));
        }
        if let Some(max) = self.max_count {
            if max == 0 || max < self.min_count {
                return Err(Error::config(format!(
                    "positional arguments {:?}: max_count {} must be at least 1 and not below min_count {}",
                    self.name, max, self.min_count
                )));
            }
        }
        if let Some(name) = &self.provides {
            flag_to_identifier(name)?;
        }
        Ok(())
    }

    /// Checks the number of received arguments against the spec.
    pub(crate) fn check_count(&self, got: usize) -> Result<(), String> {
        if got < self.min_count {
            return Err(format!(
                "expected at least {} {} argument(s), got {}",
                self.min_count,
                self.kind.describe(),
                got
            ));
        }
        if let Some(max) = self.max_count {
            if got > max {
                return Err(format!(
                    "expected at most {} {} argument(s), got {}",
                    max,
                    self.kind.describe(),
                    got
                ));
            }
        }
        Ok(())
    }

    /// The value injected under the `provides` name.
    pub(crate) fn provided_value(&self, values: &[Value]) -> Value {
        match (self.max_count, values) {
            (Some(1), [single]) => single.clone(),
            (Some(1), []) => Value::Null,
            _ => Value::Array(values.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_opt_names() {
        let opt = Opt::flag("--dry-run").unwrap().short('n');
        assert_eq!(opt.dest(), "dry_run");
        assert_eq!(opt.flag_name(), "--dry-run");
        assert_eq!(opt.short_char(), Some('n'));
        assert!(Opt::new("--bad_").is_err());
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(Opt::flag("--x").unwrap().missing_value(), json!(false));
        assert_eq!(Opt::count("--v").unwrap().missing_value(), json!(0));
        assert_eq!(Opt::new("--name").unwrap().missing_value(), Value::Null);
        assert_eq!(Opt::new("--tag").unwrap().multi().missing_value(), json!([]));
        assert_eq!(
            Opt::new("--n")
                .unwrap()
                .parse_as(ValueKind::Int)
                .default_value(3)
                .missing_value(),
            json!(3)
        );
    }

    #[test]
    fn test_value_kind_parse() {
        assert_eq!(ValueKind::Int.parse("42").unwrap(), json!(42));
        assert!(ValueKind::Int.parse("4.2").is_err());
        assert_eq!(ValueKind::Float.parse("1.5").unwrap(), json!(1.5));
        assert!(ValueKind::Float.parse("nan").is_err());
        assert_eq!(ValueKind::Str.parse("x").unwrap(), json!("x"));

        let upper = ValueKind::custom("word", |s| Ok(json!(s.to_uppercase())));
        assert_eq!(upper.parse("hi").unwrap(), json!("HI"));
        assert_eq!(upper.describe(), "word");
    }

    #[test]
    fn test_same_as() {
        let a = Opt::flag("--verbose").unwrap();
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&Opt::count("--verbose").unwrap()));

        let kind = ValueKind::custom("x", |s| Ok(json!(s)));
        let b = Opt::new("--x").unwrap().parse_as(kind.clone());
        let c = Opt::new("--x").unwrap().parse_as(kind);
        assert!(b.same_as(&c));
        let d = Opt::new("--x")
            .unwrap()
            .parse_as(ValueKind::custom("x", |s| Ok(json!(s))));
        assert!(!b.same_as(&d));
    }

    #[test]
    fn test_posargs_counts() {
        let spec = PosArgSpec::new().count(2).parse_as(ValueKind::Int);
        assert!(spec.check_count(2).is_ok());
        assert!(spec.check_count(1).is_err());
        assert!(spec.check_count(3).is_err());
        assert!(PosArgSpec::new().max_count(0).validate().is_err());
        assert!(PosArgSpec::new()
            .parse_as(ValueKind::Flag)
            .validate()
            .is_err());
    }

    #[test]
    fn test_provided_value_shape() {
        let one = PosArgSpec::new().count(1);
        assert_eq!(one.provided_value(&[json!(3)]), json!(3));
        let two = PosArgSpec::new().count(2);
        assert_eq!(two.provided_value(&[json!(1), json!(2)]), json!([1, 2]));
    }
}
