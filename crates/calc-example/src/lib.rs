//! `calc`: a small calculator assembled from mantle subcommands.
//!
//! ```text
//! calc add 1.1 2.2          # 3.3
//! calc add-two-ints 1 2     # 3
//! calc is-odd 3             # true
//! echo 10 | calc halve      # prompts, then prints 5.0
//! ```
//!
//! A root `--verbose` middleware is attached before any subcommand, so every
//! subcommand inherits it. It lifts the global log level to debug; the
//! binary installs its logger with [`logger`] so those records get through.

use std::env;

use anyhow::bail;
use log::{debug, info, LevelFilter};
use mantle::{Command, Console, Handler, Middleware, Opt, PosArgSpec, Value, ValueKind};

/// Environment variable holding the divisor used by `halve`.
pub const DIVISOR_VAR: &str = "CALC_TWO";

/// Global log level when neither `--verbose` nor `RUST_LOG` asks for more.
pub const QUIET_LEVEL: LevelFilter = LevelFilter::Warn;

/// The logger the `calc` binary installs.
///
/// Its own filter passes debug records (or whatever `RUST_LOG` says), so
/// `log::set_max_level` alone decides what `--verbose` shows.
pub fn logger() -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Debug).parse_default_env();
    builder
}

fn verbosity() -> Result<Middleware, mantle::Error> {
    Ok(Middleware::new("verbosity", |inj, next| {
        if inj.get_as::<bool>("verbose")? {
            log::set_max_level(LevelFilter::Debug);
            let path: Vec<String> = inj.get_as("subcmds_")?;
            info!("running {}", path.join(" "));
        }
        next.proceed()
    })
    .requires(["verbose", "subcmds_"])
    .option(
        Opt::flag("--verbose")?
            .short('v')
            .doc("print what is being run"),
    ))
}

fn add() -> Result<Command, mantle::Error> {
    Command::new("add")
        .doc("add numbers together")
        .handler(
            Handler::new("add", |inj| {
                let nums: Vec<f64> = inj.get_as("posargs_")?;
                let sum: f64 = nums.iter().sum();
                inj.console().println(&format!("{:?}", sum))?;
                Ok(Value::from(sum))
            })
            .requires(["posargs_"]),
        )
        .posargs(
            PosArgSpec::new()
                .display_name("number")
                .min_count(2)
                .parse_as(ValueKind::Float),
        )
}

fn add_two_ints() -> Result<Command, mantle::Error> {
    Command::new("add_two_ints")
        .doc("add exactly two integers")
        .handler(
            Handler::new("add_two_ints", |inj| {
                let ints: Vec<i64> = inj.get_as("ints")?;
                Ok(Value::from(ints.iter().sum::<i64>()))
            })
            .requires(["ints"]),
        )
        .posargs(
            PosArgSpec::new()
                .display_name("int")
                .count(2)
                .parse_as(ValueKind::Int)
                .provides("ints"),
        )
}

fn is_odd() -> Result<Command, mantle::Error> {
    Command::new("is_odd")
        .doc("check whether an integer is odd")
        .handler(
            Handler::new("is_odd", |inj| {
                let target: i64 = inj.get_as("target_int")?;
                Ok(Value::Bool(target % 2 != 0))
            })
            .requires(["target_int"]),
        )
        .posargs(
            PosArgSpec::new()
                .display_name("int")
                .count(1)
                .parse_as(ValueKind::Int)
                .provides("target_int"),
        )
}

fn halve() -> Result<Command, mantle::Error> {
    Ok(Command::new("halve")
        .doc("divide a number read from stdin by $CALC_TWO (default 2)")
        .handler(Handler::new("halve", |inj| {
            let console = inj.console();
            let value: f64 = console.prompt("Enter a number: ")?.trim().parse()?;
            console.println("")?;
            let divisor = match env::var(DIVISOR_VAR) {
                Ok(raw) => raw.parse::<f64>()?,
                Err(_) => 2.0,
            };
            debug!("halving {} by {}", value, divisor);
            if divisor == 0.0 {
                bail!("division by zero");
            }
            let ret = value / divisor;
            console.println(&format!("{:?}", ret))?;
            Ok(Value::from(ret))
        })))
}

/// Builds the `calc` command tree.
pub fn build() -> Result<Command, mantle::Error> {
    let mut cmd = Command::new("calc").doc("a command-line calculator");
    cmd.add_middleware(verbosity()?)?;
    cmd.add_command(add()?)?;
    cmd.add_command(add_two_ints()?)?;
    cmd.add_command(is_odd()?)?;
    cmd.add_command(halve()?)?;
    cmd.prepare()?;
    Ok(cmd)
}
