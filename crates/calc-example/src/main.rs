use std::env;
use std::process::ExitCode;

use mantle::Error;

fn main() -> ExitCode {
    calc_example::logger().init();
    if env::var_os("RUST_LOG").is_none() {
        log::set_max_level(calc_example::QUIET_LEVEL);
    }

    let cmd = match calc_example::build() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("calc: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cmd.run_from_env() {
        Ok(_) => ExitCode::SUCCESS,
        // already reported by the command
        Err(e @ Error::CommandLine { .. }) => ExitCode::from(e.exit_code() as u8),
        Err(e) => {
            eprintln!("calc: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
