use std::env;

use log::Log;
use mantle::{Error, Value};
use mantle_test::{serial, CommandChecker, RunOptions};

fn checker() -> CommandChecker {
    CommandChecker::new(calc_example::build().expect("calc builds"))
}

#[test]
fn test_add_floats() {
    let res = checker().run(["calc", "add", "1.1", "2.2"]).unwrap();
    assert!(res.is_success());
    let sum = res.value.as_ref().and_then(Value::as_f64).unwrap();
    assert!((sum - 3.3).abs() < 1e-9);
}

#[test]
fn test_add_prints_sum() {
    let res = checker().run("calc add 1 2").unwrap();
    assert_eq!(res.stdout().trim(), "3.0");
}

#[test]
fn test_add_requires_two_numbers() {
    let res = checker().reraise(false).run("calc add 1").unwrap();
    assert_eq!(res.exit_code, 1);
    assert!(matches!(res.error, Some(Error::CommandLine { .. })));
    assert!(res.stderr().unwrap().starts_with("error: calc add: "));
}

#[test]
fn test_add_two_ints() {
    let res = checker().run("calc add-two-ints 1 2").unwrap();
    assert_eq!(res.value, Some(Value::from(3)));

    let res = checker().run("calc add_two_ints 1 2").unwrap();
    assert_eq!(res.value, Some(Value::from(3)));
}

#[test]
fn test_add_two_ints_rejects_bad_input() {
    let checker = checker();
    for line in [
        "calc add-two-ints not numbers",
        "calc add-two-ints 1 2 3",
        "calc add-two-ints 1",
    ] {
        let res = checker.run(line).unwrap();
        assert_eq!(res.exit_code, 1, "{}", line);
        assert!(res.value.is_none());
    }
}

#[test]
fn test_is_odd() {
    let checker = checker();
    assert_eq!(
        checker.run("calc is-odd 3").unwrap().value,
        Some(Value::Bool(true))
    );
    assert_eq!(
        checker.run("calc is-odd 4").unwrap().value,
        Some(Value::Bool(false))
    );
}

#[test]
fn test_unexpected_positional() {
    let res = checker()
        .reraise(false)
        .run("calc halve nonexistentarg")
        .unwrap();
    assert!(matches!(res.error, Some(Error::CommandLine { .. })));
    let stderr = res.stderr().unwrap();
    assert!(stderr.starts_with("error: calc halve: "), "{}", stderr);
    assert!(stderr.contains("nonexistentarg"), "{}", stderr);
}

#[test]
fn test_mixed_stream() {
    let res = checker()
        .reraise(false)
        .mix_stderr(true)
        .run_in_temp_dir("calc halve nonexistentarg")
        .unwrap();
    assert!(res.stdout().starts_with("error: calc halve: "));
    assert!(res.stderr().is_none());
}

#[test]
#[serial]
fn test_halve_default_divisor() {
    let res = checker()
        .run_with(
            "calc halve",
            RunOptions::new().input("30").unset_env("CALC_TWO"),
        )
        .unwrap();
    assert_eq!(res.value, Some(Value::from(15.0)));
    assert_eq!(res.stdout().trim(), "Enter a number: \n15.0");
}

#[test]
#[serial]
fn test_halve_env_divisor() {
    let res = checker()
        .run_with(
            "calc halve",
            RunOptions::new().input("4").env("CALC_TWO", "-2"),
        )
        .unwrap();
    assert_eq!(res.value, Some(Value::from(-2.0)));
    assert_eq!(res.stdout().trim(), "Enter a number: \n-2.0");
    assert!(res.error.is_none());
}

#[test]
#[serial]
fn test_halve_by_zero_reraises() {
    let err = checker()
        .run_with(
            "calc halve",
            RunOptions::new().input("4").env("CALC_TWO", "0"),
        )
        .unwrap_err();
    assert!(err.to_string().contains("division by zero"));
}

#[test]
#[serial]
fn test_halve_by_zero_captured() {
    let res = checker()
        .reraise(false)
        .echo_stdin(true)
        .run_with(
            "calc halve",
            RunOptions::new().input("4").env("CALC_TWO", "0"),
        )
        .unwrap();
    assert_eq!(res.exit_code, 1);
    assert_eq!(res.stdout(), "Enter a number: 4\n");
    assert!(res.error.as_ref().is_some_and(Error::is_handler_error));
}

#[test]
#[serial]
fn test_verbose_flag_accepted_anywhere() {
    let checker = checker();
    assert!(checker.run("calc -v is-odd 3").unwrap().is_success());
    assert!(checker.run("calc is-odd 3 --verbose").unwrap().is_success());
}

#[test]
fn test_help_lists_only_consumed_options() {
    let cmd = calc_example::build().unwrap();
    let help = cmd.render_help(&["is_odd".to_string()]).unwrap();
    assert!(help.contains("--verbose"));
    assert!(help.contains("--help"));
    assert!(help.contains("--flagfile"));

    let root_help = cmd.render_help(&[]).unwrap();
    assert!(root_help.contains("add-two-ints"));
    assert!(!root_help.contains("--verbose"));
}

#[test]
fn test_halve_rejects_non_numeric_input() {
    let res = checker()
        .reraise(false)
        .run_with("calc halve", RunOptions::new().input("lots"))
        .unwrap();
    assert!(res.error.as_ref().is_some_and(Error::is_handler_error));
}

#[test]
#[serial]
fn test_logger_passes_debug_records() {
    env::remove_var("RUST_LOG");
    let logger = calc_example::logger().build();
    let debug = log::Metadata::builder()
        .level(log::Level::Debug)
        .target("calc_example")
        .build();
    assert!(logger.enabled(&debug));
}

#[test]
#[serial]
fn test_verbose_lifts_log_level() {
    log::set_max_level(calc_example::QUIET_LEVEL);
    checker().run("calc is-odd 3").unwrap();
    assert_eq!(log::max_level(), calc_example::QUIET_LEVEL);

    checker().run("calc -v is-odd 3").unwrap();
    assert_eq!(log::max_level(), log::LevelFilter::Debug);
    log::set_max_level(calc_example::QUIET_LEVEL);
}
