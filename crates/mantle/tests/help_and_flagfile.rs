use std::io::Write;

use mantle::{Command, Handler, HelpHandler, Middleware, Opt, PosArgSpec, Value};
use serde_json::json;
use tempfile::NamedTempFile;

fn p(s: &str) -> Vec<String> {
    mantle::string_to_path(s)
}

/// `app` with a root `--verbose` middleware and two subcommands: `deploy`
/// consumes `--region` and `verbose`; `status` consumes nothing.
fn app() -> Command {
    let mut cmd = Command::new("app").doc("deployment tool");
    cmd.add_middleware(
        Middleware::new("verbosity", |_, next| next.proceed())
            .requires(["verbose"])
            .option(Opt::flag("--verbose").unwrap().doc("say more")),
    )
    .unwrap();
    cmd.add_option(Opt::new("--profile").unwrap().doc("settings profile"))
        .unwrap();

    let mut deploy = Command::new("deploy").doc("ship it").handler(
        Handler::new("deploy", |inj| Ok(inj.get("region")?.clone())).requires(["region"]),
    );
    deploy
        .add_option(Opt::new("--region").unwrap().doc("target region"))
        .unwrap();
    deploy
        .add_option(Opt::new("--secret").unwrap().hidden())
        .unwrap();
    cmd.add_command(deploy).unwrap();

    cmd.add_command(
        Command::new("status")
            .doc("show status")
            .handler(Handler::new("status", |_| Ok(json!("ok")))),
    )
    .unwrap();
    cmd
}

#[test]
fn test_help_scoped_to_consumed_options() {
    let cmd = app();
    let help = cmd.render_help(&p("deploy")).unwrap();
    assert!(help.contains("--region"), "{}", help);
    assert!(help.contains("--verbose"), "{}", help);
    assert!(help.contains("--help"), "{}", help);
    assert!(help.contains("--flagfile"), "{}", help);
    assert!(!help.contains("--profile"), "{}", help);
    assert!(!help.contains("--secret"), "{}", help);
    assert!(help.contains("app deploy"), "{}", help);

    let status = cmd.render_help(&p("status")).unwrap();
    assert!(status.contains("--verbose"));
    assert!(!status.contains("--region"));
}

#[test]
fn test_visible_options_subset_of_deps() {
    let cmd = app();
    for path in [p("deploy"), p("status")] {
        let deps = cmd.dep_names(&path).unwrap();
        for opt in cmd.visible_options(&path).unwrap() {
            assert!(
                deps.contains(opt.dest()) || ["help", "flagfile"].contains(&opt.dest()),
                "{} is visible at {:?} but not consumed",
                opt.dest(),
                path
            );
        }
    }
}

#[test]
fn test_group_help_lists_children() {
    let cmd = app();
    let help = cmd.render_help(&[]).unwrap();
    assert!(help.contains("deploy"));
    assert!(help.contains("ship it"));
    assert!(help.contains("status"));
    assert!(help.contains("--help"));
    assert!(!help.contains("--verbose"));
}

#[test]
fn test_help_flag_on_subcommand() {
    let cmd = app();
    let out = cmd.run(["app", "deploy", "--help"]).unwrap();
    assert!(out.as_str().unwrap().contains("--region"));
}

#[test]
fn test_custom_help_handler() {
    let help = HelpHandler::new()
        .flag(Opt::flag("--usage").unwrap().short('u'))
        .unwrap()
        .handler(
            Handler::new("usage", |inj| {
                let path: Vec<String> = inj.get_as("subcmds_")?;
                Ok(json!(format!("usage for {:?}", path)))
            })
            .requires(["subcmds_"]),
        );
    let mut cmd = Command::new("app").help(help).unwrap();
    cmd.add_command(Command::new("sub").handler(Handler::new("sub", |_| Ok(Value::Null))))
        .unwrap();

    assert_eq!(
        cmd.run(["app", "sub", "-u"]).unwrap(),
        json!("usage for [\"sub\"]")
    );
    assert!(cmd.parse(["app", "--help"]).is_err());
}

#[test]
fn test_help_subcommand_for_nested_path() {
    let mut cmd = Command::new("app")
        .help(HelpHandler::new().subcmd("help"))
        .unwrap();
    let mut db = Command::new("db");
    let mut migrate = Command::new("migrate")
        .handler(Handler::new("migrate", |_| Ok(Value::Null)).requires(["steps"]));
    migrate.add_option(Opt::new("--steps").unwrap()).unwrap();
    db.add_command(migrate).unwrap();
    cmd.add_command(db).unwrap();

    let out = cmd.run(["app", "help", "db", "migrate"]).unwrap();
    let text = out.as_str().unwrap();
    assert!(text.contains("--steps"), "{}", text);
    assert!(text.contains("app db migrate"), "{}", text);
}

#[test]
fn test_dashed_help_subcommand_targets_named_path() {
    let cmd = app()
        .help(HelpHandler::new().subcmd("show-help"))
        .unwrap();
    let out = cmd.run(["app", "show-help", "deploy"]).unwrap();
    let text = out.as_str().unwrap();
    assert!(text.contains("app deploy"), "{}", text);
    assert!(text.contains("--region"), "{}", text);
    assert!(!text.contains("show help for a command"), "{}", text);
}

#[test]
fn test_flagfile_supplies_arguments() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# shared settings").unwrap();
    writeln!(file, "--region 'eu west'").unwrap();

    let cmd = app();
    let path = file.path().to_str().unwrap();
    let out = cmd.run(["app", "deploy", "--flagfile", path]).unwrap();
    assert_eq!(out, json!("eu west"));

    let parsed = cmd.parse(["app", "deploy", "--flagfile", path]).unwrap();
    assert_eq!(parsed.flags["flagfile"], json!([path]));
}

#[test]
fn test_flagfile_errors_are_parse_errors() {
    let cmd = app().print_error(|_| {});
    let err = cmd
        .run(["app", "deploy", "--flagfile", "/no/such/flagfile"])
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().starts_with("error: app: could not read flagfile"));
}

#[test]
fn test_flagfile_can_be_disabled() {
    let cmd = Command::new("app")
        .no_flagfile()
        .handler(Handler::new("h", |inj| Ok(inj.get("posargs_")?.clone())).requires(["posargs_"]))
        .posargs(PosArgSpec::new())
        .unwrap();
    assert!(cmd.parse(["app", "--flagfile", "x"]).is_err());
    assert_eq!(cmd.run(["app", "a"]).unwrap(), json!(["a"]));
}
