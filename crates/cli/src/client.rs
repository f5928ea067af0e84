//! The client frontend: `synctool` run on a managed node.
//!
//! Does a dry run unless `--fix` is given. Mutually exclusive actions fail
//! fast, before any filesystem work.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use config::{Config, DEFAULT_CONF};
use engine::{EngineError, Session};
use synclib::paths::{strip_terse_path, PrettyPath};
use synclib::{marker, ExitCode, Report, TerseCode};

use crate::{say, sayerr};

/// What one client invocation has been asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    /// Full overlay + delete reconciliation, or single files when named.
    Sync,
    /// Show a diff between destination and chosen source.
    Diff,
    /// Remove `.saved` backups.
    EraseSaved,
    /// Show which source the resolver chooses.
    Reference,
    /// Run the scripts in the tasks tree.
    Tasks,
}

/// Parsed client options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub conf: PathBuf,
    pub action: ClientAction,
    pub files: Vec<String>,
    pub fix: bool,
    pub no_post: bool,
    pub fullpath: bool,
    pub terse: Option<bool>,
    pub color: Option<bool>,
    pub verbose: bool,
    pub quiet: bool,
    pub unix: bool,
    pub masterlog: bool,
    pub nodename: Option<String>,
}

pub(crate) fn clap_command(name: &'static str) -> Command {
    Command::new(name)
        .about("synctool keeps the configuration of this node in sync with the master")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_version_flag(true)
        .arg(
            Arg::new("conf")
                .short('c')
                .long("conf")
                .value_name("FILE")
                .help("Use this config file"),
        )
        .arg(
            Arg::new("diff")
                .short('d')
                .long("diff")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Show diff for file"),
        )
        .arg(
            Arg::new("single")
                .short('1')
                .long("single")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Update a single file"),
        )
        .arg(
            Arg::new("ref")
                .short('r')
                .long("ref")
                .alias("reference")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Show which source file synctool chooses"),
        )
        .arg(
            Arg::new("erase-saved")
                .short('e')
                .long("erase-saved")
                .action(ArgAction::SetTrue)
                .help("Erase *.saved backup files"),
        )
        .arg(
            Arg::new("fix")
                .short('f')
                .long("fix")
                .action(ArgAction::SetTrue)
                .help("Perform updates (otherwise, do dry-run)"),
        )
        .arg(
            Arg::new("tasks")
                .short('t')
                .long("tasks")
                .action(ArgAction::SetTrue)
                .help("Run the scripts in the tasks/ directory"),
        )
        .arg(
            Arg::new("no-post")
                .long("no-post")
                .action(ArgAction::SetTrue)
                .help("Do not run any .post scripts"),
        )
        .arg(
            Arg::new("fullpath")
                .short('F')
                .long("fullpath")
                .action(ArgAction::SetTrue)
                .help("Show full paths instead of shortened ones"),
        )
        .arg(
            Arg::new("terse")
                .short('T')
                .long("terse")
                .action(ArgAction::SetTrue)
                .help("Show terse, shortened paths"),
        )
        .arg(
            Arg::new("color")
                .long("color")
                .action(ArgAction::SetTrue)
                .help("Use colored output (only for terse mode)"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .action(ArgAction::SetTrue)
                .help("Do not color output"),
        )
        .arg(
            Arg::new("unix")
                .long("unix")
                .action(ArgAction::SetTrue)
                .help("Output actions as unix shell commands"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Be verbose"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress informational startup messages"),
        )
        .arg(
            Arg::new("masterlog")
                .long("masterlog")
                .action(ArgAction::SetTrue)
                .hide(true),
        )
        .arg(
            Arg::new("nodename")
                .long("nodename")
                .value_name("NAME")
                .hide(true),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .action(ArgAction::Version)
                .help("Print current version number"),
        )
}

/// Catch dangerous near-misses before option parsing: a stray `f` inside a
/// clustered `-d` or `-r` would otherwise silently mean `--fix`.
pub fn typo_guard(args: &[String]) -> Option<String> {
    for arg in args {
        if arg.starts_with("--") {
            continue;
        }
        if arg.starts_with("-d") && arg.contains('f') {
            return Some("Did you mean '--diff'?".to_owned());
        }
        if arg.starts_with("-r") && arg.contains('f') {
            if arg.matches('e').count() >= 2 {
                return Some("Did you mean '--reference'?".to_owned());
            }
            return Some("Did you mean '--ref'?".to_owned());
        }
    }
    None
}

/// Why client argv did not parse.
#[derive(Debug)]
pub enum ParseError {
    /// Option-level problem, or a help/version request; clap renders it.
    Clap(clap::Error),
    /// The options parsed but the combination makes no sense.
    Combination(String),
}

impl ParseError {
    /// The message a test or caller can match on.
    pub fn message(&self) -> String {
        match self {
            Self::Clap(err) => err.to_string(),
            Self::Combination(msg) => msg.clone(),
        }
    }
}

/// Parse client argv into options.
pub fn parse_args(argv: &[OsString]) -> Result<ClientOptions, ParseError> {
    let matches = clap_command("synctool")
        .try_get_matches_from(argv)
        .map_err(ParseError::Clap)?;
    options_from_matches(&matches)
}

/// Extract client options from parsed matches. The master frontend shares
/// this so its pass-through flags mean exactly what the client's do.
pub(crate) fn options_from_matches(
    matches: &clap::ArgMatches,
) -> Result<ClientOptions, ParseError> {
    let take_files = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .map(|values| values.map(|v| strip_terse_path(v)).collect())
            .unwrap_or_default()
    };

    let diff_files = take_files("diff");
    let single_files = take_files("single");
    let ref_files = take_files("ref");
    let erase_saved = matches.get_flag("erase-saved");
    let tasks = matches.get_flag("tasks");
    let fix = matches.get_flag("fix");

    let combination = |msg: &str| Err(ParseError::Combination(msg.to_owned()));
    if erase_saved && (!diff_files.is_empty() || !ref_files.is_empty()) {
        return combination("option --erase-saved can not be combined with other actions");
    }
    if !diff_files.is_empty() && (!single_files.is_empty() || !ref_files.is_empty() || fix) {
        return combination("option --diff can not be combined with other actions");
    }
    if !ref_files.is_empty() && (!single_files.is_empty() || fix) {
        return combination("option --reference can not be combined with other actions");
    }
    if tasks && (erase_saved || !diff_files.is_empty() || !ref_files.is_empty()) {
        return combination("option --tasks can not be combined with other actions");
    }

    let (action, files) = if !diff_files.is_empty() {
        (ClientAction::Diff, diff_files)
    } else if !ref_files.is_empty() {
        (ClientAction::Reference, ref_files)
    } else if erase_saved {
        (ClientAction::EraseSaved, single_files)
    } else if tasks {
        (ClientAction::Tasks, Vec::new())
    } else {
        (ClientAction::Sync, single_files)
    };

    let color = if matches.get_flag("no-color") {
        Some(false)
    } else if matches.get_flag("color") {
        Some(true)
    } else {
        None
    };

    Ok(ClientOptions {
        conf: matches
            .get_one::<String>("conf")
            .map_or_else(|| PathBuf::from(DEFAULT_CONF), PathBuf::from),
        action,
        files,
        fix,
        no_post: matches.get_flag("no-post"),
        fullpath: matches.get_flag("fullpath"),
        terse: matches.get_flag("terse").then_some(true),
        color,
        verbose: matches.get_flag("verbose"),
        quiet: matches.get_flag("quiet"),
        unix: matches.get_flag("unix"),
        masterlog: matches.get_flag("masterlog"),
        nodename: matches.get_one::<String>("nodename").cloned(),
    })
}

/// Entry point for the `synctool` binary. The binary hands in its locked
/// stdio; tests hand in byte buffers.
pub fn run<I, S, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let argv: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let lossy: Vec<String> = argv
        .iter()
        .skip(1)
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    if let Some(hint) = typo_guard(&lossy) {
        say(stdout, &hint);
        return ExitCode::Usage;
    }

    let options = match parse_args(&argv) {
        Ok(options) => options,
        Err(ParseError::Clap(err)) => return render_clap_error(&err, stdout, stderr),
        Err(ParseError::Combination(message)) => {
            sayerr(stderr, &message);
            return ExitCode::Usage;
        }
    };

    execute(&options, stderr)
}

/// Route a clap error to the right stream: help and version requests travel
/// clap's error path too, and belong on stdout.
pub(crate) fn render_clap_error<Out, Err>(
    err: &clap::Error,
    stdout: &mut Out,
    stderr: &mut Err,
) -> ExitCode
where
    Out: Write,
    Err: Write,
{
    let rendered = err.render();
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
            let _ = write!(stdout, "{rendered}");
            ExitCode::Ok
        }
        _ => {
            let _ = write!(stderr, "{rendered}");
            ExitCode::Usage
        }
    }
}

/// Build the report layer for this run out of config defaults and flags.
fn build_report(config: &Config, options: &ClientOptions) -> Report {
    let mut paths = PrettyPath::new(&config.masterdir, &config.overlay_dir, &config.delete_dir);
    paths.full_path = config.full_path;
    paths.terse = options.terse.unwrap_or(config.terse);
    if options.fullpath {
        paths.full_path = true;
        paths.terse = false;
    } else if options.terse == Some(true) {
        paths.full_path = false;
    }

    let mut report = Report::new(paths);
    report.dry_run = !options.fix || options.action == ClientAction::Diff;
    report.verbose = options.verbose;
    report.quiet = options.quiet;
    report.unix_cmd = options.unix;
    report.no_post = options.no_post;
    report.masterlog = options.masterlog;
    report.syslogging = config.syslogging;
    report.colorize = options.color.unwrap_or(config.colorize);
    report.colorize_bright = config.colorize_bright;
    report.colorize_full_line = config.colorize_full_line;
    report.terse_colors = config.terse_colors.clone();
    report
}

fn execute(options: &ClientOptions, stderr: &mut impl Write) -> ExitCode {
    let config = match Config::read(&options.conf) {
        Ok(config) => config,
        Err(err) => {
            sayerr(stderr, &format!("error: {err}"));
            return ExitCode::Config;
        }
    };

    let hostname = Config::local_hostname();
    let Some(nodename) = options
        .nodename
        .clone()
        .or_else(|| config.detect_nodename(&hostname))
    else {
        sayerr(
            stderr,
            &format!(
                "error: unable to determine my nodename ({hostname}), please check {}",
                config.conf_path.display()
            ),
        );
        return ExitCode::Config;
    };

    if config.is_ignored(&nodename) {
        sayerr(
            stderr,
            &format!(
                "{}: node {nodename} is disabled in the config file",
                config.conf_path.display()
            ),
        );
        return ExitCode::Config;
    }

    let report = build_report(&config, options);
    banner(&report, &config, &nodename, &hostname);

    let mut session = match Session::new(&config, &report, &nodename) {
        Ok(session) => session,
        Err(err) => return exit_for(&err, stderr),
    };

    let mut failed = false;
    match options.action {
        ClientAction::Sync if options.files.is_empty() => {
            session.overlay_files();
            if let Err(err) = session.delete_files() {
                if matches!(err, EngineError::Ambiguous) {
                    return ExitCode::Usage;
                }
                sayerr(stderr, &format!("error: {err}"));
                failed = true;
            }
        }
        ClientAction::Sync => {
            for file in &options.files {
                if let Err(err) = session.single_file(file) {
                    return exit_for(&err, stderr);
                }
            }
        }
        ClientAction::Diff => {
            for file in &options.files {
                if let Err(err) = session.diff_file(file) {
                    return exit_for(&err, stderr);
                }
            }
        }
        ClientAction::Reference => {
            for file in &options.files {
                if let Err(err) = session.reference(file) {
                    return exit_for(&err, stderr);
                }
            }
        }
        ClientAction::EraseSaved if options.files.is_empty() => {
            session.erase_saved_all();
        }
        ClientAction::EraseSaved => {
            for file in &options.files {
                if let Err(err) = session.single_erase_saved(file) {
                    return exit_for(&err, stderr);
                }
            }
        }
        ClientAction::Tasks => {
            if let Err(err) = session.run_tasks() {
                return exit_for(&err, stderr);
            }
        }
    }

    session.run_post_on_directories();
    report.unix_out("# EOB");
    report.log(marker::HEARTBEAT);

    if failed || session.failures() > 0 {
        ExitCode::PartialSync
    } else {
        ExitCode::Ok
    }
}

fn exit_for(err: &EngineError, stderr: &mut impl Write) -> ExitCode {
    match err {
        EngineError::Ambiguous | EngineError::MultipleMatches(_) => ExitCode::Usage,
        EngineError::Config(inner) => {
            sayerr(stderr, &format!("error: {inner}"));
            ExitCode::Config
        }
        other => {
            sayerr(stderr, &format!("error: {other}"));
            ExitCode::PartialSync
        }
    }
}

/// Startup narration: a commented script header in unix-command mode, a
/// short settings dump otherwise.
fn banner(report: &Report, config: &Config, nodename: &str, hostname: &str) {
    if report.unix_cmd {
        report.unix_out("#");
        report.unix_out("# script generated by synctool");
        report.unix_out("#");
        report.unix_out(&format!("# NODENAME={nodename}"));
        report.unix_out(&format!("# HOSTNAME={hostname}"));
        report.unix_out(&format!("# MASTERDIR={}", config.masterdir.display()));
        report.unix_out(&format!("# SYMLINK_MODE=0{:o}", config.symlink_mode));
        report.unix_out("#");
        if !report.dry_run {
            report.unix_out("# NOTE: --fix specified, applying updates");
            report.unix_out("#");
        }
        report.unix_out("");
        return;
    }

    if report.quiet {
        return;
    }
    report.verbose(&format!("my nodename: {nodename}"));
    report.verbose(&format!("my hostname: {hostname}"));
    report.verbose(&format!("masterdir: {}", config.masterdir.display()));
    report.verbose(&format!("symlink_mode: 0{:o}", config.symlink_mode));
    report.verbose("");
    if report.dry_run {
        report.info("DRY RUN, not doing any updates");
        report.terse(TerseCode::DryRun, "not doing any updates");
    } else {
        report.info("--fix specified, applying changes");
        report.terse(TerseCode::Fixing, "applying changes");
    }
    report.verbose("");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<OsString> {
        std::iter::once("synctool")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn defaults_are_a_dry_run_sync() {
        let options = parse_args(&argv(&[])).expect("parse");
        assert_eq!(options.action, ClientAction::Sync);
        assert!(!options.fix);
        assert!(options.files.is_empty());
        assert_eq!(options.conf, PathBuf::from(DEFAULT_CONF));
    }

    #[test]
    fn fix_flag_enables_updates() {
        let options = parse_args(&argv(&["--fix"])).expect("parse");
        assert!(options.fix);
    }

    #[test]
    fn single_files_accumulate() {
        let options =
            parse_args(&argv(&["-1", "/etc/motd", "--single", "/etc/hosts"])).expect("parse");
        assert_eq!(options.action, ClientAction::Sync);
        assert_eq!(options.files, ["/etc/motd", "/etc/hosts"]);
    }

    #[test]
    fn file_arguments_are_normalized() {
        let options = parse_args(&argv(&["-1", "/etc//motd/"])).expect("parse");
        assert_eq!(options.files, ["/etc/motd"]);
        // Terse input keeps its marker.
        let options = parse_args(&argv(&["-1", "//etc/.../motd"])).expect("parse");
        assert_eq!(options.files, ["//etc/.../motd"]);
    }

    #[test]
    fn diff_excludes_fix() {
        let err = parse_args(&argv(&["--diff", "/etc/motd", "--fix"])).expect_err("must fail");
        assert!(err.message().contains("--diff"));
    }

    #[test]
    fn erase_saved_excludes_diff() {
        let err =
            parse_args(&argv(&["--erase-saved", "-d", "/etc/motd"])).expect_err("must fail");
        assert!(err.message().contains("--erase-saved"));
    }

    #[test]
    fn reference_excludes_single() {
        let err =
            parse_args(&argv(&["-r", "/etc/motd", "-1", "/etc/motd"])).expect_err("must fail");
        assert!(err.message().contains("--reference"));
    }

    #[test]
    fn erase_saved_with_single_files_is_allowed() {
        let options =
            parse_args(&argv(&["--erase-saved", "-1", "/etc/motd"])).expect("parse");
        assert_eq!(options.action, ClientAction::EraseSaved);
        assert_eq!(options.files, ["/etc/motd"]);
    }

    #[test]
    fn typo_guard_catches_dash_d_with_f() {
        let hint = typo_guard(&["-df".to_owned()]).expect("hint");
        assert!(hint.contains("--diff"));
    }

    #[test]
    fn typo_guard_catches_ref_variants() {
        assert!(typo_guard(&["-rf".to_owned()])
            .expect("hint")
            .contains("--ref"));
        assert!(typo_guard(&["-refe".to_owned()])
            .is_some());
    }

    #[test]
    fn typo_guard_ignores_long_options() {
        assert!(typo_guard(&["--diff".to_owned()]).is_none());
        assert!(typo_guard(&["--ref".to_owned()]).is_none());
    }

    #[test]
    fn masterlog_and_nodename_are_accepted() {
        let options =
            parse_args(&argv(&["--masterlog", "--nodename", "web01"])).expect("parse");
        assert!(options.masterlog);
        assert_eq!(options.nodename.as_deref(), Some("web01"));
    }

    #[test]
    fn color_flags_override_in_both_directions() {
        assert_eq!(parse_args(&argv(&["--color"])).expect("parse").color, Some(true));
        assert_eq!(
            parse_args(&argv(&["--no-color"])).expect("parse").color,
            Some(false)
        );
        assert_eq!(parse_args(&argv(&[])).expect("parse").color, None);
    }

    fn run_captured(args: &[&str]) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run(argv(args), &mut stdout, &mut stderr);
        (
            exit,
            String::from_utf8(stdout).expect("utf8 stdout"),
            String::from_utf8(stderr).expect("utf8 stderr"),
        )
    }

    #[test]
    fn version_prints_to_stdout() {
        let (exit, stdout, stderr) = run_captured(&["--version"]);
        assert!(exit.is_success());
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
        assert!(stderr.is_empty(), "version must not write to stderr");
    }

    #[test]
    fn typo_hint_prints_to_stdout() {
        let (exit, stdout, _) = run_captured(&["-df", "/etc/motd"]);
        assert_eq!(exit, ExitCode::Usage);
        assert!(stdout.contains("Did you mean '--diff'?"));
    }

    #[test]
    fn combination_error_prints_to_stderr() {
        let (exit, stdout, stderr) = run_captured(&["--diff", "/etc/motd", "--fix"]);
        assert_eq!(exit, ExitCode::Usage);
        assert!(stdout.is_empty());
        assert!(stderr.contains("--diff"));
    }

    #[test]
    fn unknown_option_reports_usage_on_stderr() {
        let (exit, _, stderr) = run_captured(&["--frobnicate"]);
        assert_eq!(exit, ExitCode::Usage);
        assert!(stderr.contains("--frobnicate"));
    }

    #[test]
    fn missing_config_file_reports_its_path() {
        let (exit, _, stderr) = run_captured(&["-c", "/no/such/synctool.conf"]);
        assert_eq!(exit, ExitCode::Config);
        assert!(stderr.contains("/no/such/synctool.conf"));
    }
}
