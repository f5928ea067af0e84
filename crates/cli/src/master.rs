//! The master frontend: `synctool-master` run on the master node.
//!
//! Computes the target nodeset from the include/exclude selectors, then
//! hands the fleet to the dispatcher: rsync the repository to each node and
//! invoke the remote client there, passing every client flag through
//! verbatim.

use std::ffi::OsString;
use std::io::Write;

use clap::{Arg, ArgAction, Command};
use config::{make_nodeset, Config, NodeSelector};
use dispatch::{DispatchError, MasterOptions};
use synclib::ExitCode;

use crate::client::{options_from_matches, render_clap_error, ClientAction, ClientOptions, ParseError};
use crate::{say, sayerr, split_list};

fn clap_command() -> Command {
    crate::client::clap_command("synctool-master")
        .about("synctool-master runs synctool on the nodes of the cluster")
        .arg(
            Arg::new("node")
                .short('n')
                .long("node")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("Execute only on these nodes"),
        )
        .arg(
            Arg::new("group")
                .short('g')
                .long("group")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("Execute only on these groups of nodes"),
        )
        .arg(
            Arg::new("exclude")
                .short('x')
                .long("exclude")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("Exclude these nodes from the selected group"),
        )
        .arg(
            Arg::new("exclude-group")
                .short('X')
                .long("exclude-group")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("Exclude these groups from the selection"),
        )
        .arg(
            Arg::new("skip-rsync")
                .long("skip-rsync")
                .action(ArgAction::SetTrue)
                .help("Do not sync the repository (eg. when it is on a shared filesystem)"),
        )
        .arg(
            Arg::new("filter-ignored")
                .long("filter-ignored")
                .action(ArgAction::SetTrue)
                .help("Do not mention ignored nodes"),
        )
}

/// Rebuild the client flag list carried to every remote invocation.
fn pass_args(options: &ClientOptions) -> Vec<String> {
    let mut args = Vec::new();

    let mut push_files = |flag: &str, args: &mut Vec<String>| {
        for file in &options.files {
            args.push(flag.to_owned());
            args.push(file.clone());
        }
    };

    match options.action {
        ClientAction::Diff => push_files("--diff", &mut args),
        ClientAction::Reference => push_files("--ref", &mut args),
        ClientAction::EraseSaved => {
            args.push("--erase-saved".to_owned());
            push_files("--single", &mut args);
        }
        ClientAction::Tasks => args.push("--tasks".to_owned()),
        ClientAction::Sync => push_files("--single", &mut args),
    }

    if options.fix {
        args.push("--fix".to_owned());
    }
    if options.no_post {
        args.push("--no-post".to_owned());
    }
    if options.fullpath {
        args.push("--fullpath".to_owned());
    }
    if options.terse == Some(true) {
        args.push("--terse".to_owned());
    }
    match options.color {
        Some(true) => args.push("--color".to_owned()),
        Some(false) => args.push("--no-color".to_owned()),
        None => {}
    }
    if options.verbose {
        args.push("--verbose".to_owned());
    }
    if options.quiet {
        args.push("--quiet".to_owned());
    }
    if options.unix {
        args.push("--unix".to_owned());
    }
    args
}

/// Entry point for the `synctool-master` binary. The binary hands in its
/// locked stdio; tests hand in byte buffers.
pub fn run<I, S, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let argv: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let matches = match clap_command().try_get_matches_from(&argv) {
        Ok(matches) => matches,
        Err(err) => return render_clap_error(&err, stdout, stderr),
    };

    let client_options = match options_from_matches(&matches) {
        Ok(options) => options,
        Err(ParseError::Clap(err)) => return render_clap_error(&err, stdout, stderr),
        Err(ParseError::Combination(message)) => {
            sayerr(stderr, &message);
            return ExitCode::Usage;
        }
    };

    let selector = NodeSelector {
        nodes: split_list(&collect(&matches, "node")),
        groups: split_list(&collect(&matches, "group")),
        exclude_nodes: split_list(&collect(&matches, "exclude")),
        exclude_groups: split_list(&collect(&matches, "exclude-group")),
    };

    let config = match Config::read(&client_options.conf) {
        Ok(config) => config,
        Err(err) => {
            sayerr(stderr, &format!("error: {err}"));
            return ExitCode::Config;
        }
    };

    let nodeset = match make_nodeset(&config, &selector) {
        Ok(nodeset) => nodeset,
        Err(err) => {
            sayerr(stderr, &format!("error: {err}"));
            return ExitCode::Usage;
        }
    };

    if !matches.get_flag("filter-ignored") {
        for node in &nodeset.ignored {
            say(stdout, &format!("{node} (ignored)"));
        }
    }
    if nodeset.is_empty() {
        sayerr(stderr, "error: no valid nodes specified");
        return ExitCode::Usage;
    }

    let options = MasterOptions {
        skip_rsync: matches.get_flag("skip-rsync"),
        pass_args: pass_args(&client_options),
    };

    match dispatch::run_on_nodes(&config, &nodeset, &options) {
        Ok(()) => ExitCode::Ok,
        // Unwind silently; the operator pressed Ctrl-C and knows.
        Err(DispatchError::Interrupted) => ExitCode::Interrupted,
        Err(err) => {
            sayerr(stderr, &format!("error: {err}"));
            ExitCode::Config
        }
    }
}

fn collect(matches: &clap::ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(action: ClientAction, files: &[&str]) -> ClientOptions {
        ClientOptions {
            conf: PathBuf::from("/etc/synctool.conf"),
            action,
            files: files.iter().map(|s| (*s).to_owned()).collect(),
            fix: false,
            no_post: false,
            fullpath: false,
            terse: None,
            color: None,
            verbose: false,
            quiet: false,
            unix: false,
            masterlog: false,
            nodename: None,
        }
    }

    #[test]
    fn plain_sync_passes_nothing_through() {
        assert!(pass_args(&options(ClientAction::Sync, &[])).is_empty());
    }

    #[test]
    fn fix_and_verbose_pass_through() {
        let mut opts = options(ClientAction::Sync, &[]);
        opts.fix = true;
        opts.verbose = true;
        assert_eq!(pass_args(&opts), ["--fix", "--verbose"]);
    }

    #[test]
    fn diff_files_pass_through_in_order() {
        let opts = options(ClientAction::Diff, &["/etc/motd", "/etc/hosts"]);
        assert_eq!(
            pass_args(&opts),
            ["--diff", "/etc/motd", "--diff", "/etc/hosts"]
        );
    }

    #[test]
    fn erase_saved_with_singles_passes_both() {
        let opts = options(ClientAction::EraseSaved, &["/etc/motd"]);
        assert_eq!(
            pass_args(&opts),
            ["--erase-saved", "--single", "/etc/motd"]
        );
    }

    #[test]
    fn color_choice_passes_through() {
        let mut opts = options(ClientAction::Sync, &[]);
        opts.color = Some(false);
        assert_eq!(pass_args(&opts), ["--no-color"]);
    }

    #[test]
    fn ignored_selection_is_announced_and_nothing_dispatches() {
        use std::fs;

        let temp = tempfile::TempDir::new().expect("tempdir");
        let master = temp.path().join("var");
        for sub in ["overlay/all", "delete/all"] {
            fs::create_dir_all(master.join(sub)).expect("mkdir");
        }
        let conf = temp.path().join("synctool.conf");
        fs::write(
            &conf,
            format!(
                "masterdir {}\nnode db01 db\nignore_group db\n",
                master.display()
            ),
        )
        .expect("write conf");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run(
            [
                "synctool-master".to_owned(),
                "-c".to_owned(),
                conf.display().to_string(),
                "--node".to_owned(),
                "db01".to_owned(),
            ],
            &mut stdout,
            &mut stderr,
        );

        // The only selected node is ignored: it is announced on stdout and
        // the empty nodeset is a usage error before any rsync/ssh runs.
        assert_eq!(exit, ExitCode::Usage);
        let stdout = String::from_utf8(stdout).expect("utf8 stdout");
        let stderr = String::from_utf8(stderr).expect("utf8 stderr");
        assert!(stdout.contains("db01 (ignored)"));
        assert!(stderr.contains("no valid nodes specified"));
    }
}
