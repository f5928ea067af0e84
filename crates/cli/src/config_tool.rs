//! The config query frontend: `synctool-config`.
//!
//! Answers questions about the fleet definition without touching any node:
//! which nodes and groups exist, what a node is in, which nodes a group
//! holds, and the settings the other tools will use.

use std::ffi::OsString;
use std::io::Write;

use clap::{Arg, ArgAction, ArgGroup, Command};
use config::{Config, DEFAULT_CONF};
use synclib::ExitCode;

use crate::client::render_clap_error;
use crate::{say, sayerr, split_list};

fn clap_command() -> Command {
    Command::new("synctool-config")
        .about("synctool-config displays the fleet configuration")
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
            Arg::new("list-nodes")
                .short('l')
                .long("list-nodes")
                .action(ArgAction::SetTrue)
                .help("List all configured nodes"),
        )
        .arg(
            Arg::new("list-groups")
                .short('L')
                .long("list-groups")
                .action(ArgAction::SetTrue)
                .help("List all configured groups"),
        )
        .arg(
            Arg::new("node")
                .short('n')
                .long("node")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("List all groups this node is in"),
        )
        .arg(
            Arg::new("group")
                .short('g')
                .long("group")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("List all nodes in this group"),
        )
        .arg(
            Arg::new("ipaddress")
                .short('i')
                .long("ipaddress")
                .action(ArgAction::SetTrue)
                .conflicts_with("hostname")
                .help("List selected nodes by IP address"),
        )
        .arg(
            Arg::new("hostname")
                .short('H')
                .long("hostname")
                .action(ArgAction::SetTrue)
                .help("List selected nodes by hostname"),
        )
        .arg(
            Arg::new("filter-ignored")
                .short('f')
                .long("filter-ignored")
                .action(ArgAction::SetTrue)
                .help("Do not list ignored nodes and groups"),
        )
        .arg(
            Arg::new("command")
                .short('C')
                .long("command")
                .value_name("LIST")
                .action(ArgAction::Append)
                .help("Display setting for command (diff,ping,ssh,scp,rsync,synctool,pkg)"),
        )
        .arg(
            Arg::new("package-manager")
                .short('P')
                .long("package-manager")
                .action(ArgAction::SetTrue)
                .help("Display configured package manager"),
        )
        .arg(
            Arg::new("numproc")
                .short('p')
                .long("numproc")
                .action(ArgAction::SetTrue)
                .help("Display numproc setting"),
        )
        .arg(
            Arg::new("masterdir")
                .short('m')
                .long("masterdir")
                .action(ArgAction::SetTrue)
                .help("Display the masterdir setting"),
        )
        .arg(
            Arg::new("list-dirs")
                .short('d')
                .long("list-dirs")
                .action(ArgAction::SetTrue)
                .help("Display directory settings"),
        )
        .arg(
            Arg::new("logfile")
                .long("logfile")
                .action(ArgAction::SetTrue)
                .help("Display configured logfile"),
        )
        .arg(
            Arg::new("nodename")
                .long("nodename")
                .action(ArgAction::SetTrue)
                .help("Display my nodename"),
        )
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::Version)
                .help("Display synctool version"),
        )
        .group(
            ArgGroup::new("action")
                .args([
                    "list-nodes",
                    "list-groups",
                    "node",
                    "group",
                    "command",
                    "package-manager",
                    "numproc",
                    "masterdir",
                    "list-dirs",
                    "logfile",
                    "nodename",
                ])
                .required(true)
                .multiple(false),
        )
}

/// Entry point for the `synctool-config` binary. The binary hands in its
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

    let conf = matches
        .get_one::<String>("conf")
        .map_or_else(|| DEFAULT_CONF.into(), std::path::PathBuf::from);
    let config = match Config::read(&conf) {
        Ok(config) => config,
        Err(err) => {
            sayerr(stderr, &format!("error: {err}"));
            return ExitCode::Config;
        }
    };

    let by_ip = matches.get_flag("ipaddress");
    let by_hostname = matches.get_flag("hostname");
    let filter_ignored = matches.get_flag("filter-ignored");
    let project = |config: &Config, node: &str| -> String {
        if by_ip {
            config.node_address(node)
        } else if by_hostname {
            config.node_hostname(node)
        } else {
            node.to_owned()
        }
    };

    if matches.get_flag("list-nodes") {
        for node in config.nodes.keys() {
            print_maybe_ignored(
                stdout,
                &project(&config, node),
                config.is_ignored(node),
                filter_ignored,
            );
        }
        return ExitCode::Ok;
    }

    if matches.get_flag("list-groups") {
        for group in config.groups.keys() {
            print_maybe_ignored(
                stdout,
                group,
                config.ignore_groups.contains(group),
                filter_ignored,
            );
        }
        return ExitCode::Ok;
    }

    if let Some(values) = matches.get_many::<String>("node") {
        let nodes: Vec<String> = split_list(&values.cloned().collect::<Vec<_>>());
        let mut groups: Vec<String> = Vec::new();
        for node in &nodes {
            if !config.nodes.contains_key(node) {
                sayerr(stderr, &format!("no such node '{node}' defined"));
                return ExitCode::Usage;
            }
            if by_ip || by_hostname {
                say(stdout, &project(&config, node));
            } else {
                for group in config.get_groups(node) {
                    if !groups.contains(group) {
                        groups.push(group.clone());
                    }
                }
            }
        }
        // Group order is priority order; do not sort.
        for group in groups {
            print_maybe_ignored(
                stdout,
                &group,
                config.ignore_groups.contains(&group),
                filter_ignored,
            );
        }
        return ExitCode::Ok;
    }

    if let Some(values) = matches.get_many::<String>("group") {
        let groups: Vec<String> = split_list(&values.cloned().collect::<Vec<_>>());
        for group in &groups {
            if !config.all_groups.contains(group) {
                sayerr(stderr, &format!("no such group '{group}' defined"));
                return ExitCode::Usage;
            }
        }
        let mut nodes = config.nodes_in_groups(&groups);
        nodes.sort();
        for node in nodes {
            print_maybe_ignored(
                stdout,
                &project(&config, &node),
                config.is_ignored(&node),
                filter_ignored,
            );
        }
        return ExitCode::Ok;
    }

    if let Some(values) = matches.get_many::<String>("command") {
        let names: Vec<String> = split_list(&values.cloned().collect::<Vec<_>>());
        let mut status = ExitCode::Ok;
        for name in names {
            let resolved = match name.as_str() {
                "diff" => config.resolve_command("diff_cmd", config.commands.diff_cmd.as_deref()),
                "ping" => config.resolve_command("ping_cmd", config.commands.ping_cmd.as_deref()),
                "ssh" => config.resolve_command("ssh_cmd", config.commands.ssh_cmd.as_deref()),
                "scp" => config.resolve_command("scp_cmd", config.commands.scp_cmd.as_deref()),
                "rsync" => {
                    config.resolve_command("rsync_cmd", config.commands.rsync_cmd.as_deref())
                }
                "synctool" => config
                    .resolve_command("synctool_cmd", config.commands.synctool_cmd.as_deref()),
                "pkg" => config.resolve_command("pkg_cmd", config.commands.pkg_cmd.as_deref()),
                other => {
                    sayerr(stderr, &format!("no such command '{other}' available in synctool"));
                    status = ExitCode::Usage;
                    continue;
                }
            };
            match resolved {
                Ok(cmd) => say(stdout, &cmd),
                Err(err) => {
                    sayerr(stderr, &format!("error: {err}"));
                    status = ExitCode::Config;
                }
            }
        }
        return status;
    }

    if matches.get_flag("package-manager") {
        say(stdout, config.package_manager.as_deref().unwrap_or("none"));
        return ExitCode::Ok;
    }

    if matches.get_flag("numproc") {
        say(stdout, &config.num_proc.to_string());
        return ExitCode::Ok;
    }

    if matches.get_flag("masterdir") {
        say(stdout, &config.masterdir.display().to_string());
        return ExitCode::Ok;
    }

    if matches.get_flag("list-dirs") {
        say(stdout, &format!("masterdir {}", config.masterdir.display()));
        say(stdout, &format!("tempdir {}", config.temp_dir.display()));
        return ExitCode::Ok;
    }

    if matches.get_flag("logfile") {
        match &config.logfile {
            Some(path) => say(stdout, &path.display().to_string()),
            None => say(stdout, "no logfile configured"),
        }
        return ExitCode::Ok;
    }

    if matches.get_flag("nodename") {
        let hostname = Config::local_hostname();
        match config.detect_nodename(&hostname) {
            Some(nodename) if config.is_ignored(&nodename) => {
                if !filter_ignored {
                    say(stdout, &format!("none ({nodename} ignored)"));
                }
            }
            Some(nodename) => say(stdout, &project(&config, &nodename)),
            None => {
                sayerr(stderr, &format!(
                    "unable to determine my nodename ({hostname}), please check {}",
                    config.conf_path.display()
                ));
                return ExitCode::Usage;
            }
        }
        return ExitCode::Ok;
    }

    // The required ArgGroup guarantees one action matched above.
    ExitCode::Usage
}

fn print_maybe_ignored(out: &mut impl Write, name: &str, ignored: bool, filter_ignored: bool) {
    if ignored {
        if !filter_ignored {
            say(out, &format!("{name} (ignored)"));
        }
    } else {
        say(out, name);
    }
}
