//! Line parser for the synctool.conf dialect.
//!
//! The format is positional key-value: one keyword per line followed by
//! whitespace-separated arguments. `#` starts a comment. The parser collects
//! every problem it sees instead of stopping at the first, so the operator
//! can fix the file in one edit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

/// A `node` definition as written, before group expansion.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawNode {
    pub groups: Vec<String>,
    pub ipaddress: Option<String>,
    pub hostname: Option<String>,
}

/// Everything the config file said, unvalidated.
#[derive(Debug, Default)]
pub(crate) struct RawConfig {
    pub masterdir: Option<PathBuf>,
    pub tempdir: Option<PathBuf>,
    pub groups: BTreeMap<String, Vec<String>>,
    pub nodes: BTreeMap<String, RawNode>,
    pub ignore_groups: BTreeSet<String>,
    pub default_nodeset: Vec<String>,
    pub diff_cmd: Option<String>,
    pub ping_cmd: Option<String>,
    pub ssh_cmd: Option<String>,
    pub scp_cmd: Option<String>,
    pub rsync_cmd: Option<String>,
    pub synctool_cmd: Option<String>,
    pub pkg_cmd: Option<String>,
    pub package_manager: Option<String>,
    pub num_proc: Option<usize>,
    pub sleep_time: Option<u64>,
    pub symlink_mode: Option<u32>,
    pub logfile: Option<PathBuf>,
    pub syslogging: Option<bool>,
    pub terse: Option<bool>,
    pub colorize: Option<bool>,
    pub colorize_bright: Option<bool>,
    pub colorize_full_line: Option<bool>,
    pub terse_colors: HashMap<String, String>,
    pub full_path: Option<bool>,
}

pub(crate) fn parse(text: &str) -> (RawConfig, Vec<String>) {
    let mut raw = RawConfig::default();
    let mut problems = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let lineno = lineno + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let keyword = fields[0];
        let args = &fields[1..];

        let mut problem = |msg: String| problems.push(format!("line {lineno}: {msg}"));

        match keyword {
            "masterdir" => set_path(&mut raw.masterdir, keyword, args, &mut problem),
            "tempdir" => set_path(&mut raw.tempdir, keyword, args, &mut problem),
            "logfile" => set_path(&mut raw.logfile, keyword, args, &mut problem),

            "group" => {
                if args.len() < 2 {
                    problem("'group' requires a name and at least one member".to_owned());
                } else if raw.groups.contains_key(args[0]) {
                    problem(format!("redefinition of group '{}'", args[0]));
                } else if raw.nodes.contains_key(args[0]) {
                    problem(format!("group '{}' collides with a node name", args[0]));
                } else {
                    raw.groups.insert(
                        args[0].to_owned(),
                        args[1..].iter().map(|s| (*s).to_owned()).collect(),
                    );
                }
            }

            "node" => {
                if args.is_empty() {
                    problem("'node' requires a name".to_owned());
                } else if raw.nodes.contains_key(args[0]) {
                    problem(format!("redefinition of node '{}'", args[0]));
                } else if raw.groups.contains_key(args[0]) {
                    problem(format!("node '{}' collides with a group name", args[0]));
                } else {
                    let mut node = RawNode::default();
                    for arg in &args[1..] {
                        if let Some(addr) = arg.strip_prefix("ipaddress:") {
                            node.ipaddress = Some(addr.to_owned());
                        } else if let Some(name) = arg.strip_prefix("hostname:") {
                            node.hostname = Some(name.to_owned());
                        } else {
                            node.groups.push((*arg).to_owned());
                        }
                    }
                    raw.nodes.insert(args[0].to_owned(), node);
                }
            }

            "ignore_group" => {
                if args.is_empty() {
                    problem("'ignore_group' requires at least one group".to_owned());
                }
                raw.ignore_groups.extend(args.iter().map(|s| (*s).to_owned()));
            }

            "default_nodeset" => {
                if args.is_empty() {
                    problem("'default_nodeset' requires at least one node or group".to_owned());
                }
                raw.default_nodeset
                    .extend(args.iter().map(|s| (*s).to_owned()));
            }

            "diff_cmd" => set_cmd(&mut raw.diff_cmd, keyword, args, &mut problem),
            "ping_cmd" => set_cmd(&mut raw.ping_cmd, keyword, args, &mut problem),
            "ssh_cmd" => set_cmd(&mut raw.ssh_cmd, keyword, args, &mut problem),
            "scp_cmd" => set_cmd(&mut raw.scp_cmd, keyword, args, &mut problem),
            "rsync_cmd" => set_cmd(&mut raw.rsync_cmd, keyword, args, &mut problem),
            "synctool_cmd" => set_cmd(&mut raw.synctool_cmd, keyword, args, &mut problem),
            "pkg_cmd" => set_cmd(&mut raw.pkg_cmd, keyword, args, &mut problem),

            "package_manager" => {
                if args.len() == 1 {
                    raw.package_manager = Some(args[0].to_owned());
                } else {
                    problem("'package_manager' takes exactly one name".to_owned());
                }
            }

            "num_proc" => match args.first().and_then(|s| s.parse::<usize>().ok()) {
                Some(n) if n >= 1 => raw.num_proc = Some(n),
                _ => problem("'num_proc' requires a positive number".to_owned()),
            },

            "sleep_time" => match args.first().and_then(|s| s.parse::<u64>().ok()) {
                Some(n) => raw.sleep_time = Some(n),
                None => problem("'sleep_time' requires a number of seconds".to_owned()),
            },

            "symlink_mode" => match args.first().and_then(|s| u32::from_str_radix(s, 8).ok()) {
                Some(mode) => raw.symlink_mode = Some(mode & 0o7777),
                None => problem("'symlink_mode' requires an octal mode".to_owned()),
            },

            "syslogging" => set_bool(&mut raw.syslogging, keyword, args, &mut problem),
            "terse" => set_bool(&mut raw.terse, keyword, args, &mut problem),
            "colorize" => set_bool(&mut raw.colorize, keyword, args, &mut problem),
            "colorize_bright" => set_bool(&mut raw.colorize_bright, keyword, args, &mut problem),
            "colorize_full_line" => {
                set_bool(&mut raw.colorize_full_line, keyword, args, &mut problem);
            }
            "full_path" => set_bool(&mut raw.full_path, keyword, args, &mut problem),

            "terse_colors" => {
                if args.is_empty() {
                    problem("'terse_colors' requires action:color pairs".to_owned());
                }
                for pair in args {
                    match pair.split_once(':') {
                        Some((action, color))
                            if synclib::report::color_code(color).is_some() =>
                        {
                            raw.terse_colors.insert(action.to_owned(), color.to_owned());
                        }
                        Some((_, color)) => {
                            problem(format!("unknown color '{color}' in terse_colors"));
                        }
                        None => {
                            problem(format!("malformed terse_colors entry '{pair}'"));
                        }
                    }
                }
            }

            other => problem(format!("unknown keyword '{other}'")),
        }
    }

    (raw, problems)
}

fn set_path(
    slot: &mut Option<PathBuf>,
    keyword: &str,
    args: &[&str],
    problem: &mut impl FnMut(String),
) {
    if args.len() == 1 {
        *slot = Some(PathBuf::from(args[0]));
    } else {
        problem(format!("'{keyword}' takes exactly one path"));
    }
}

fn set_cmd(
    slot: &mut Option<String>,
    keyword: &str,
    args: &[&str],
    problem: &mut impl FnMut(String),
) {
    if args.is_empty() {
        problem(format!("'{keyword}' requires a command"));
    } else {
        *slot = Some(args.join(" "));
    }
}

fn set_bool(
    slot: &mut Option<bool>,
    keyword: &str,
    args: &[&str],
    problem: &mut impl FnMut(String),
) {
    match args.first().copied() {
        Some("yes" | "on" | "true" | "1") => *slot = Some(true),
        Some("no" | "off" | "false" | "0") => *slot = Some(false),
        _ => problem(format!("'{keyword}' requires yes or no")),
    }
}
