//! synctool.conf and the fleet model it describes.
//!
//! Configuration is read once at startup, validated in full, and from then on
//! treated as read-only: the walker, the sync engine and the dispatcher all
//! borrow the same [`Config`]. A bad config is fatal before any pass starts;
//! every problem found is reported together with the offending file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use synclib::command::search_path;

mod error;
mod nodeset;
mod parser;

pub use error::{ConfigError, ConfigResult};
pub use nodeset::{make_nodeset, NodeSelector, NodeSet, NodeTarget};

use parser::RawConfig;

pub const DEFAULT_CONF: &str = "/var/lib/synctool/synctool.conf";
const DEFAULT_MASTERDIR: &str = "/var/lib/synctool";
const DEFAULT_TEMPDIR: &str = "/tmp/synctool";
const DEFAULT_NUM_PROC: usize = 16;
const DEFAULT_SYMLINK_MODE: u32 = 0o755;

/// One managed host.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Effective ordered group list: nodename first, `all` last, compound
    /// groups expanded in place.
    pub groups: Vec<String>,
    pub ipaddress: Option<String>,
    pub hostname: Option<String>,
}

/// The configured external commands, as written (not yet resolved).
#[derive(Debug, Clone, Default)]
pub struct Commands {
    pub diff_cmd: Option<String>,
    pub ping_cmd: Option<String>,
    pub ssh_cmd: Option<String>,
    pub scp_cmd: Option<String>,
    pub rsync_cmd: Option<String>,
    pub synctool_cmd: Option<String>,
    pub pkg_cmd: Option<String>,
}

/// Validated, read-only view of synctool.conf.
#[derive(Debug, Clone)]
pub struct Config {
    pub conf_path: PathBuf,
    pub masterdir: PathBuf,
    pub overlay_dir: PathBuf,
    pub delete_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub nodes: BTreeMap<String, Node>,
    /// Compound group definitions, name → members.
    pub groups: BTreeMap<String, Vec<String>>,
    /// The closed group universe: every group name plus every nodename.
    pub all_groups: BTreeSet<String>,
    /// Groups whose members are excluded from dispatch. Always holds `none`.
    pub ignore_groups: BTreeSet<String>,
    /// Nodes whose written group list intersects the ignore set.
    pub ignored_nodes: BTreeSet<String>,
    /// Nodes targeted when no selection is given on the master.
    pub default_nodeset: Vec<String>,
    pub commands: Commands,
    pub package_manager: Option<String>,
    pub num_proc: usize,
    pub sleep_time: u64,
    pub symlink_mode: u32,
    pub logfile: Option<PathBuf>,
    pub syslogging: bool,
    pub terse: bool,
    pub colorize: bool,
    pub colorize_bright: bool,
    pub colorize_full_line: bool,
    pub terse_colors: HashMap<String, String>,
    pub full_path: bool,
}

impl Config {
    /// Read and validate a config file.
    pub fn read(conf_path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(conf_path).map_err(|source| ConfigError::Io {
            file: conf_path.to_path_buf(),
            source,
        })?;

        let (raw, mut problems) = parser::parse(&text);
        let config = Self::build(conf_path, raw, &mut problems);

        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid {
                file: conf_path.to_path_buf(),
                problems,
            })
        }
    }

    fn build(conf_path: &Path, raw: RawConfig, problems: &mut Vec<String>) -> Self {
        let masterdir = raw
            .masterdir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MASTERDIR));
        let overlay_dir = masterdir.join("overlay");
        let delete_dir = masterdir.join("delete");
        let tasks_dir = masterdir.join("tasks");

        for dir in [
            &masterdir,
            &overlay_dir,
            &overlay_dir.join("all"),
            &delete_dir,
            &delete_dir.join("all"),
        ] {
            if !dir.is_dir() {
                problems.push(format!("no such directory: {}", dir.display()));
            }
        }

        // The implicit groups exist even when the file never mentions them.
        let mut groups = raw.groups;
        groups.entry("all".to_owned()).or_default();
        groups.entry("none".to_owned()).or_default();

        let mut ignore_groups = raw.ignore_groups;
        ignore_groups.insert("none".to_owned());

        let mut all_groups: BTreeSet<String> = groups.keys().cloned().collect();
        all_groups.extend(raw.nodes.keys().cloned());

        // Expand each node's group list: nodename first, compound groups
        // spliced in place, `all` last, ignored groups dropped. Whether a
        // node is ignored is decided against the written definition, before
        // the drop.
        let mut nodes = BTreeMap::new();
        let mut ignored_nodes = BTreeSet::new();
        for (name, raw_node) in &raw.nodes {
            let mut effective = vec![name.clone()];
            for group in &raw_node.groups {
                let mut seen = Vec::new();
                expand_group(group, &groups, &mut effective, &mut seen, problems);
            }
            if effective.iter().any(|g| ignore_groups.contains(g)) {
                ignored_nodes.insert(name.clone());
            }
            effective.retain(|g| g == name || !ignore_groups.contains(g));
            effective.push("all".to_owned());

            nodes.insert(
                name.clone(),
                Node {
                    groups: effective,
                    ipaddress: raw_node.ipaddress.clone(),
                    hostname: raw_node.hostname.clone(),
                },
            );
        }

        for group in &ignore_groups {
            if group != "none" && !all_groups.contains(group) {
                problems.push(format!("ignore_group: unknown group '{group}'"));
            }
        }

        let mut config = Self {
            conf_path: conf_path.to_path_buf(),
            masterdir,
            overlay_dir,
            delete_dir,
            tasks_dir,
            temp_dir: raw.tempdir.unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPDIR)),
            nodes,
            groups,
            all_groups,
            ignore_groups,
            ignored_nodes,
            default_nodeset: Vec::new(),
            commands: Commands {
                diff_cmd: raw.diff_cmd,
                ping_cmd: raw.ping_cmd,
                ssh_cmd: raw.ssh_cmd,
                scp_cmd: raw.scp_cmd,
                rsync_cmd: raw.rsync_cmd,
                synctool_cmd: raw.synctool_cmd,
                pkg_cmd: raw.pkg_cmd,
            },
            package_manager: raw.package_manager,
            num_proc: raw.num_proc.unwrap_or(DEFAULT_NUM_PROC),
            sleep_time: raw.sleep_time.unwrap_or(0),
            symlink_mode: raw.symlink_mode.unwrap_or(DEFAULT_SYMLINK_MODE),
            logfile: raw.logfile,
            syslogging: raw.syslogging.unwrap_or(false),
            terse: raw.terse.unwrap_or(false),
            colorize: raw.colorize.unwrap_or(true),
            colorize_bright: raw.colorize_bright.unwrap_or(false),
            colorize_full_line: raw.colorize_full_line.unwrap_or(false),
            terse_colors: {
                let mut colors = synclib::report::default_terse_colors();
                colors.extend(raw.terse_colors);
                colors
            },
            full_path: raw.full_path.unwrap_or(false),
        };

        config.default_nodeset = config.resolve_default_nodeset(&raw.default_nodeset, problems);
        config
    }

    /// Resolve the configured default nodeset to node names. `none` resets
    /// the accumulated selection; ignored nodes may still be present and are
    /// filtered at dispatch time.
    fn resolve_default_nodeset(
        &self,
        selection: &[String],
        problems: &mut Vec<String>,
    ) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for entry in selection {
            if entry == "none" {
                groups.clear();
                continue;
            }
            if !self.all_groups.contains(entry) {
                problems.push(format!(
                    "unknown node or group '{entry}' in default_nodeset"
                ));
                continue;
            }
            if !groups.contains(entry) {
                groups.push(entry.clone());
            }
        }
        self.nodes_in_groups(&groups)
    }

    /// Ordered group list of a node, empty for an unknown node.
    pub fn get_groups(&self, nodename: &str) -> &[String] {
        self.nodes
            .get(nodename)
            .map_or(&[], |node| node.groups.as_slice())
    }

    /// Nodes that belong to any of `groups` (a nodename counts as a group).
    pub fn nodes_in_groups(&self, groups: &[String]) -> Vec<String> {
        let mut result = Vec::new();
        for group in groups {
            for (name, node) in &self.nodes {
                if node.groups.iter().any(|g| g == group) && !result.contains(name) {
                    result.push(name.clone());
                }
            }
        }
        result
    }

    /// True when the node belongs to an ignored group.
    pub fn is_ignored(&self, nodename: &str) -> bool {
        self.ignore_groups.contains(nodename) || self.ignored_nodes.contains(nodename)
    }

    /// Address rsync/ssh should use for a node: the declared `ipaddress:`,
    /// else the nodename.
    pub fn node_address(&self, nodename: &str) -> String {
        self.nodes
            .get(nodename)
            .and_then(|n| n.ipaddress.clone())
            .unwrap_or_else(|| nodename.to_owned())
    }

    /// Declared `hostname:` of a node, else the nodename.
    pub fn node_hostname(&self, nodename: &str) -> String {
        self.nodes
            .get(nodename)
            .and_then(|n| n.hostname.clone())
            .unwrap_or_else(|| nodename.to_owned())
    }

    /// Resolve a configured command against `$PATH`, returning the command
    /// line with its program replaced by the full path.
    pub fn resolve_command(
        &self,
        param: &'static str,
        cmd: Option<&str>,
    ) -> ConfigResult<String> {
        let cmd = cmd.ok_or_else(|| ConfigError::CommandMissing {
            file: self.conf_path.clone(),
            param,
        })?;

        let mut words = shell_words::split(cmd).map_err(|_| ConfigError::CommandNotFound {
            file: self.conf_path.clone(),
            param,
            cmd: cmd.to_owned(),
        })?;
        let program = words.first().cloned().unwrap_or_default();
        let full = search_path(&program).ok_or_else(|| ConfigError::CommandNotFound {
            file: self.conf_path.clone(),
            param,
            cmd: program.clone(),
        })?;
        words[0] = full.display().to_string();
        Ok(shell_words::join(words.iter().map(String::as_str)))
    }

    /// Work out which configured node this host is.
    ///
    /// In practice the master sets the nodename with `--nodename`; detection
    /// is the fallback for stand-alone runs. Tried in order: a declared
    /// `hostname:` attribute, a nodename match on the short or full
    /// hostname, a declared `ipaddress:` attribute, then membership of the
    /// hostname in a node's group list.
    pub fn detect_nodename(&self, hostname: &str) -> Option<String> {
        let short = hostname.split('.').next().unwrap_or(hostname);

        for (name, node) in &self.nodes {
            if let Some(declared) = &node.hostname {
                if declared == hostname || declared == short {
                    return Some(name.clone());
                }
            }
        }
        if self.nodes.contains_key(short) {
            return Some(short.to_owned());
        }
        if self.nodes.contains_key(hostname) {
            return Some(hostname.to_owned());
        }
        for (name, node) in &self.nodes {
            if let Some(addr) = &node.ipaddress {
                if addr == hostname || addr == short {
                    return Some(name.clone());
                }
            }
            if node.groups.iter().any(|g| g == hostname || g == short) {
                return Some(name.clone());
            }
        }
        None
    }

    /// Hostname of the machine we are running on.
    pub fn local_hostname() -> String {
        rustix::system::uname()
            .nodename()
            .to_string_lossy()
            .into_owned()
    }
}

/// Splice a (possibly compound) group into `out`, depth-first, preserving
/// order and suppressing duplicates. Cycles are reported once.
fn expand_group(
    group: &str,
    defs: &BTreeMap<String, Vec<String>>,
    out: &mut Vec<String>,
    seen: &mut Vec<String>,
    problems: &mut Vec<String>,
) {
    if seen.iter().any(|g| g == group) {
        problems.push(format!("group '{group}' is defined in terms of itself"));
        return;
    }

    match defs.get(group) {
        Some(members) if !members.is_empty() => {
            seen.push(group.to_owned());
            if !out.iter().any(|g| g == group) {
                out.push(group.to_owned());
            }
            for member in members {
                expand_group(member, defs, out, seen, problems);
            }
            seen.pop();
        }
        _ => {
            if !out.iter().any(|g| g == group) {
                out.push(group.to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Lay out a minimal repository plus config file and read it back.
    fn read_fixture(extra: &str) -> (TempDir, ConfigResult<Config>) {
        let temp = TempDir::new().expect("tempdir");
        let master = temp.path().join("var");
        for sub in ["overlay/all", "delete/all", "tasks"] {
            fs::create_dir_all(master.join(sub)).expect("mkdir");
        }

        let conf = temp.path().join("synctool.conf");
        let text = format!("masterdir {}\n{extra}", master.display());
        fs::write(&conf, text).expect("write conf");

        let result = Config::read(&conf);
        (temp, result)
    }

    #[test]
    fn minimal_config_reads() {
        let (_t, result) = read_fixture("node n1 web\n");
        let config = result.expect("config");
        assert_eq!(config.num_proc, DEFAULT_NUM_PROC);
        assert_eq!(config.symlink_mode, 0o755);
        assert!(config.ignore_groups.contains("none"));
        assert!(config.groups.contains_key("all"));
    }

    #[test]
    fn node_groups_ordered_nodename_first_all_last() {
        let (_t, result) = read_fixture("node web01 web linux\n");
        let config = result.expect("config");
        assert_eq!(config.get_groups("web01"), ["web01", "web", "linux", "all"]);
    }

    #[test]
    fn compound_groups_expand_in_place() {
        let (_t, result) = read_fixture("group batch workers linux\nnode n1 batch\n");
        let config = result.expect("config");
        assert_eq!(
            config.get_groups("n1"),
            ["n1", "batch", "workers", "linux", "all"]
        );
    }

    #[test]
    fn group_cycle_is_a_config_error() {
        let (_t, result) = read_fixture("group a b\ngroup b a\nnode n1 a\n");
        let err = result.expect_err("cycle must fail");
        assert!(err.to_string().contains("defined in terms of itself"));
    }

    #[test]
    fn missing_overlay_all_is_fatal() {
        let temp = TempDir::new().expect("tempdir");
        let master = temp.path().join("var");
        fs::create_dir_all(master.join("overlay")).expect("mkdir");
        fs::create_dir_all(master.join("delete/all")).expect("mkdir");
        let conf = temp.path().join("synctool.conf");
        fs::write(&conf, format!("masterdir {}\n", master.display())).expect("write");

        let err = Config::read(&conf).expect_err("must fail");
        assert!(err.to_string().contains("overlay/all"));
    }

    #[test]
    fn ignored_groups_are_removed_from_node_lists() {
        let (_t, result) = read_fixture("node n1 web test\nignore_group test\n");
        let config = result.expect("config");
        assert_eq!(config.get_groups("n1"), ["n1", "web", "all"]);
    }

    #[test]
    fn node_in_ignored_group_is_ignored() {
        let (_t, result) =
            read_fixture("node n1 web test\nnode n2 web\nignore_group test\n");
        let config = result.expect("config");
        // The ignore decision is made against the written definition, even
        // though the ignored group is dropped from the effective list.
        assert!(config.is_ignored("n1"));
        assert!(!config.is_ignored("n2"));
    }

    #[test]
    fn node_named_in_ignore_set_is_ignored() {
        let (_t, result) = read_fixture("node n1 web\nignore_group n1\n");
        let config = result.expect("config");
        assert!(config.is_ignored("n1"));
    }

    #[test]
    fn default_nodeset_resolves_groups_to_nodes() {
        let (_t, result) = read_fixture(
            "node web01 web\nnode web02 web\nnode db01 db\ndefault_nodeset web\n",
        );
        let config = result.expect("config");
        assert_eq!(config.default_nodeset, ["web01", "web02"]);
    }

    #[test]
    fn default_nodeset_none_resets() {
        let (_t, result) = read_fixture("node n1 web\ndefault_nodeset web none\n");
        let config = result.expect("config");
        assert!(config.default_nodeset.is_empty());
    }

    #[test]
    fn unknown_default_nodeset_entry_is_fatal() {
        let (_t, result) = read_fixture("node n1 web\ndefault_nodeset dbx\n");
        let err = result.expect_err("must fail");
        assert!(err.to_string().contains("dbx"));
    }

    #[test]
    fn nodes_in_groups_matches_by_membership() {
        let (_t, result) = read_fixture("node web01 web\nnode web02 web\nnode db01 db\n");
        let config = result.expect("config");
        assert_eq!(
            config.nodes_in_groups(&["web".to_owned()]),
            ["web01", "web02"]
        );
        // A nodename works as a group of one.
        assert_eq!(config.nodes_in_groups(&["db01".to_owned()]), ["db01"]);
    }

    #[test]
    fn node_address_prefers_declared_ipaddress() {
        let (_t, result) = read_fixture("node n1 web ipaddress:10.1.2.3\nnode n2 web\n");
        let config = result.expect("config");
        assert_eq!(config.node_address("n1"), "10.1.2.3");
        assert_eq!(config.node_address("n2"), "n2");
    }

    #[test]
    fn detect_nodename_by_short_hostname() {
        let (_t, result) = read_fixture("node web01 web\n");
        let config = result.expect("config");
        assert_eq!(
            config.detect_nodename("web01.example.com"),
            Some("web01".to_owned())
        );
    }

    #[test]
    fn detect_nodename_by_declared_hostname() {
        let (_t, result) = read_fixture("node n1 web hostname:front.example.com\n");
        let config = result.expect("config");
        assert_eq!(
            config.detect_nodename("front.example.com"),
            Some("n1".to_owned())
        );
    }

    #[test]
    fn detect_nodename_unknown_host_is_none() {
        let (_t, result) = read_fixture("node n1 web\n");
        let config = result.expect("config");
        assert_eq!(config.detect_nodename("stranger.example.com"), None);
    }

    #[test]
    fn resolve_command_full_paths_the_program() {
        let (_t, result) = read_fixture("node n1 web\n");
        let config = result.expect("config");
        let resolved = config
            .resolve_command("diff_cmd", Some("sh -c true"))
            .expect("resolve");
        assert!(resolved.ends_with("sh -c true"));
        assert!(resolved.starts_with('/'));
    }

    #[test]
    fn resolve_command_missing_parameter() {
        let (_t, result) = read_fixture("node n1 web\n");
        let config = result.expect("config");
        let err = config.resolve_command("diff_cmd", None).expect_err("missing");
        assert!(err.to_string().contains("diff_cmd"));
    }

    #[test]
    fn resolve_command_unknown_program() {
        let (_t, result) = read_fixture("node n1 web\n");
        let config = result.expect("config");
        let err = config
            .resolve_command("diff_cmd", Some("no-such-differ-xyz -u"))
            .expect_err("unknown");
        assert!(err.to_string().contains("not found in PATH"));
    }
}
