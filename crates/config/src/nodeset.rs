//! Target nodeset computation for the master.
//!
//! Selection starts from `--node` plus the nodes in `--group` (or the
//! configured default nodeset when neither is given), then removes
//! `--exclude` nodes, nodes in `--exclude-group`, and finally everything in
//! the ignore set.

use crate::{Config, ConfigError, ConfigResult};

/// Include/exclude selection as given on the master's command line.
#[derive(Debug, Clone, Default)]
pub struct NodeSelector {
    pub nodes: Vec<String>,
    pub groups: Vec<String>,
    pub exclude_nodes: Vec<String>,
    pub exclude_groups: Vec<String>,
}

/// One dispatch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    pub nodename: String,
    /// Address rsync and ssh connect to (declared ipaddress, else nodename).
    pub address: String,
}

/// The computed target set, with the ignored nodes that were filtered out
/// kept aside so the caller can mention them.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    pub targets: Vec<NodeTarget>,
    pub ignored: Vec<String>,
}

impl NodeSet {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Compute the nodeset for a selection. Unknown node or group names anywhere
/// in the selection are fatal.
pub fn make_nodeset(config: &Config, selector: &NodeSelector) -> ConfigResult<NodeSet> {
    for name in selector.nodes.iter().chain(&selector.exclude_nodes) {
        if !config.nodes.contains_key(name) {
            return Err(ConfigError::UnknownSelector(name.clone()));
        }
    }
    for group in selector.groups.iter().chain(&selector.exclude_groups) {
        if !config.all_groups.contains(group) {
            return Err(ConfigError::UnknownSelector(group.clone()));
        }
    }

    let mut selected: Vec<String> = Vec::new();
    if selector.nodes.is_empty() && selector.groups.is_empty() {
        selected.extend(config.default_nodeset.iter().cloned());
    } else {
        for node in &selector.nodes {
            if !selected.contains(node) {
                selected.push(node.clone());
            }
        }
        for node in config.nodes_in_groups(&selector.groups) {
            if !selected.contains(&node) {
                selected.push(node);
            }
        }
    }

    let excluded_by_group = config.nodes_in_groups(&selector.exclude_groups);
    selected.retain(|node| {
        !selector.exclude_nodes.contains(node) && !excluded_by_group.contains(node)
    });

    let mut set = NodeSet::default();
    for node in selected {
        if config.is_ignored(&node) {
            set.ignored.push(node);
        } else {
            set.targets.push(NodeTarget {
                address: config.node_address(&node),
                nodename: node,
            });
        }
    }
    Ok(set)
}
