//! The overlay walker and the chosen map it produces.
//!
//! One pass over a repository subtree yields, per destination path, the
//! single best-ranked source (the *chosen* entry), the post-script guarding
//! each destination, and the set of destinations the walk refused to decide.
//!
//! Directories merge: the same destination directory may be populated from
//! several subtrees, and each contributes children independently. Regular
//! files and symlinks do not merge; a rank tie between different sources is
//! an ambiguity the operator has to resolve.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use synclib::Report;
use walkdir::WalkDir;

use crate::suffix::{split_group, SuffixResult};
use crate::{OverlayError, OverlayResult};

/// The chosen source for one destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayEntry {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub priority: usize,
    pub is_dir: bool,
}

/// The best post-script found for one destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostScript {
    pub src: PathBuf,
    pub priority: usize,
}

/// Everything one walk decided.
#[derive(Debug, Default)]
pub struct Resolved {
    /// Destination → chosen entry, in path order.
    pub chosen: BTreeMap<PathBuf, OverlayEntry>,
    /// Destination → post-script guarding it.
    pub scripts: BTreeMap<PathBuf, PostScript>,
    /// Destination → the equal-rank sources the walk refused to pick from.
    pub ambiguous: BTreeMap<PathBuf, Vec<PathBuf>>,
}

impl Resolved {
    /// Post-script for a destination path, if one applies.
    ///
    /// A script attaches only when it ranks at least as well as the chosen
    /// entry for the same destination.
    pub fn script_for(&self, dest: &Path) -> Option<&PostScript> {
        let script = self.scripts.get(dest)?;
        match self.chosen.get(dest) {
            Some(entry) if script.priority > entry.priority => None,
            _ => Some(script),
        }
    }
}

/// Accumulates candidates per destination during the walk.
#[derive(Debug)]
struct Candidate {
    priority: usize,
    is_dir: bool,
    sources: Vec<PathBuf>,
}

/// Walk every top-level subtree under `root` and resolve the chosen map for
/// a client with the given ordered group list. Destinations are re-rooted
/// under `dest_root` (`/` in a real run).
///
/// Entries without any group suffix are skipped with a warning (files) or
/// traversed as plain containers at `all` rank (directories). Entries whose
/// suffix is not one of ours do not apply; a non-applying directory prunes
/// its whole subtree.
pub fn walk(
    root: &Path,
    dest_root: &Path,
    my_groups: &[String],
    report: &Report,
) -> OverlayResult<Resolved> {
    let mut candidates: BTreeMap<PathBuf, Candidate> = BTreeMap::new();
    let mut scripts: BTreeMap<PathBuf, PostScript> = BTreeMap::new();

    let all_rank = my_groups.len().saturating_sub(1);

    let mut subtrees: Vec<PathBuf> = fs::read_dir(root)
        .map_err(|source| OverlayError::Io {
            dir: root.to_path_buf(),
            source,
        })?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    subtrees.sort();

    for subtree in subtrees {
        // Destination directory each visited source directory maps to.
        let mut dest_of: HashMap<PathBuf, PathBuf> = HashMap::new();
        dest_of.insert(subtree.clone(), dest_root.to_path_buf());

        let mut it = WalkDir::new(&subtree)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = it.next() {
            let entry = entry.map_err(|source| OverlayError::Walk {
                dir: subtree.clone(),
                source,
            })?;
            let src = entry.path().to_path_buf();
            let is_dir = entry.file_type().is_dir();

            let Some(parent_dest) = entry.path().parent().and_then(|p| dest_of.get(p)).cloned()
            else {
                // Parent was pruned; nothing below it applies.
                continue;
            };

            let filename = entry.file_name().to_string_lossy().into_owned();
            match split_group(&filename, my_groups) {
                SuffixResult::Saved => {}

                SuffixResult::NoSuffix if is_dir => {
                    // A bare directory is a container, applying to everyone.
                    let dest = parent_dest.join(&filename);
                    dest_of.insert(src.clone(), dest.clone());
                    insert_candidate(&mut candidates, dest, src, all_rank, true);
                }

                SuffixResult::NoSuffix => {
                    report.warning(&format!(
                        "{} has no group suffix, skipped",
                        report.pretty(&src)
                    ));
                }

                SuffixResult::NotMine => {
                    if is_dir {
                        it.skip_current_dir();
                    }
                }

                SuffixResult::Applies {
                    name,
                    priority,
                    post,
                } => {
                    let dest = parent_dest.join(&name);
                    if post && !is_dir {
                        let better = scripts
                            .get(&dest)
                            .is_none_or(|cur| priority < cur.priority);
                        if better {
                            scripts.insert(dest, PostScript { src, priority });
                        }
                        continue;
                    }
                    if is_dir {
                        dest_of.insert(src.clone(), dest.clone());
                    }
                    insert_candidate(&mut candidates, dest, src, priority, is_dir);
                }
            }
        }
    }

    let mut resolved = Resolved {
        scripts,
        ..Resolved::default()
    };
    for (dest, mut candidate) in candidates {
        if candidate.sources.len() > 1 {
            resolved.ambiguous.insert(dest, candidate.sources);
        } else if let Some(src) = candidate.sources.pop() {
            resolved.chosen.insert(
                dest.clone(),
                OverlayEntry {
                    src,
                    dest,
                    priority: candidate.priority,
                    is_dir: candidate.is_dir,
                },
            );
        }
    }
    Ok(resolved)
}

fn insert_candidate(
    candidates: &mut BTreeMap<PathBuf, Candidate>,
    dest: PathBuf,
    src: PathBuf,
    priority: usize,
    is_dir: bool,
) {
    match candidates.get_mut(&dest) {
        None => {
            candidates.insert(
                dest,
                Candidate {
                    priority,
                    is_dir,
                    sources: vec![src],
                },
            );
        }
        Some(cur) if priority < cur.priority => {
            cur.priority = priority;
            cur.is_dir = is_dir;
            cur.sources = vec![src];
        }
        Some(cur) if priority == cur.priority => {
            // Directories populated from several subtrees merge silently;
            // anything else at the same rank is an ambiguity.
            if !(is_dir && cur.is_dir) {
                cur.sources.push(src);
            }
        }
        Some(_) => {}
    }
}
