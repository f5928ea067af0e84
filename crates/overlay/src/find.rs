//! Single-destination lookup for `--diff`, `--single` and `--ref`.
//!
//! The operator hands in a destination path, either in full or in the terse
//! `//.../...` form copied from earlier output. Terse patterns are matched
//! against destination paths only; repository source paths are never valid
//! input here.

use std::path::Path;

use synclib::terse::terse_match;

use crate::walk::{OverlayEntry, Resolved};

/// Outcome of a single-destination lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum FindResult<'a> {
    /// Exactly one chosen entry matches.
    Found(&'a OverlayEntry),
    /// Nothing in the chosen map matches.
    NotFound,
    /// A terse pattern matched several destinations; the caller prints them
    /// all and refuses to pick.
    Multiple(Vec<&'a OverlayEntry>),
}

/// Look up the chosen entry for a user-supplied destination path.
pub fn find_dest<'a>(resolved: &'a Resolved, filename: &str) -> FindResult<'a> {
    if filename.starts_with("//") {
        let matches: Vec<&OverlayEntry> = resolved
            .chosen
            .values()
            .filter(|entry| {
                entry
                    .dest
                    .to_str()
                    .is_some_and(|dest| terse_match(filename, dest))
            })
            .collect();
        return match matches.len() {
            0 => FindResult::NotFound,
            1 => FindResult::Found(matches[0]),
            _ => FindResult::Multiple(matches),
        };
    }

    match resolved.chosen.get(Path::new(filename)) {
        Some(entry) => FindResult::Found(entry),
        None => FindResult::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::OverlayEntry;
    use std::path::PathBuf;

    fn resolved_with(dests: &[&str]) -> Resolved {
        let mut resolved = Resolved::default();
        for dest in dests {
            let dest = PathBuf::from(dest);
            resolved.chosen.insert(
                dest.clone(),
                OverlayEntry {
                    src: PathBuf::from(format!("/repo/overlay/all{}._all", dest.display())),
                    dest,
                    priority: 0,
                    is_dir: false,
                },
            );
        }
        resolved
    }

    #[test]
    fn exact_destination_is_found() {
        let resolved = resolved_with(&["/etc/motd", "/etc/hosts"]);
        let FindResult::Found(entry) = find_dest(&resolved, "/etc/motd") else {
            panic!("expected a match");
        };
        assert_eq!(entry.dest, PathBuf::from("/etc/motd"));
    }

    #[test]
    fn unknown_destination_is_not_found() {
        let resolved = resolved_with(&["/etc/motd"]);
        assert_eq!(find_dest(&resolved, "/etc/shadow"), FindResult::NotFound);
    }

    #[test]
    fn terse_pattern_finds_unique_match() {
        let resolved = resolved_with(&["/etc/cron.d/job", "/var/spool/mail"]);
        let FindResult::Found(entry) = find_dest(&resolved, "//etc/.../job") else {
            panic!("expected a match");
        };
        assert_eq!(entry.dest, PathBuf::from("/etc/cron.d/job"));
    }

    #[test]
    fn terse_pattern_with_several_matches_reports_all() {
        let resolved = resolved_with(&["/etc/a/job", "/etc/b/job"]);
        let FindResult::Multiple(entries) = find_dest(&resolved, "//etc/.../job") else {
            panic!("expected multiple");
        };
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn terse_pattern_without_match_is_not_found() {
        let resolved = resolved_with(&["/etc/a/job"]);
        assert_eq!(find_dest(&resolved, "//usr/.../job"), FindResult::NotFound);
    }
}
