//! Terse path syntax.
//!
//! Long paths are shortened for display by replacing their middle with an
//! ellipsis component; a leading `//` marks a path as terse and roots it at
//! the repository var-dir. `//A/.../Z` matches a destination path that begins
//! with `/A/` and ends with `/Z`. Terse paths are a display and input
//! convenience only; they never land on disk.

/// Display width a terse path is shortened to fit.
pub const TERSE_WIDTH: usize = 55;

/// Shorten `path` to at most roughly `maxlen` characters by eliding middle
/// components with `...`. Short paths come back unchanged.
pub fn terse_path(path: &str, maxlen: usize) -> String {
    if path.len() <= maxlen {
        return path.to_owned();
    }

    let mut parts: Vec<&str> = path.split('/').collect();
    while parts.len() >= 3 {
        let idx = parts.len() / 2;
        parts[idx] = "...";
        let candidate = parts.join("/");
        if candidate.len() > maxlen {
            // Still too long; drop the elided component and squeeze further.
            parts.remove(idx);
        } else {
            return candidate;
        }
    }

    path.to_owned()
}

/// Does the terse path `pattern` match destination path `path`?
///
/// Only destination paths are matched; a pattern without the leading `//` is
/// never a match.
pub fn terse_match(pattern: &str, path: &str) -> bool {
    if !pattern.starts_with("//") {
        return false;
    }

    let Some(idx) = pattern.find("/.../") else {
        // A very short terse path with no ellipsis: exact match minus one
        // leading slash.
        return &pattern[1..] == path;
    };

    // Tail of the pattern, including the slash in front of it.
    let tail = &pattern[idx + 4..];
    if !path.ends_with(tail) {
        return false;
    }

    // Head of the pattern, including its trailing slash.
    let head = &pattern[1..=idx];
    path.starts_with(head)
}

/// Index of the first pattern in `patterns` matching `path`.
pub fn terse_match_many(path: &str, patterns: &[String]) -> Option<usize> {
    patterns.iter().position(|p| terse_match(p, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::strip_path;

    #[test]
    fn short_path_unchanged() {
        assert_eq!(terse_path("/etc/motd", TERSE_WIDTH), "/etc/motd");
    }

    #[test]
    fn long_path_elided_in_the_middle() {
        let long = "/opt/services/scheduler/releases/2024-01/conf/workers/pool/settings.cfg";
        let short = terse_path(long, TERSE_WIDTH);
        assert!(short.len() <= TERSE_WIDTH);
        assert!(short.contains("/.../"));
        assert!(short.starts_with("/opt/"));
        assert!(short.ends_with("/settings.cfg"));
    }

    #[test]
    fn match_requires_terse_marker() {
        assert!(!terse_match("/etc/.../motd", "/etc/motd"));
        assert!(!terse_match("/etc/motd", "/etc/motd"));
    }

    #[test]
    fn match_without_ellipsis_is_exact() {
        assert!(terse_match("//etc/motd", "/etc/motd"));
        assert!(!terse_match("//etc/motd", "/etc/motd.old"));
    }

    #[test]
    fn match_head_and_tail() {
        assert!(terse_match("//etc/.../job", "/etc/cron.d/job"));
        assert!(terse_match("//a/.../z", "/a/b/c/d/z"));
        assert!(!terse_match("//a/.../z", "/b/c/z"));
        assert!(!terse_match("//a/.../z", "/a/b/c/x"));
    }

    #[test]
    fn shortened_path_round_trips_through_match() {
        // The printed terse form, re-entered by the operator and normalized
        // the way command-line input is, matches the original destination.
        let dest = "/srv/application/releases/current/configuration/daemons/collector/collector.conf";
        let shown = terse_path(dest, TERSE_WIDTH);
        assert!(shown.contains("/.../"), "path long enough to elide");
        let reentered = strip_path(&shown);
        assert!(reentered.starts_with("//"));
        assert!(terse_match(&reentered, dest));
    }

    #[test]
    fn match_many_returns_first_hit() {
        let patterns = vec![
            "//var/.../log".to_owned(),
            "//etc/.../job".to_owned(),
            "//etc/cron.d/job".to_owned(),
        ];
        assert_eq!(terse_match_many("/etc/cron.d/job", &patterns), Some(1));
        assert_eq!(terse_match_many("/usr/bin/job", &patterns), None);
    }
}
