//! Straightening out paths that were given by the user, and shortening the
//! repository paths we print back.
//!
//! synctool deals in plain `/`-separated strings here: these helpers exist
//! for display and for normalizing command-line input, not for filesystem
//! access.

use std::path::{Path, PathBuf};

use crate::terse::terse_path;

/// Remove doubled slashes without resolving anything.
///
/// Unlike a full normalization this never touches `.` or `..` components, so
/// symlinked paths keep their spelling. A path containing a `/.../` ellipsis
/// is a terse path; the collapse would eat its `//` marker, so one slash is
/// put back in front.
pub fn strip_multiple_slashes(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if !prev_slash {
                out.push(ch);
            }
            prev_slash = true;
        } else {
            out.push(ch);
            prev_slash = false;
        }
    }

    if out.contains("/.../") {
        out.insert(0, '/');
    }
    out
}

/// Remove any trailing slash, leaving a lone `/` alone.
pub fn strip_trailing_slash(path: &str) -> String {
    let mut path = path.to_owned();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

/// Normalize a user-supplied path: collapse slashes, drop trailing ones.
pub fn strip_path(path: &str) -> String {
    strip_trailing_slash(&strip_multiple_slashes(path))
}

/// Like [`strip_path`], but keep the leading `//` that marks a terse path.
pub fn strip_terse_path(path: &str) -> String {
    let is_terse = path.starts_with("//");
    let stripped = strip_path(path);
    if is_terse && !stripped.starts_with("//") {
        format!("/{stripped}")
    } else {
        stripped
    }
}

/// Shortens repository paths for display.
///
/// Long paths under the repository print as `$overlay/...` or `$delete/...`;
/// with `full_path` set everything prints verbatim, and with `terse` set the
/// terse `//...` form is used instead.
#[derive(Debug, Clone)]
pub struct PrettyPath {
    var_dir: PathBuf,
    overlay_dir: PathBuf,
    delete_dir: PathBuf,
    pub full_path: bool,
    pub terse: bool,
}

impl PrettyPath {
    pub fn new(var_dir: &Path, overlay_dir: &Path, delete_dir: &Path) -> Self {
        Self {
            var_dir: var_dir.to_path_buf(),
            overlay_dir: overlay_dir.to_path_buf(),
            delete_dir: delete_dir.to_path_buf(),
            full_path: false,
            terse: false,
        }
    }

    /// Render `path` for the operator.
    pub fn pretty(&self, path: &Path) -> String {
        let display = path.display().to_string();
        if self.full_path {
            return display;
        }
        if self.terse {
            return self.terse_of(path);
        }
        if let Ok(rest) = path.strip_prefix(&self.overlay_dir) {
            return format!("$overlay/{}", rest.display());
        }
        if let Ok(rest) = path.strip_prefix(&self.delete_dir) {
            return format!("$delete/{}", rest.display());
        }
        display
    }

    /// Render `path` in the terse `//...` form, eliding the middle when long.
    pub fn terse_of(&self, path: &Path) -> String {
        let display = path.display().to_string();
        if self.full_path {
            return display;
        }
        let rebased = match path.strip_prefix(&self.var_dir) {
            Ok(rest) => format!("//{}", rest.display()),
            Err(_) => display,
        };
        terse_path(&rebased, crate::terse::TERSE_WIDTH)
    }
}
