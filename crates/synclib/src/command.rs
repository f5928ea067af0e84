//! Locating configured external commands.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Search `$PATH` for `cmd`, or validate it directly when it already carries
/// a directory component. Returns the full path of an executable file.
pub fn search_path(cmd: &str) -> Option<PathBuf> {
    let candidate = Path::new(cmd);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(cmd))
        .find(|full| is_executable(full))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_sh_on_path() {
        // /bin/sh exists on any system these tests run on.
        assert!(search_path("sh").is_some());
    }

    #[test]
    fn full_path_is_validated_not_searched() {
        assert_eq!(search_path("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert_eq!(search_path("/bin/no-such-command-here"), None);
    }

    #[test]
    fn non_executable_file_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data");
        fs::write(&path, b"not a program").expect("write");
        assert_eq!(search_path(path.to_str().expect("utf8 path")), None);
    }

    #[test]
    fn missing_command_is_none() {
        assert_eq!(search_path("definitely-not-a-real-command-1234"), None);
    }
}
