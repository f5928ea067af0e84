//! Low-level filesystem helpers backing the apply protocol.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use rustix::fs::Mode;
use rustix::process::umask;

/// The reserved backup name next to a destination: `<dest>.saved`.
pub fn saved_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".saved");
    PathBuf::from(name)
}

/// The staging name used while writing: `<dest>.new`.
pub fn staging_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".new");
    PathBuf::from(name)
}

/// Move an existing destination aside to `<dest>.saved`, replacing any
/// earlier backup.
pub fn save_dest(dest: &Path) -> io::Result<()> {
    fs::rename(dest, saved_path(dest))
}

/// Copy `src` into place atomically: write `<dest>.new` in the destination
/// directory, then rename over `dest`. At no instant is a truncated file
/// readable at `dest`.
pub fn copy_atomic(src: &Path, dest: &Path) -> io::Result<()> {
    let staging = staging_path(dest);
    fs::copy(src, &staging)?;
    fs::rename(&staging, dest)
}

/// Byte-for-byte comparison of two regular files.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buf_a = [0u8; 16 * 1024];
    let mut buf_b = [0u8; 16 * 1024];

    loop {
        let len_a = read_full(&mut reader_a, &mut buf_a)?;
        let len_b = read_full(&mut reader_b, &mut buf_b)?;
        if len_a != len_b || buf_a[..len_a] != buf_b[..len_b] {
            return Ok(false);
        }
        if len_a == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// `mkdir -p` with the admin's original umask in effect, so new directories
/// get the permissions the admin intended rather than the engine's
/// restrictive working umask.
pub fn mkdir_p(path: &Path, orig_umask: u32) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    let working = umask(Mode::from_raw_mode(orig_umask));
    let result = fs::create_dir_all(path);
    umask(working);
    result
}

/// Capture the admin's umask and switch the process to a restrictive one
/// for the duration of the run. Returns the original mask.
pub fn capture_umask() -> u32 {
    umask(Mode::from_raw_mode(0o077)).bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saved_and_staging_names() {
        assert_eq!(saved_path(Path::new("/etc/motd")), Path::new("/etc/motd.saved"));
        assert_eq!(staging_path(Path::new("/etc/motd")), Path::new("/etc/motd.new"));
    }

    #[test]
    fn save_dest_replaces_prior_backup() {
        let temp = tempdir().expect("tempdir");
        let dest = temp.path().join("file");
        let saved = saved_path(&dest);
        fs::write(&dest, b"current").expect("write");
        fs::write(&saved, b"stale backup").expect("write");

        save_dest(&dest).expect("save");
        assert!(!dest.exists());
        assert_eq!(fs::read(&saved).expect("read"), b"current");
    }

    #[test]
    fn copy_atomic_leaves_no_staging_file() {
        let temp = tempdir().expect("tempdir");
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::write(&src, b"payload").expect("write");

        copy_atomic(&src, &dest).expect("copy");
        assert_eq!(fs::read(&dest).expect("read"), b"payload");
        assert!(!staging_path(&dest).exists());
    }

    #[test]
    fn identical_files_compare_equal() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"same bytes").expect("write");
        fs::write(&b, b"same bytes").expect("write");
        assert!(files_identical(&a, &b).expect("compare"));
    }

    #[test]
    fn different_files_compare_unequal() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"same length!").expect("write");
        fs::write(&b, b"same length?").expect("write");
        assert!(!files_identical(&a, &b).expect("compare"));
    }

    #[test]
    fn mkdir_p_creates_nested_directories() {
        let temp = tempdir().expect("tempdir");
        let deep = temp.path().join("a/b/c");
        mkdir_p(&deep, 0o022).expect("mkdir");
        assert!(deep.is_dir());
        // Existing path is fine.
        mkdir_p(&deep, 0o022).expect("mkdir again");
    }
}
