//! Cheap, lazy `lstat`-based view of a path.
//!
//! A [`SyncStat`] is taken once per side of a sync pair and consulted many
//! times while deciding what (if anything) must change. It never follows
//! symlinks; the engine owns links themselves, not their targets.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

// File-type bits of st_mode, as found in <sys/stat.h>.
const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

/// Snapshot of one `lstat` call, or of a path that does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStat {
    entry: Option<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    mode: u32,
    uid: u32,
    gid: u32,
    size: u64,
    mtime: i64,
}

impl SyncStat {
    /// Stat `path` without following symlinks.
    ///
    /// A missing path yields an existing-but-empty snapshot
    /// (`exists() == false`); any other I/O failure is returned to the
    /// caller.
    pub fn lstat(path: &Path) -> io::Result<Self> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Self {
                entry: Some(Entry {
                    mode: meta.mode(),
                    uid: meta.uid(),
                    gid: meta.gid(),
                    size: meta.size(),
                    mtime: meta.mtime(),
                }),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    /// A snapshot for a path known not to exist.
    pub const fn missing() -> Self {
        Self { entry: None }
    }

    pub const fn exists(&self) -> bool {
        self.entry.is_some()
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(S_IFDIR)
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == Some(S_IFREG)
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == Some(S_IFLNK)
    }

    /// True when any execute bit is set.
    pub fn is_exec(&self) -> bool {
        self.entry.is_some_and(|e| e.mode & 0o111 != 0)
    }

    /// Permission bits only (no file-type bits), or `None` for a missing path.
    pub fn mode(&self) -> Option<u32> {
        self.entry.map(|e| e.mode & 0o7777)
    }

    pub fn uid(&self) -> Option<u32> {
        self.entry.map(|e| e.uid)
    }

    pub fn gid(&self) -> Option<u32> {
        self.entry.map(|e| e.gid)
    }

    pub fn size(&self) -> Option<u64> {
        self.entry.map(|e| e.size)
    }

    /// Modification time in seconds since the epoch.
    pub fn mtime(&self) -> Option<i64> {
        self.entry.map(|e| e.mtime)
    }

    /// True when both sides exist and disagree on owner or group.
    pub fn owner_differs(&self, other: &SyncStat) -> bool {
        match (self.entry, other.entry) {
            (Some(a), Some(b)) => a.uid != b.uid || a.gid != b.gid,
            _ => false,
        }
    }

    /// True when both sides exist and disagree on permission bits.
    pub fn mode_differs(&self, other: &SyncStat) -> bool {
        match (self.entry, other.entry) {
            (Some(a), Some(b)) => a.mode & 0o7777 != b.mode & 0o7777,
            _ => false,
        }
    }

    fn file_type(&self) -> Option<u32> {
        self.entry.map(|e| e.mode & S_IFMT)
    }
}
