//! Sync objects: one (source, destination) pair and the transition between
//! them.
//!
//! `compare()` is a pure read deciding what differs; `apply()` performs the
//! transition and narrates it. On a dry run `apply()` prints the same
//! narration and touches nothing.
//!
//! The write protocol for regular files keeps the old content reachable at
//! every instant: the destination is first renamed to `<dest>.saved`, the
//! new content lands as `<dest>.new` and is renamed over the destination,
//! and only then are mode, owner and mtime carried over. A failure anywhere
//! leaves `<dest>.saved` as the recovery artifact.

use std::fs;
use std::os::unix::fs::{chown, symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use synclib::{Report, SyncStat, TerseCode};

use crate::fsutil;
use crate::{EngineError, EngineResult};

/// Platforms where a symlink carries a mode of its own that `lchmod` can set.
const SYMLINK_MODE_IS_REAL: bool = cfg!(any(target_os = "macos", target_os = "freebsd"));

/// What kind of transition a sync object performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Regular,
    Dir,
    Symlink,
    /// Remove the destination (delete-tree entry).
    Delete,
    /// Remove the `<dest>.saved` backup.
    EraseSaved,
}

/// How a destination differs from its chosen source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diff {
    /// Destination does not exist.
    pub missing: bool,
    /// Destination exists as a different kind of thing.
    pub kind_change: bool,
    /// Contents differ (bytes, or symlink target).
    pub content: bool,
    /// Permission bits differ.
    pub mode: bool,
    /// Owner or group differ.
    pub owner: bool,
}

impl Diff {
    pub fn changed(&self) -> bool {
        self.missing || self.kind_change || self.content || self.mode || self.owner
    }

    /// The destination itself must be (re)written, not just its metadata.
    fn needs_write(&self) -> bool {
        self.missing || self.kind_change || self.content
    }
}

/// One (source, destination) pair, consumed once by the reconciler.
#[derive(Debug, Clone)]
pub struct SyncObject {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub kind: ObjectKind,
    pub src_stat: SyncStat,
    pub dest_stat: SyncStat,
}

impl SyncObject {
    /// Build an object for an overlay entry, taking both stat snapshots.
    pub fn from_overlay(src: &Path, dest: &Path) -> EngineResult<Self> {
        let src_stat = SyncStat::lstat(src).map_err(|e| EngineError::io(src, e))?;
        let dest_stat = SyncStat::lstat(dest).map_err(|e| EngineError::io(dest, e))?;
        let kind = if src_stat.is_symlink() {
            ObjectKind::Symlink
        } else if src_stat.is_dir() {
            ObjectKind::Dir
        } else {
            ObjectKind::Regular
        };
        Ok(Self {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            kind,
            src_stat,
            dest_stat,
        })
    }

    /// Build a delete object for a delete-tree entry.
    pub fn for_delete(src: &Path, dest: &Path) -> EngineResult<Self> {
        let dest_stat = SyncStat::lstat(dest).map_err(|e| EngineError::io(dest, e))?;
        Ok(Self {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            kind: ObjectKind::Delete,
            src_stat: SyncStat::missing(),
            dest_stat,
        })
    }

    /// Build an erase-saved object for a destination.
    pub fn for_erase_saved(src: &Path, dest: &Path) -> EngineResult<Self> {
        Ok(Self {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            kind: ObjectKind::EraseSaved,
            src_stat: SyncStat::missing(),
            dest_stat: SyncStat::lstat(dest).map_err(|e| EngineError::io(dest, e))?,
        })
    }

    /// Pure read: decide what differs between source and destination.
    pub fn compare(&self, symlink_mode: u32) -> EngineResult<Diff> {
        let mut diff = Diff::default();
        match self.kind {
            ObjectKind::Regular => {
                if !self.dest_stat.exists() {
                    diff.missing = true;
                    return Ok(diff);
                }
                if !self.dest_stat.is_file() {
                    diff.kind_change = true;
                    return Ok(diff);
                }
                if self.src_stat.size() != self.dest_stat.size() {
                    diff.content = true;
                } else if !fsutil::files_identical(&self.src, &self.dest)
                    .map_err(|e| EngineError::io(&self.dest, e))?
                {
                    diff.content = true;
                }
                diff.mode = self.src_stat.mode_differs(&self.dest_stat);
                diff.owner = self.src_stat.owner_differs(&self.dest_stat);
            }

            ObjectKind::Dir => {
                if !self.dest_stat.exists() {
                    diff.missing = true;
                    return Ok(diff);
                }
                if !self.dest_stat.is_dir() {
                    diff.kind_change = true;
                    return Ok(diff);
                }
                diff.mode = self.src_stat.mode_differs(&self.dest_stat);
                diff.owner = self.src_stat.owner_differs(&self.dest_stat);
            }

            ObjectKind::Symlink => {
                if !self.dest_stat.exists() {
                    diff.missing = true;
                    return Ok(diff);
                }
                if !self.dest_stat.is_symlink() {
                    diff.kind_change = true;
                    return Ok(diff);
                }
                let want =
                    fs::read_link(&self.src).map_err(|e| EngineError::io(&self.src, e))?;
                let have =
                    fs::read_link(&self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
                if want != have {
                    diff.content = true;
                }
                if SYMLINK_MODE_IS_REAL && self.dest_stat.mode() != Some(symlink_mode) {
                    diff.mode = true;
                }
            }

            ObjectKind::Delete => {
                diff.content = self.dest_stat.exists() && !self.dest_stat.is_dir();
            }

            ObjectKind::EraseSaved => {
                diff.content = fsutil::saved_path(&self.dest).exists();
            }
        }
        Ok(diff)
    }

    /// Perform the transition `diff` calls for. Prints the intended action
    /// in every mode; mutates nothing on a dry run.
    pub fn apply(
        &self,
        diff: &Diff,
        report: &Report,
        symlink_mode: u32,
        orig_umask: u32,
    ) -> EngineResult<()> {
        match self.kind {
            ObjectKind::Regular => self.apply_regular(diff, report, orig_umask),
            ObjectKind::Dir => self.apply_dir(diff, report, orig_umask),
            ObjectKind::Symlink => self.apply_symlink(diff, report, symlink_mode, orig_umask),
            ObjectKind::Delete => self.hard_delete_file(report),
            ObjectKind::EraseSaved => self.erase_saved(report),
        }
    }

    fn apply_regular(&self, diff: &Diff, report: &Report, orig_umask: u32) -> EngineResult<()> {
        let pretty_dest = self.dest.display().to_string();

        if diff.needs_write() {
            if diff.missing {
                report.info(&format!("{pretty_dest} does not exist"));
                report.terse(TerseCode::New, &pretty_dest);
            } else if diff.kind_change {
                report.info(&format!("{pretty_dest} changed type, updating"));
                report.terse(TerseCode::Type, &pretty_dest);
            } else {
                report.info(&format!("{pretty_dest} updated"));
                report.terse(TerseCode::Sync, &pretty_dest);
            }

            if self.dest_stat.exists() {
                report.unix_out(&format!(
                    "mv {pretty_dest} {}",
                    fsutil::saved_path(&self.dest).display()
                ));
            }
            report.unix_out(&format!(
                "cp {} {pretty_dest}",
                report.pretty(&self.src)
            ));
            self.unix_out_meta(report);

            if !report.dry_run {
                self.ensure_parent(orig_umask)?;
                if self.dest_stat.exists() {
                    fsutil::save_dest(&self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
                }
                fsutil::copy_atomic(&self.src, &self.dest)
                    .map_err(|e| EngineError::io(&self.dest, e))?;
                self.fix_mode()?;
                self.fix_owner()?;
                self.fix_mtime()?;
            }
            return Ok(());
        }

        if diff.owner {
            self.report_owner_fix(report);
            if !report.dry_run {
                self.fix_owner()?;
            }
        }
        if diff.mode {
            self.report_mode_fix(report);
            if !report.dry_run {
                self.fix_mode()?;
            }
        }
        Ok(())
    }

    fn apply_dir(&self, diff: &Diff, report: &Report, orig_umask: u32) -> EngineResult<()> {
        let pretty_dest = self.dest.display().to_string();

        if diff.missing || diff.kind_change {
            if diff.kind_change {
                report.info(&format!("{pretty_dest} changed type, making directory"));
                report.terse(TerseCode::Type, &pretty_dest);
                report.unix_out(&format!(
                    "mv {pretty_dest} {}",
                    fsutil::saved_path(&self.dest).display()
                ));
            } else {
                report.info(&format!("{pretty_dest}/ created"));
                report.terse(TerseCode::Mkdir, &pretty_dest);
            }
            report.unix_out(&format!("mkdir -p {pretty_dest}"));
            self.unix_out_meta(report);

            if !report.dry_run {
                if diff.kind_change {
                    fsutil::save_dest(&self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
                }
                fsutil::mkdir_p(&self.dest, orig_umask)
                    .map_err(|e| EngineError::io(&self.dest, e))?;
                self.fix_mode()?;
                self.fix_owner()?;
            }
            return Ok(());
        }

        if diff.owner {
            self.report_owner_fix(report);
            if !report.dry_run {
                self.fix_owner()?;
            }
        }
        if diff.mode {
            self.report_mode_fix(report);
            if !report.dry_run {
                self.fix_mode()?;
            }
        }
        Ok(())
    }

    fn apply_symlink(
        &self,
        diff: &Diff,
        report: &Report,
        symlink_mode: u32,
        orig_umask: u32,
    ) -> EngineResult<()> {
        let pretty_dest = self.dest.display().to_string();
        let target = fs::read_link(&self.src).map_err(|e| EngineError::io(&self.src, e))?;

        if diff.missing || diff.kind_change || diff.content {
            report.info(&format!(
                "{pretty_dest} symlinked to {}",
                target.display()
            ));
            report.terse(TerseCode::Link, &pretty_dest);
            report.unix_out(&format!("ln -sf {} {pretty_dest}", target.display()));

            if !report.dry_run {
                self.ensure_parent(orig_umask)?;
                if self.dest_stat.is_symlink() {
                    fs::remove_file(&self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
                } else if self.dest_stat.exists() {
                    // The engine owns only the link; anything else in the
                    // way is preserved as the backup.
                    fsutil::save_dest(&self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
                }
                symlink(&target, &self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
                set_symlink_mode(&self.dest, symlink_mode)?;
            }
            return Ok(());
        }

        if diff.mode {
            report.info(&format!("{pretty_dest} mode changed to 0{symlink_mode:o}"));
            report.terse(TerseCode::Mode, &pretty_dest);
            report.unix_out(&format!("chmod 0{symlink_mode:o} {pretty_dest}"));
            if !report.dry_run {
                set_symlink_mode(&self.dest, symlink_mode)?;
            }
        }
        Ok(())
    }

    /// Remove a `<dest>.saved` backup if one is present.
    pub fn erase_saved(&self, report: &Report) -> EngineResult<()> {
        let saved = fsutil::saved_path(&self.dest);
        if !saved.exists() {
            return Ok(());
        }

        let not_str = if report.dry_run { "not " } else { "" };
        report.info(&format!("{not_str}erasing {}", saved.display()));
        report.terse(TerseCode::Delete, &saved.display().to_string());
        report.unix_out(&format!("rm {}", saved.display()));

        if !report.dry_run {
            fs::remove_file(&saved).map_err(|e| EngineError::io(&saved, e))?;
        }
        Ok(())
    }

    /// Unconditionally remove the destination.
    pub fn hard_delete_file(&self, report: &Report) -> EngineResult<()> {
        let pretty_dest = self.dest.display().to_string();
        report.terse(TerseCode::Delete, &pretty_dest);
        report.unix_out(&format!("rm {pretty_dest}"));

        if !report.dry_run {
            fs::remove_file(&self.dest).map_err(|e| EngineError::io(&self.dest, e))?;
        }
        Ok(())
    }

    fn report_owner_fix(&self, report: &Report) {
        let uid = self.src_stat.uid().unwrap_or(0);
        let gid = self.src_stat.gid().unwrap_or(0);
        let pretty_dest = self.dest.display().to_string();
        report.info(&format!("{pretty_dest} owner changed to {uid}:{gid}"));
        report.terse(TerseCode::Owner, &pretty_dest);
        report.unix_out(&format!("chown {uid}:{gid} {pretty_dest}"));
    }

    fn report_mode_fix(&self, report: &Report) {
        let mode = self.src_stat.mode().unwrap_or(0o644);
        let pretty_dest = self.dest.display().to_string();
        report.info(&format!("{pretty_dest} mode changed to 0{mode:o}"));
        report.terse(TerseCode::Mode, &pretty_dest);
        report.unix_out(&format!("chmod 0{mode:o} {pretty_dest}"));
    }

    fn unix_out_meta(&self, report: &Report) {
        let uid = self.src_stat.uid().unwrap_or(0);
        let gid = self.src_stat.gid().unwrap_or(0);
        let mode = self.src_stat.mode().unwrap_or(0o644);
        report.unix_out(&format!("chown {uid}:{gid} {}", self.dest.display()));
        report.unix_out(&format!("chmod 0{mode:o} {}", self.dest.display()));
    }

    /// Create the destination's parent directories when syncing a single
    /// file whose directory chain was never visited.
    fn ensure_parent(&self, orig_umask: u32) -> EngineResult<()> {
        if let Some(parent) = self.dest.parent() {
            if !parent.exists() {
                fsutil::mkdir_p(parent, orig_umask).map_err(|e| EngineError::io(parent, e))?;
            }
        }
        Ok(())
    }

    fn fix_mode(&self) -> EngineResult<()> {
        let mode = self.src_stat.mode().unwrap_or(0o644);
        fs::set_permissions(&self.dest, fs::Permissions::from_mode(mode))
            .map_err(|e| EngineError::io(&self.dest, e))
    }

    fn fix_owner(&self) -> EngineResult<()> {
        chown(&self.dest, self.src_stat.uid(), self.src_stat.gid())
            .map_err(|e| EngineError::io(&self.dest, e))
    }

    fn fix_mtime(&self) -> EngineResult<()> {
        if let Some(mtime) = self.src_stat.mtime() {
            filetime::set_file_mtime(&self.dest, FileTime::from_unix_time(mtime, 0))
                .map_err(|e| EngineError::io(&self.dest, e))?;
        }
        Ok(())
    }
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
fn set_symlink_mode(dest: &Path, mode: u32) -> EngineResult<()> {
    use rustix::fs::{chmodat, AtFlags, Mode, CWD};
    chmodat(
        CWD,
        dest,
        Mode::from_raw_mode(mode),
        AtFlags::SYMLINK_NOFOLLOW,
    )
    .map_err(|e| EngineError::io(dest, e.into()))
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
fn set_symlink_mode(_dest: &Path, _mode: u32) -> EngineResult<()> {
    // The kernel fixes symlink modes at 0777 here; nothing to set.
    Ok(())
}
