//! One client run: walk, compare, apply, post-scripts.
//!
//! The pass is strictly single-threaded and sequential; the engine assumes
//! exclusive control of the destination subtree while it runs.

use std::path::Path;
use std::process::Command;

use config::Config;
use overlay::{find_dest, walk, FindResult, OverlayEntry, Resolved};
use synclib::{Report, TerseCode};

use crate::fsutil;
use crate::object::SyncObject;
use crate::post::{run_command_in_dir, DirQueue};
use crate::{EngineError, EngineResult};

/// State of one client invocation.
#[derive(Debug)]
pub struct Session<'a> {
    config: &'a Config,
    report: &'a Report,
    nodename: String,
    dest_root: std::path::PathBuf,
    resolved: Resolved,
    dir_queue: DirQueue,
    envs: Vec<(String, String)>,
    orig_umask: u32,
    failures: usize,
}

impl<'a> Session<'a> {
    /// Walk the overlay tree for `nodename` and prepare a session
    /// reconciling against the real filesystem root.
    ///
    /// Ambiguous destinations are reported here, with every colliding
    /// source, and the session refuses to start.
    pub fn new(config: &'a Config, report: &'a Report, nodename: &str) -> EngineResult<Self> {
        Self::with_dest_root(config, report, nodename, Path::new("/"))
    }

    /// Like [`Session::new`], reconciling against `dest_root` instead of `/`.
    pub fn with_dest_root(
        config: &'a Config,
        report: &'a Report,
        nodename: &str,
        dest_root: &Path,
    ) -> EngineResult<Self> {
        let my_groups = config.get_groups(nodename).to_vec();
        let resolved = walk(&config.overlay_dir, dest_root, &my_groups, report)?;
        check_ambiguity(&resolved, report)?;

        Ok(Self {
            config,
            report,
            nodename: nodename.to_owned(),
            dest_root: dest_root.to_path_buf(),
            resolved,
            dir_queue: DirQueue::default(),
            envs: vec![
                ("SYNCTOOL_NODENAME".to_owned(), nodename.to_owned()),
                (
                    "SYNCTOOL_MASTERDIR".to_owned(),
                    config.masterdir.display().to_string(),
                ),
            ],
            orig_umask: fsutil::capture_umask(),
            failures: 0,
        })
    }

    /// Count of per-file operations that failed during this session.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Reconcile every chosen overlay entry against its destination.
    pub fn overlay_files(&mut self) {
        let entries: Vec<OverlayEntry> = self.resolved.chosen.values().cloned().collect();
        for entry in entries {
            self.report
                .verbose(&format!("checking {}", self.report.pretty(&entry.src)));
            match self.sync_entry(&entry) {
                Ok(true) => self.run_post(&entry.src, &entry.dest),
                Ok(false) => {}
                Err(err) => {
                    self.report.error(&err.to_string());
                    self.failures += 1;
                }
            }
        }
    }

    fn sync_entry(&self, entry: &OverlayEntry) -> EngineResult<bool> {
        let obj = SyncObject::from_overlay(&entry.src, &entry.dest)?;
        let diff = obj.compare(self.config.symlink_mode)?;
        if !diff.changed() {
            return Ok(false);
        }
        obj.apply(
            &diff,
            self.report,
            self.config.symlink_mode,
            self.orig_umask,
        )?;
        Ok(true)
    }

    /// Remove destinations named by the delete tree. Directories under
    /// `delete/` are traversal-only and never themselves removed.
    pub fn delete_files(&mut self) -> EngineResult<()> {
        let my_groups = self.config.get_groups(&self.nodename).to_vec();
        let resolved = walk(&self.config.delete_dir, &self.dest_root, &my_groups, self.report)?;
        check_ambiguity(&resolved, self.report)?;

        let not_str = if self.report.dry_run { "not " } else { "" };
        for entry in resolved.chosen.values() {
            if entry.is_dir {
                continue;
            }
            match self.delete_entry(entry, not_str) {
                Ok(true) => self.run_post(&entry.src, &entry.dest),
                Ok(false) => {}
                Err(err) => {
                    self.report.error(&err.to_string());
                    self.failures += 1;
                }
            }
        }
        Ok(())
    }

    fn delete_entry(&self, entry: &OverlayEntry, not_str: &str) -> EngineResult<bool> {
        let obj = SyncObject::for_delete(&entry.src, &entry.dest)?;
        let diff = obj.compare(self.config.symlink_mode)?;
        if !diff.changed() {
            return Ok(false);
        }
        self.report.info(&format!(
            "{not_str}deleting {} : {}",
            self.report.pretty(&entry.src),
            entry.dest.display()
        ));
        obj.apply(
            &diff,
            self.report,
            self.config.symlink_mode,
            self.orig_umask,
        )?;
        Ok(true)
    }

    /// Remove `<dest>.saved` backups for every chosen destination.
    pub fn erase_saved_all(&mut self) {
        let entries: Vec<OverlayEntry> = self.resolved.chosen.values().cloned().collect();
        for entry in entries {
            let result = SyncObject::for_erase_saved(&entry.src, &entry.dest)
                .and_then(|obj| obj.erase_saved(self.report));
            if let Err(err) = result {
                self.report.error(&err.to_string());
                self.failures += 1;
            }
        }
    }

    /// Check or update a single destination. Returns whether it changed.
    pub fn single_file(&mut self, filename: &str) -> EngineResult<bool> {
        let entry = match self.find(filename)? {
            Some(entry) => entry,
            None => {
                self.report
                    .error(&format!("{filename} is not in the overlay tree"));
                return Ok(false);
            }
        };

        self.report
            .verbose(&format!("checking against {}", self.report.pretty(&entry.src)));
        match self.sync_entry(&entry) {
            Ok(true) => {
                self.run_post(&entry.src, &entry.dest);
                Ok(true)
            }
            Ok(false) => {
                self.report.info(&format!("{filename} is up to date"));
                self.report.terse(TerseCode::Ok, filename);
                self.report
                    .unix_out(&format!("# {} is up to date", entry.dest.display()));
                Ok(false)
            }
            Err(err) => {
                self.report.error(&err.to_string());
                self.failures += 1;
                Ok(false)
            }
        }
    }

    /// Erase the backup for a single destination.
    pub fn single_erase_saved(&mut self, filename: &str) -> EngineResult<()> {
        let Some(entry) = self.find(filename)? else {
            self.report
                .error(&format!("{filename} is not in the overlay tree"));
            return Ok(());
        };
        let obj = SyncObject::for_erase_saved(&entry.src, &entry.dest)?;
        obj.erase_saved(self.report)
    }

    /// Show which repository source the resolver chooses for a destination.
    pub fn reference(&self, filename: &str) -> EngineResult<()> {
        match self.find(filename)? {
            Some(entry) => self.report.print(&self.report.pretty(&entry.src)),
            None => self
                .report
                .error(&format!("{filename} is not in the overlay tree")),
        }
        Ok(())
    }

    /// Run the configured diff command against a destination and its chosen
    /// source. Never mutates anything.
    pub fn diff_file(&self, filename: &str) -> EngineResult<()> {
        let diff_cmd = self
            .config
            .resolve_command("diff_cmd", self.config.commands.diff_cmd.as_deref())?;

        let Some(entry) = self.find(filename)? else {
            self.report
                .error(&format!("{filename} is not in the overlay tree"));
            return Ok(());
        };

        if self.report.unix_cmd {
            self.report.unix_out(&format!(
                "{diff_cmd} {} {}",
                entry.dest.display(),
                entry.src.display()
            ));
            return Ok(());
        }

        self.report.verbose(&format!(
            "{diff_cmd} {} {}",
            entry.dest.display(),
            self.report.pretty(&entry.src)
        ));

        let mut words = shell_words::split(&diff_cmd).map_err(|e| {
            EngineError::io(
                Path::new(&diff_cmd),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            )
        })?;
        words.push(entry.dest.display().to_string());
        words.push(entry.src.display().to_string());

        // diff exits 1 when the files differ; that is the point, not an
        // error.
        let _ = Command::new(&words[0])
            .args(&words[1..])
            .status()
            .map_err(|e| EngineError::io(&entry.src, e))?;
        Ok(())
    }

    /// Run the chosen scripts in the tasks tree.
    pub fn run_tasks(&mut self) -> EngineResult<()> {
        if !self.config.tasks_dir.is_dir() {
            self.report.verbose("no tasks directory, nothing to do");
            return Ok(());
        }
        let my_groups = self.config.get_groups(&self.nodename).to_vec();
        let resolved = walk(&self.config.tasks_dir, &self.dest_root, &my_groups, self.report)?;
        check_ambiguity(&resolved, self.report)?;

        for entry in resolved.chosen.values() {
            if entry.is_dir {
                continue;
            }
            crate::post::run_command(&entry.src.display().to_string(), self.report, &self.envs);
        }
        Ok(())
    }

    /// Fire the post-scripts for every directory whose contents changed,
    /// deepest destination first, each (src, dst) pair at most once.
    pub fn run_post_on_directories(&mut self) {
        if self.report.no_post {
            return;
        }
        for (_src, dest) in self.dir_queue.drain_ordered() {
            if let Some(script) = self.resolved.script_for(&dest) {
                let cmd = script.src.display().to_string();
                run_command_in_dir(&dest, &cmd, self.report, &self.envs);
            }
        }
    }

    /// A destination changed: run its own post-script now and remember the
    /// directory pair for the deferred pass.
    fn run_post(&mut self, src: &Path, dest: &Path) {
        if self.report.no_post {
            return;
        }

        // Directories settle later, when their whole contents have been
        // visited.
        if dest.is_dir() {
            self.dir_queue.push(src, dest);
            return;
        }

        if let Some(script) = self.resolved.script_for(dest) {
            if let Some(dest_dir) = dest.parent() {
                let cmd = script.src.display().to_string();
                run_command_in_dir(dest_dir, &cmd, self.report, &self.envs);
            }
        }

        if let (Some(src_dir), Some(dest_dir)) = (src.parent(), dest.parent()) {
            self.dir_queue.push(src_dir, dest_dir);
        }
    }

    fn find(&self, filename: &str) -> EngineResult<Option<OverlayEntry>> {
        match find_dest(&self.resolved, filename) {
            FindResult::Found(entry) => Ok(Some(entry.clone())),
            FindResult::NotFound => Ok(None),
            FindResult::Multiple(entries) => {
                self.report
                    .error(&format!("multiple destinations match {filename}:"));
                for entry in entries {
                    self.report.error(&format!("  {}", entry.dest.display()));
                }
                Err(EngineError::MultipleMatches(filename.to_owned()))
            }
        }
    }
}

/// Report every destination the walk refused to decide, then abort.
fn check_ambiguity(resolved: &Resolved, report: &Report) -> EngineResult<()> {
    if resolved.ambiguous.is_empty() {
        return Ok(());
    }
    for (dest, sources) in &resolved.ambiguous {
        report.error(&format!(
            "conflicting sources for {}:",
            dest.display()
        ));
        for src in sources {
            report.error(&format!("  {}", report.pretty(src)));
        }
    }
    Err(EngineError::Ambiguous)
}
