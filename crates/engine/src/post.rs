//! Changed-directory bookkeeping and post-script execution.
//!
//! Directories whose contents changed during a pass collect here as
//! (source dir, destination dir) pairs. After the pass the queue flushes
//! deepest destination first, so a script restarting a service in `/etc`
//! observes settled children. Each pair fires at most once per run; the same
//! destination reached through different sources fires once per source.

use std::path::{Path, PathBuf};
use std::process::Command;

use synclib::{Report, SyncStat, TerseCode};

/// Accumulated (source dir, destination dir) pairs.
#[derive(Debug, Default)]
pub struct DirQueue {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl DirQueue {
    /// Record a changed directory pair; duplicates collapse.
    pub fn push(&mut self, src_dir: &Path, dest_dir: &Path) {
        let pair = (src_dir.to_path_buf(), dest_dir.to_path_buf());
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Drain the queue in firing order: deepest destination first, ties in
    /// lexical order.
    pub fn drain_ordered(&mut self) -> Vec<(PathBuf, PathBuf)> {
        let mut pairs = std::mem::take(&mut self.pairs);
        pairs.sort_by(|a, b| {
            let len_a = a.1.as_os_str().len();
            let len_b = b.1.as_os_str().len();
            len_b.cmp(&len_a).then_with(|| a.1.cmp(&b.1)).then_with(|| a.0.cmp(&b.0))
        });
        pairs
    }
}

/// Run a configured command line through the shell, honoring dry-run.
///
/// The command file itself is checked first; a missing or non-executable
/// file is reported and nothing runs.
pub fn run_command(cmd: &str, report: &Report, envs: &[(String, String)]) {
    let Ok(words) = shell_words::split(cmd) else {
        report.error(&format!("syntax error in command '{cmd}'"));
        return;
    };
    let Some(cmdfile) = words.first() else {
        return;
    };

    match SyncStat::lstat(Path::new(cmdfile)) {
        Ok(stat) if !stat.exists() => {
            report.error(&format!("command {cmdfile} not found"));
            return;
        }
        Ok(stat) if !stat.is_exec() => {
            report.warning(&format!("file '{cmdfile}' is not executable"));
            return;
        }
        Ok(_) => {}
        Err(err) => {
            report.error(&format!("{cmdfile}: {err}"));
            return;
        }
    }

    shell_command(cmd, None, report, envs);
}

/// Run a command with the working directory set to `dest_dir`.
pub fn run_command_in_dir(
    dest_dir: &Path,
    cmd: &str,
    report: &Report,
    envs: &[(String, String)],
) {
    report.verbose(&format!("  in dir {}", dest_dir.display()));
    report.unix_out(&format!("cd {}", dest_dir.display()));

    // On a dry run the directory may not exist yet; the command is only
    // narrated anyway.
    if !report.dry_run && !dest_dir.is_dir() {
        report.error(&format!(
            "no such directory {} to run command in",
            dest_dir.display()
        ));
        return;
    }

    shell_command(cmd, Some(dest_dir), report, envs);
    report.unix_out("");
}

fn shell_command(cmd: &str, cwd: Option<&Path>, report: &Report, envs: &[(String, String)]) {
    let not_str = if report.dry_run { "not " } else { "" };
    if !report.quiet {
        report.info(&format!("{not_str}running command {cmd}"));
    }
    report.verbose(&report.dryrun_msg(&format!("  sh -c {cmd}")));
    report.unix_out(&format!("# run command {cmd}"));
    report.unix_out(cmd);
    report.terse(TerseCode::Exec, cmd.split_whitespace().next().unwrap_or(cmd));

    if report.dry_run {
        return;
    }

    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(cmd);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    for (key, value) in envs {
        command.env(key, value);
    }

    match command.status() {
        Ok(status) if !status.success() => {
            report.warning(&format!(
                "command '{cmd}' exited with status {}",
                status.code().unwrap_or(-1)
            ));
        }
        Ok(_) => {}
        Err(err) => {
            report.error(&format!("failed to run shell command '{cmd}': {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use synclib::paths::PrettyPath;
    use tempfile::tempdir;

    fn fixing_report(root: &Path) -> Report {
        let mut report = Report::new(PrettyPath::new(root, root, root));
        report.dry_run = false;
        report.quiet = true;
        report
    }

    #[test]
    fn deepest_destination_fires_first() {
        let mut queue = DirQueue::default();
        queue.push(Path::new("/repo/a/b"), Path::new("/a/b"));
        queue.push(Path::new("/repo/a/b/c"), Path::new("/a/b/c"));
        queue.push(Path::new("/repo/a"), Path::new("/a"));

        let order: Vec<_> = queue
            .drain_ordered()
            .into_iter()
            .map(|(_, dest)| dest)
            .collect();
        assert_eq!(
            order,
            [Path::new("/a/b/c"), Path::new("/a/b"), Path::new("/a")]
        );
    }

    #[test]
    fn equal_depth_ties_break_lexically() {
        let mut queue = DirQueue::default();
        queue.push(Path::new("/repo/z"), Path::new("/etc/z"));
        queue.push(Path::new("/repo/a"), Path::new("/etc/a"));

        let order: Vec<_> = queue
            .drain_ordered()
            .into_iter()
            .map(|(_, dest)| dest)
            .collect();
        assert_eq!(order, [Path::new("/etc/a"), Path::new("/etc/z")]);
    }

    #[test]
    fn duplicate_pairs_collapse() {
        let mut queue = DirQueue::default();
        queue.push(Path::new("/repo/a"), Path::new("/a"));
        queue.push(Path::new("/repo/a"), Path::new("/a"));
        assert_eq!(queue.drain_ordered().len(), 1);
    }

    #[test]
    fn same_destination_from_two_sources_keeps_both() {
        let mut queue = DirQueue::default();
        queue.push(Path::new("/repo/all/etc"), Path::new("/etc"));
        queue.push(Path::new("/repo/other/etc"), Path::new("/etc"));
        assert_eq!(queue.drain_ordered().len(), 2);
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut queue = DirQueue::default();
        queue.push(Path::new("/repo/a"), Path::new("/a"));
        let _ = queue.drain_ordered();
        assert!(queue.is_empty());
    }

    #[test]
    fn command_runs_in_the_given_directory() {
        let temp = tempdir().expect("tempdir");
        let workdir = temp.path().join("work");
        fs::create_dir(&workdir).expect("mkdir");
        let report = fixing_report(temp.path());

        run_command_in_dir(&workdir, "pwd > where.txt", &report, &[]);
        let recorded = fs::read_to_string(workdir.join("where.txt")).expect("read");
        assert_eq!(
            Path::new(recorded.trim()).file_name(),
            workdir.file_name()
        );
    }

    #[test]
    fn environment_reaches_the_command() {
        let temp = tempdir().expect("tempdir");
        let report = fixing_report(temp.path());
        let envs = vec![("SYNCTOOL_NODENAME".to_owned(), "web01".to_owned())];

        run_command_in_dir(
            temp.path(),
            "printf %s \"$SYNCTOOL_NODENAME\" > node.txt",
            &report,
            &envs,
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("node.txt")).expect("read"),
            "web01"
        );
    }

    #[test]
    fn dry_run_executes_nothing() {
        let temp = tempdir().expect("tempdir");
        let mut report = fixing_report(temp.path());
        report.dry_run = true;

        run_command_in_dir(temp.path(), "touch leaked.txt", &report, &[]);
        assert!(!temp.path().join("leaked.txt").exists());
    }

    #[test]
    fn missing_command_file_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let report = fixing_report(temp.path());
        // Would create the file if it ran; the pre-check refuses first.
        run_command(
            &format!("{}/nope.sh {}", temp.path().display(), temp.path().display()),
            &report,
            &[],
        );
        assert!(!temp.path().join("nope.sh").exists());
    }
}
