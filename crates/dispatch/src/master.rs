//! Fan the repository and the client invocation out across the fleet.
//!
//! Per target node the worker runs two sequential jobs: rsync the masterdir
//! onto the node (unless `--skip-rsync`), then invoke the remote client over
//! ssh with the operator's flags passed through verbatim. Every output line
//! is prefixed with the node it came from; lines wearing the in-band
//! masterlog marker are consumed here and forwarded to syslog instead.

use std::io::{self, BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use config::{Config, NodeSet, NodeTarget};
use synclib::marker;

use crate::pool::{cancel_flag, install_interrupt_handler, run_parallel};
use crate::DispatchResult;

/// Master-side dispatch options.
#[derive(Debug, Clone, Default)]
pub struct MasterOptions {
    /// Do not rsync the repository first (shared filesystem deployments).
    pub skip_rsync: bool,
    /// Client flags to pass through verbatim.
    pub pass_args: Vec<String>,
}

/// Run the two-job sequence on every target node through the worker pool.
pub fn run_on_nodes(
    config: &Config,
    nodeset: &NodeSet,
    options: &MasterOptions,
) -> DispatchResult<()> {
    let rsync_cmd = if options.skip_rsync {
        None
    } else {
        Some(config.resolve_command("rsync_cmd", config.commands.rsync_cmd.as_deref())?)
    };
    let ssh_cmd = config.resolve_command("ssh_cmd", config.commands.ssh_cmd.as_deref())?;
    let synctool_cmd =
        config.resolve_command("synctool_cmd", config.commands.synctool_cmd.as_deref())?;

    install_interrupt_handler()?;

    let masterdir = config.masterdir.display().to_string();
    let targets = nodeset.targets.clone();

    run_parallel(
        |target: NodeTarget| {
            node_worker(
                &target,
                &masterdir,
                rsync_cmd.as_deref(),
                &ssh_cmd,
                &synctool_cmd,
                &options.pass_args,
            );
        },
        targets,
        config.num_proc,
        Duration::from_secs(config.sleep_time),
        cancel_flag(),
    )
}

/// The unit of work for one node: rsync, then the remote client.
fn node_worker(
    target: &NodeTarget,
    masterdir: &str,
    rsync_cmd: Option<&str>,
    ssh_cmd: &str,
    synctool_cmd: &str,
    pass_args: &[String],
) {
    use std::sync::atomic::Ordering;

    if let Some(rsync) = rsync_cmd {
        let Ok(mut words) = shell_words::split(rsync) else {
            return;
        };
        words.push(format!("{masterdir}/"));
        words.push(format!("{}:{masterdir}/", target.address));
        run_with_nodename(&words, &target.nodename);
    }

    if cancel_flag().load(Ordering::SeqCst) {
        return;
    }

    let Ok(mut words) = shell_words::split(ssh_cmd) else {
        return;
    };
    words.push(target.address.clone());
    match shell_words::split(synctool_cmd) {
        Ok(remote) => words.extend(remote),
        Err(_) => return,
    }
    words.push("--nodename".to_owned());
    words.push(target.nodename.clone());
    words.push("--masterlog".to_owned());
    words.extend(pass_args.iter().cloned());
    run_with_nodename(&words, &target.nodename);
}

/// Run a command and print its output with `<nodename>: ` in front of each
/// line. Masterlog marker lines are intercepted: the heartbeat is dropped,
/// anything else is forwarded to syslog tagged with the node.
pub fn run_with_nodename(cmd_words: &[String], nodename: &str) {
    let Some((program, args)) = cmd_words.split_first() else {
        return;
    };

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            let _ = writeln!(
                io::stderr().lock(),
                "error: failed to run command {program}: {err}"
            );
            return;
        }
    };

    // Stderr is pumped on the side so neither pipe can fill up and stall
    // the child; lines from both streams carry the node prefix.
    let stderr_thread = child.stderr.take().map(|handle| {
        let nodename = nodename.to_owned();
        thread::spawn(move || {
            for line in BufReader::new(handle).lines().map_while(Result::ok) {
                say(&format!("{nodename}: {line}"));
            }
        })
    });

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            match marker::parse(&line) {
                Some(msg) if marker::is_heartbeat(msg) => {}
                Some(msg) => {
                    tracing::info!(target: "masterlog", node = nodename, "{msg}");
                }
                None => say(&format!("{nodename}: {line}")),
            }
        }
    }

    if let Some(handle) = stderr_thread {
        let _ = handle.join();
    }
    let _ = child.wait();
}

/// Whole-line atomic write; lines from different nodes may interleave, but
/// never mid-line.
fn say(line: &str) {
    let _ = writeln!(io::stdout().lock(), "{line}");
}
