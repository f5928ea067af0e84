//! Operator-facing output.
//!
//! Every action the engine takes is narrated through a [`Report`]: a plain
//! line on stdout, a shell-command rendition in unix-command mode, or a short
//! colorized token in terse mode. The report also knows whether the run is a
//! dry run and pads narration accordingly.
//!
//! Errors always go to stderr; everything else is mode-dependent. Output is
//! written with failures ignored so that piping into `head` does not bring
//! the run down.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

use crate::marker;
use crate::paths::PrettyPath;

/// One-token action labels for terse mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerseCode {
    Info,
    Warning,
    Error,
    Fail,
    Sync,
    Link,
    Mkdir,
    Delete,
    Owner,
    Mode,
    Exec,
    New,
    Type,
    DryRun,
    Fixing,
    Ok,
}

impl TerseCode {
    /// The token printed in front of the message.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Fail => "FAIL",
            Self::Sync => "sync",
            Self::Link => "link",
            Self::Mkdir => "mkdir",
            Self::Delete => "rm",
            Self::Owner => "chown",
            Self::Mode => "chmod",
            Self::Exec => "exec",
            Self::New => "new",
            Self::Type => "type",
            Self::DryRun => "DRYRUN",
            Self::Fixing => "FIXING",
            Self::Ok => "OK",
        }
    }

    /// Key into the configured action→color map.
    pub fn color_key(self) -> String {
        self.label().to_ascii_lowercase()
    }
}

/// ANSI SGR code for a configured color name.
pub fn color_code(name: &str) -> Option<u8> {
    Some(match name {
        "black" | "darkgray" => 30,
        "red" => 31,
        "green" => 32,
        "yellow" => 33,
        "blue" => 34,
        "magenta" => 35,
        "cyan" => 36,
        "white" => 37,
        "bold" => 1,
        "default" => 0,
        _ => return None,
    })
}

/// Default action→color assignments for terse mode.
pub fn default_terse_colors() -> HashMap<String, String> {
    [
        ("info", "default"),
        ("warn", "yellow"),
        ("error", "red"),
        ("fail", "red"),
        ("sync", "default"),
        ("link", "cyan"),
        ("mkdir", "blue"),
        ("rm", "yellow"),
        ("chown", "cyan"),
        ("chmod", "cyan"),
        ("exec", "green"),
        ("new", "blue"),
        ("type", "magenta"),
        ("dryrun", "default"),
        ("fixing", "default"),
        ("ok", "default"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

/// Output sink with the run's reporting modes.
#[derive(Debug, Clone)]
pub struct Report {
    pub dry_run: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub unix_cmd: bool,
    pub no_post: bool,
    pub masterlog: bool,
    pub syslogging: bool,
    pub colorize: bool,
    pub colorize_bright: bool,
    pub colorize_full_line: bool,
    pub terse_colors: HashMap<String, String>,
    pub paths: PrettyPath,
}

impl Report {
    pub fn new(paths: PrettyPath) -> Self {
        Self {
            dry_run: true,
            verbose: false,
            quiet: false,
            unix_cmd: false,
            no_post: false,
            masterlog: false,
            syslogging: false,
            colorize: false,
            colorize_bright: false,
            colorize_full_line: false,
            terse_colors: default_terse_colors(),
            paths,
        }
    }

    pub fn is_terse(&self) -> bool {
        self.paths.terse
    }

    /// Shortened rendition of a repository or destination path.
    pub fn pretty(&self, path: &Path) -> String {
        self.paths.pretty(path)
    }

    /// Unconditional line, for query-style output that must appear in every
    /// mode.
    pub fn print(&self, msg: &str) {
        print_line(msg);
    }

    /// Informational line; silent in unix-command and terse modes.
    pub fn info(&self, msg: &str) {
        if !self.unix_cmd && !self.is_terse() {
            print_line(msg);
        }
    }

    /// Conditional narration for `--verbose`.
    pub fn verbose(&self, msg: &str) {
        if self.verbose {
            print_line(msg);
        }
    }

    pub fn error(&self, msg: &str) {
        let _ = writeln!(io::stderr().lock(), "error: {msg}");
    }

    pub fn warning(&self, msg: &str) {
        let _ = writeln!(io::stderr().lock(), "warning: {msg}");
    }

    /// Equivalent shell command, printed only in unix-command mode.
    pub fn unix_out(&self, msg: &str) {
        if self.unix_cmd {
            print_line(msg);
        }
    }

    /// Short action token plus (terse-shortened) message, terse mode only.
    pub fn terse(&self, code: TerseCode, msg: &str) {
        if !self.is_terse() {
            return;
        }

        // Shorten the path, which is the last word of the message (or the
        // whole message when there is only one word).
        let msg = match msg.rsplit_once(' ') {
            Some((head, tail)) if tail.starts_with('/') => {
                format!("{head} {}", self.paths.terse_of(Path::new(tail)))
            }
            None if msg.starts_with('/') => self.paths.terse_of(Path::new(msg)),
            _ => msg.to_owned(),
        };

        let label = code.label();
        if self.colorize {
            let color = self
                .terse_colors
                .get(&code.color_key())
                .and_then(|name| color_code(name))
                .unwrap_or(0);
            let bright = if self.colorize_bright { ";1" } else { "" };
            if self.colorize_full_line {
                print_line(&format!("\x1b[{color}{bright}m{label} {msg}\x1b[0m"));
            } else {
                print_line(&format!("\x1b[{color}{bright}m{label}\x1b[0m {msg}"));
            }
        } else {
            print_line(&format!("{label} {msg}"));
        }
    }

    /// Append a `# dry run` tag, aligned to a column step, on dry runs.
    pub fn dryrun_msg(&self, msg: &str) -> String {
        if !self.dry_run {
            return msg.to_owned();
        }

        const TAG: &str = "# dry run";
        let used = msg.len() + 4;
        for step in 0..4 {
            let col = 79 + step * 20;
            if used + TAG.len() <= col {
                let pad = col - (used + TAG.len());
                return format!("{msg}{}{TAG}", " ".repeat(pad));
            }
        }
        format!("{msg}    {TAG}")
    }

    /// Ship a log message towards the master's syslog.
    ///
    /// On a dry run nothing is logged. Under `--masterlog` the message goes
    /// to stdout wearing the in-band marker for the master to pick up;
    /// stand-alone runs have no local syslog channel here.
    pub fn log(&self, msg: &str) {
        if self.dry_run || !self.syslogging {
            return;
        }
        if self.masterlog {
            print_line(&marker::log_line(msg));
        }
    }
}

fn print_line(msg: &str) {
    // A failed write (broken pipe when feeding head, say) must not abort the
    // reconciliation pass.
    let _ = writeln!(io::stdout().lock(), "{msg}");
}
