//! Command-line frontends for the three synctool binaries.
//!
//! Each frontend parses its flags, reads the configuration, and drives the
//! engine or the dispatcher, mapping every outcome onto a process exit
//! code. The `run()` entry points take their stdout and stderr as writers,
//! so the binaries hand in locked real streams while tests hand in byte
//! buffers and assert on what was printed.

use std::io::{self, Write};

pub mod client;
pub mod config_tool;
pub mod master;

pub use synclib::ExitCode;

/// Initialize tracing for a binary. `RUST_LOG` filters; masterlog events
/// from the dispatcher arrive under the `masterlog` target.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("synctool=info,masterlog=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

/// Print a line to the given writer, swallowing broken pipes.
pub(crate) fn say(out: &mut impl Write, msg: &str) {
    let _ = writeln!(out, "{msg}");
}

pub(crate) fn sayerr(err: &mut impl Write, msg: &str) {
    let _ = writeln!(err, "{msg}");
}

/// Split a comma-separated selector list into names.
pub(crate) fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::split_list;

    #[test]
    fn comma_lists_flatten() {
        let input = vec!["web01,web02".to_owned(), "db01".to_owned()];
        assert_eq!(split_list(&input), ["web01", "web02", "db01"]);
    }

    #[test]
    fn empty_segments_are_dropped() {
        let input = vec!["web01,,".to_owned()];
        assert_eq!(split_list(&input), ["web01"]);
    }
}
