//! The in-band logging marker spoken from client to master.
//!
//! A client invoked with `--masterlog` has no side channel back to the
//! master, so log lines ride its stdout wearing a marker prefix. The grammar
//! is exactly `MARKER SP MSG`; the message `--` is a reserved heartbeat that
//! the master consumes without logging anything.

/// Prefix that tags a client stdout line as a log message.
pub const LOG_MARKER: &str = "%synctool-log%";

/// The reserved no-op message.
pub const HEARTBEAT: &str = "--";

/// Render `msg` as a marker line for the client's stdout.
pub fn log_line(msg: &str) -> String {
    format!("{LOG_MARKER} {msg}")
}

/// If `line` is a marker line, return its message.
///
/// The marker must be followed by exactly one space; anything else is
/// ordinary client output.
pub fn parse(line: &str) -> Option<&str> {
    line.strip_prefix(LOG_MARKER)
        .and_then(|rest| rest.strip_prefix(' '))
}

/// True when a parsed message is the heartbeat.
pub fn is_heartbeat(msg: &str) -> bool {
    msg == HEARTBEAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let line = log_line("finished run");
        assert_eq!(parse(&line), Some("finished run"));
    }

    #[test]
    fn ordinary_output_is_not_a_marker() {
        assert_eq!(parse("/etc/motd is up to date"), None);
        assert_eq!(parse("%synctool-log%missing-space"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn heartbeat_is_reserved() {
        let line = log_line(HEARTBEAT);
        let msg = parse(&line).expect("marker line");
        assert!(is_heartbeat(msg));
        assert!(!is_heartbeat("-- but not alone"));
    }

    #[test]
    fn empty_message_is_preserved() {
        assert_eq!(parse("%synctool-log% "), Some(""));
    }
}
