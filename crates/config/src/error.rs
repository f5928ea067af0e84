//! Configuration error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fatal configuration problems, raised before any pass starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read at all.
    #[error("failed to read {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One or more problems in the config file or the repository layout it
    /// describes. Every problem is listed, the way the operator expects to
    /// fix them in one edit.
    #[error("{file}: {}", problems.join("\n"))]
    Invalid { file: PathBuf, problems: Vec<String> },

    /// A configured command is missing or not executable.
    #[error("{file}: {param} '{cmd}' not found in PATH")]
    CommandNotFound {
        file: PathBuf,
        param: &'static str,
        cmd: String,
    },

    /// A configured command parameter is absent but required by the action.
    #[error("{file}: parameter '{param}' is missing")]
    CommandMissing { file: PathBuf, param: &'static str },

    /// A node or group named on the command line is not defined.
    #[error("no such node or group '{0}' defined")]
    UnknownSelector(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lists_every_problem() {
        let err = ConfigError::Invalid {
            file: PathBuf::from("/etc/synctool.conf"),
            problems: vec![
                "line 3: unknown keyword 'masterdur'".to_owned(),
                "no such directory: /var/lib/synctool/overlay".to_owned(),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("/etc/synctool.conf: "));
        assert!(text.contains("masterdur"));
        assert!(text.contains("overlay"));
    }

    #[test]
    fn command_not_found_names_the_parameter() {
        let err = ConfigError::CommandNotFound {
            file: PathBuf::from("synctool.conf"),
            param: "diff_cmd",
            cmd: "xdiff".to_owned(),
        };
        assert!(err.to_string().contains("diff_cmd 'xdiff' not found"));
    }
}
