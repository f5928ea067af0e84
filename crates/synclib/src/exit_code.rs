//! Process exit codes for the synctool binaries.
//!
//! A run that applied (or would apply) every change cleanly exits 0. Usage
//! mistakes and overlay ambiguity exit 1, configuration problems exit 2, and
//! a pass that continued past per-file failures exits 4. An interrupted
//! master run exits with the conventional 130.

use std::fmt;

/// Exit codes used across the synctool suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean run.
    Ok = 0,
    /// Command-line usage error, or the overlay resolver refused to guess
    /// between equal-priority sources.
    Usage = 1,
    /// Fatal configuration error before the pass started.
    Config = 2,
    /// One or more per-file operations failed; the pass continued.
    PartialSync = 4,
    /// Interrupted by the operator.
    Interrupted = 130,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Usage => "usage error or ambiguous overlay",
            Self::Config => "configuration error",
            Self::PartialSync => "some files failed to sync",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.as_i32().clamp(0, 255) as u8)
    }
}
