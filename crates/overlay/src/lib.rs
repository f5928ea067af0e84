//! Group-aware overlay resolution.
//!
//! Filenames in the repository carry a trailing group suffix
//! (`motd._web`); a client walks the tree once and, for every destination
//! path, keeps the single candidate whose suffix ranks highest in its own
//! group list. Two candidates tied at the best rank make the destination
//! ambiguous, and the run refuses to guess.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod find;
mod suffix;
mod walk;

pub use find::{find_dest, FindResult};
pub use suffix::{split_group, SuffixResult};
pub use walk::{walk, OverlayEntry, PostScript, Resolved};

/// Result type for overlay resolution.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Errors raised while walking the repository.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The walk could not read part of the tree.
    #[error("error walking {dir}: {source}")]
    Walk {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The subtree root itself could not be listed.
    #[error("error reading {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}
