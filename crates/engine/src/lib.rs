//! The client-side reconciliation engine.
//!
//! A [`Session`] walks the overlay once, compares every chosen source
//! against its destination, applies the transitions (unless this is the
//! default dry run), and afterwards fires the post-scripts for every
//! directory whose contents changed, deepest first.
//!
//! Per-file failures are reported and the pass continues; only
//! configuration problems and overlay ambiguity stop a run before it
//! starts.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod client;
mod fsutil;
mod object;
mod post;

pub use client::Session;
pub use object::{Diff, ObjectKind, SyncObject};
pub use post::DirQueue;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that stop a client run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Overlay(#[from] overlay::OverlayError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Equal-priority sources collide on at least one destination. The
    /// colliding pairs have already been reported; the run applies nothing.
    #[error("ambiguous overlay entries, refusing to guess")]
    Ambiguous,

    /// A terse pattern matched more than one destination; the candidates
    /// have already been printed.
    #[error("multiple destinations match {0}")]
    MultipleMatches(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
