//! Master-side parallel dispatch.
//!
//! A bounded pool of workers fans a unit of work out across the fleet; the
//! master's unit of work is "rsync the repository to one node, then invoke
//! the client there over ssh". Output comes back line by line, each line
//! prefixed with the node it came from.

use thiserror::Error;

mod master;
mod pool;

pub use master::{run_on_nodes, MasterOptions};
pub use pool::{cancel_flag, install_interrupt_handler, run_parallel};

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors raised by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The operator interrupted the run; workers have been wound down.
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("failed to install interrupt handler: {0}")]
    Signal(String),
}
