//! Shared plumbing for the synctool suite.
//!
//! This crate carries the pieces every other synctool crate leans on: the
//! lazy [`SyncStat`] view of a filesystem path, path hygiene and the terse
//! path syntax, the operator [`Report`](report::Report) output layer, exit
//! codes, and the masterlog marker grammar spoken between the master and its
//! clients.

pub mod command;
pub mod exit_code;
pub mod marker;
pub mod paths;
pub mod report;
pub mod stat;
pub mod terse;

pub use exit_code::ExitCode;
pub use report::{Report, TerseCode};
pub use stat::SyncStat;
