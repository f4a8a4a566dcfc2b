//! Process execution subsystem.
//!
//! `runner` spawns external commands with timeout enforcement and outcome
//! normalization; `sanitize` holds the allow-list filters that untrusted
//! input must pass before it may appear anywhere near a shell.

mod runner;
pub mod sanitize;

pub use runner::{
    CommandRunner, ExecError, ExecutionOutcome, RunOptions, DEFAULT_TIMEOUT, MAX_TIMEOUT,
};
