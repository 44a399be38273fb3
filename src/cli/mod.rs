//! CLI argument parsing and command handlers

pub mod args;
pub mod router;

pub use args::{Cli, Commands};
pub use router::execute_command;
