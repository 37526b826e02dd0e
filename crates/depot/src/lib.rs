//! depot command-line application.
//!
//! The binary is a thin wrapper: [`cli`] parses arguments and layers them over
//! `depot.toml`, [`commands`] runs the request against the library crates, and
//! [`tracing`] configures log output.

pub mod cli;
pub mod commands;
pub mod tracing;

pub use cli::{Cli, Commands};
pub use commands::{CommandOutput, execute, render};
