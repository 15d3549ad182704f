//! CLI module for the Gosling tool.
//!
//! This module provides the command-line interface for validating Fly
//! configuration and deploying eggs through `MotherGoose`.

mod commands;
mod output;

pub use commands::{AddCommands, ApiArgs, Cli, Commands, LogFormat, OutputFormat};
pub use output::{FileValidation, OutputFormatter};
