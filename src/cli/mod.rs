//! Command-line interface for promptsmith.
//!
//! Provides commands for optimizing and scoring prompts, and for recording
//! and searching prompt outcomes.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, EmbedderKind};
