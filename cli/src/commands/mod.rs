//! One-shot subcommands.

pub mod config;
pub mod forward;
pub mod namespaces;
pub mod resources;
