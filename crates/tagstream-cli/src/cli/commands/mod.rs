//! CLI command handlers.

pub mod config;
pub mod parse;
pub mod watch;
