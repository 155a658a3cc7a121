//! CLI commands.

pub mod config;
pub mod ids;
pub mod wait;
