//! CLI command implementations

pub mod config;
pub mod demo;
#[cfg(windows)]
pub mod watch;
