//! Command implementations

pub mod build;
pub mod clean;
pub mod config;
pub mod watch;
