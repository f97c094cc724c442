//! End-to-end CLI workflows

mod build;
mod config;
