//! Garage door state watcher library
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;

/// Source revision captured at build time, `unknown` outside a git checkout
pub const GIT_HASH: &str = env!("GIT_HASH");
