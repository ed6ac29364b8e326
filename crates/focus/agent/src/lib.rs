//! Focus Agent
//!
//! macOS host for the focus enforcement engine.

pub mod accessibility;
pub mod config;
pub mod daemon;
pub mod host;
pub mod ipc;
pub mod launchd;

pub use config::Config;
