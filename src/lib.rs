//! lab-intake - artifact intake, bounded previews, sandboxed script execution
//! and an ad-hoc SQL console.
//!
//! This library exposes the core modules to the `intake` binary and to
//! integration tests.

pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod pipeline;
pub mod preview;
pub mod query;
pub mod safety;
pub mod sandbox;
pub mod store;
