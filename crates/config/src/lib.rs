//! Configuration for the batch audio transcoder
//!
//! Handles loading configuration from TOML files, environment variable overrides,
//! and validation of per-run parameters.

pub mod config;

pub use config::*;
