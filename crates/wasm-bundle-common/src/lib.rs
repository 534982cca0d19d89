//! Common types, errors, and configuration for wasm-bundle.
//!
//! This crate provides shared functionality used across the wasm-bundle workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Rewrite configuration
//! - The TOML bundle manifest describing which modules to rewrite and how
//!   their imports and exports are used downstream

pub mod config;
pub mod config_file;
pub mod error;

pub use config::RewriteConfig;
pub use config_file::{ConfigFile, ConfigFileError, ModuleEntry, UsedExport};
pub use error::BundleError;
