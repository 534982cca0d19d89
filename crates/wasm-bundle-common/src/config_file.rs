//! Bundle manifest structures.
//!
//! This module defines structures for TOML manifest files:
//! - [`ConfigFile`]: Top-level manifest structure
//! - [`ModuleEntry`]: One module to rewrite, with its resolved usage
//! - [`UsedExport`]: An export observed downstream

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RewriteConfig;

/// Top-level manifest file structure.
///
/// The manifest carries what the bundler's dependency graph resolved for each
/// module: which exports are observed and which imports could not be linked.
///
/// # Example
///
/// ```toml
/// [rewrite]
/// mangle_imports = true
///
/// [[modules]]
/// id = "math"
/// path = "./math.wasm"
/// output = "./dist/math.wasm"
/// used_exports = [{ name = "add", used_name = "a" }, { name = "sub" }]
/// unresolved_imports = ["env:missing"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Rewrite settings shared by every module.
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Modules to rewrite.
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

impl ConfigFile {
    /// Load a manifest from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content)?;
        debug!(
            path = %path.as_ref().display(),
            modules = config.modules.len(),
            "Manifest loaded"
        );
        Ok(config)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// A module entry in the manifest.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleEntry {
    /// Unique identifier for the module.
    pub id: String,

    /// Path to the input WebAssembly binary.
    pub path: String,

    /// Where to write the rewritten binary.
    ///
    /// Defaults to the input path with a `.bundle.wasm` extension.
    #[serde(default)]
    pub output: Option<String>,

    /// Exports observed downstream.
    ///
    /// `None` means usage is unknown: every export is kept under its own name
    /// and the init function gets the fallback name.
    #[serde(default)]
    pub used_exports: Option<Vec<UsedExport>>,

    /// Imports the dependency graph could not resolve, as `namespace:name`.
    #[serde(default)]
    pub unresolved_imports: Vec<String>,
}

impl ModuleEntry {
    /// Output path for the rewritten binary.
    pub fn output_path(&self) -> String {
        match &self.output {
            Some(output) => output.clone(),
            None => Path::new(&self.path)
                .with_extension("bundle.wasm")
                .display()
                .to_string(),
        }
    }
}

/// An export observed by other modules of the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UsedExport {
    /// Export name in the original module.
    pub name: String,

    /// Name the bundle refers to it by. Defaults to `name`.
    #[serde(default)]
    pub used_name: Option<String>,
}

impl UsedExport {
    /// The name this export carries in the rewritten module.
    pub fn external_name(&self) -> &str {
        self.used_name.as_deref().unwrap_or(&self.name)
    }
}

/// Manifest file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read manifest file.
    #[error("Failed to read manifest '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse manifest file.
    #[error("Failed to parse manifest: {message}")]
    Parse { message: String },
}
