//! The parser path: decode a module once and extract what the module graph
//! needs to know about it.

use serde::Serialize;
use tracing::{info, instrument};

use wasm_bundle_common::BundleError;

use crate::decoder::{DecodedModule, decode};
use crate::dependency::{ModuleInterface, extract};

/// How other modules see this module's exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportsType {
    /// Exports form a namespace object; there is no default export.
    Namespace,
}

/// A module decoded for bundling.
///
/// Keeps the original binary and its decoded structure so the generator path
/// does not decode the input a second time.
#[derive(Debug, Clone)]
pub struct ParsedModule {
    binary: Vec<u8>,
    module: DecodedModule,
    interface: ModuleInterface,
}

impl ParsedModule {
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    pub fn module(&self) -> &DecodedModule {
        &self.module
    }

    /// Dependencies and provided exports to register with the module graph.
    pub fn interface(&self) -> &ModuleInterface {
        &self.interface
    }

    pub fn exports_type(&self) -> ExportsType {
        ExportsType::Namespace
    }
}

/// Decode `binary` and classify its imports and exports.
///
/// # Errors
///
/// Returns an error if the binary cannot be decoded.
#[instrument(skip_all, fields(bytes_len = binary.len()))]
pub fn parse(binary: Vec<u8>) -> Result<ParsedModule, BundleError> {
    let module = decode(&binary)?;
    let interface = extract(&module);

    info!(
        dependencies = interface.dependencies.len(),
        direct_only = interface
            .dependencies
            .iter()
            .filter(|d| d.is_direct_only())
            .count(),
        exports = interface.provided_exports.len(),
        "Module parsed"
    );

    Ok(ParsedModule {
        binary,
        module,
        interface,
    })
}
