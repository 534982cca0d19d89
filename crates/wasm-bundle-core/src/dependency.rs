//! Classification of a module's imports and exports.
//!
//! Every import becomes an [`ImportDependency`] registered with the bundler's
//! module graph. Imports that cannot be linked by name through the shared
//! mangled namespace carry a [`DirectOnlyReason`]; they are not errors here,
//! the graph decides whether it can link them structurally.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::decoder::{DecodedModule, FuncSignature, ImportDescriptor, ModuleImport, ValueType};

/// Where in a signature an incompatible type appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePosition {
    Parameter,
    Result,
}

impl fmt::Display for SignaturePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parameter => "parameter",
            Self::Result => "result",
        })
    }
}

/// Why an import can only be linked directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DirectOnlyReason {
    /// Memories are shared structurally, not by name.
    Memory,
    /// Tables are shared structurally, not by name.
    Table,
    /// The signature uses a type the host calling convention cannot carry.
    IncompatibleSignature {
        value_type: ValueType,
        position: SignaturePosition,
    },
}

impl fmt::Display for DirectOnlyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Table => f.write_str("Table"),
            Self::IncompatibleSignature {
                value_type,
                position,
            } => write!(
                f,
                "Host-incompatible function signature ({value_type} as {position})"
            ),
        }
    }
}

/// A dependency on another module of the bundle, one per import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportDependency {
    pub namespace: String,
    pub name: String,
    pub descriptor: ImportDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_only: Option<DirectOnlyReason>,
}

impl ImportDependency {
    fn from_import(import: &ModuleImport) -> Self {
        Self {
            namespace: import.namespace.clone(),
            name: import.name.clone(),
            descriptor: import.descriptor.clone(),
            direct_only: classify(&import.descriptor),
        }
    }

    /// Key under which the dependency is looked up, `namespace:name`.
    pub fn key(&self) -> String {
        dependency_key(&self.namespace, &self.name)
    }

    pub fn is_direct_only(&self) -> bool {
        self.direct_only.is_some()
    }
}

/// Build the `namespace:name` lookup key.
pub fn dependency_key(namespace: &str, name: &str) -> String {
    format!("{namespace}:{name}")
}

/// What a module needs from and offers to the rest of the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleInterface {
    /// One entry per import, in declaration order.
    pub dependencies: Vec<ImportDependency>,
    /// Export names, in declaration order.
    pub provided_exports: Vec<String>,
}

/// Decide whether an import must be linked directly.
pub fn classify(descriptor: &ImportDescriptor) -> Option<DirectOnlyReason> {
    match descriptor {
        ImportDescriptor::Memory => Some(DirectOnlyReason::Memory),
        ImportDescriptor::Table => Some(DirectOnlyReason::Table),
        ImportDescriptor::Function(signature) => incompatible_type(signature),
        ImportDescriptor::Global { .. } => None,
    }
}

fn incompatible_type(signature: &FuncSignature) -> Option<DirectOnlyReason> {
    let offending = |types: &[ValueType], position| {
        types
            .iter()
            .find(|ty| !ty.is_host_interop_safe())
            .map(|&value_type| DirectOnlyReason::IncompatibleSignature {
                value_type,
                position,
            })
    };

    offending(&signature.params, SignaturePosition::Parameter)
        .or_else(|| offending(&signature.results, SignaturePosition::Result))
}

/// Walk a decoded module and list its dependencies and exports.
pub fn extract(module: &DecodedModule) -> ModuleInterface {
    let dependencies: Vec<_> = module
        .imports
        .iter()
        .map(ImportDependency::from_import)
        .collect();

    for dep in dependencies.iter().filter(|d| d.is_direct_only()) {
        debug!(
            namespace = %dep.namespace,
            name = %dep.name,
            reason = %dep.direct_only.map(|r| r.to_string()).unwrap_or_default(),
            "Import can only be linked directly"
        );
    }

    ModuleInterface {
        dependencies,
        provided_exports: module.exports.iter().map(|e| e.name.clone()).collect(),
    }
}
