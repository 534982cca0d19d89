//! Error types for wasm-bundle.
//!
//! [`BundleError`] covers every failure the rewriting core can report. Decode
//! failures are fatal build errors: the input is a static artifact, so nothing
//! is ever retried.

use thiserror::Error;

/// Errors produced while decoding, classifying, or rewriting a module.
#[derive(Error, Debug)]
pub enum BundleError {
    /// The binary could not be decoded.
    #[error("Failed to decode WebAssembly module: {reason}")]
    Decode {
        /// The decoder's description of the failure.
        reason: String,
    },

    /// The binary is not a core module (e.g. it is a component).
    #[error("Unsupported binary encoding: expected a core module, found {found}")]
    UnsupportedEncoding {
        /// What the decoder found instead.
        found: String,
    },

    /// An import kind that has no place in bundle linkage.
    #[error("Unsupported import {namespace}.{name}: {kind} imports cannot be bundled")]
    UnsupportedImport {
        /// Import namespace (module field).
        namespace: String,
        /// Import name.
        name: String,
        /// The import kind, e.g. `tag`.
        kind: String,
    },

    /// A function import refers to a type index that does not exist or is not
    /// a function type.
    #[error("Unknown function type index {index}")]
    UnknownType {
        /// The offending type index.
        index: u32,
    },

    /// A section's contents did not have the expected shape during editing.
    #[error("Malformed {section} section: {reason}")]
    MalformedSection {
        /// Section name.
        section: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// A global import whose value type cannot be given a zero initializer.
    #[error("Cannot internalize imported global of type {value_type}")]
    UnsupportedGlobalType {
        /// Display form of the value type.
        value_type: String,
    },

    /// The synthesized init function's export name is already taken.
    #[error("Init function export name '{name}' collides with an existing export")]
    InitExportCollision {
        /// The colliding export name.
        name: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A function import the bundle cannot link. Removing it would shift the
    /// function index space under every later reference.
    #[error("Function import {namespace}.{name} is not resolved by the bundle")]
    UnresolvedFunctionImport {
        /// Import namespace (module field).
        namespace: String,
        /// Import name.
        name: String,
    },
}

impl BundleError {
    /// Create a new `Decode` error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a new `MalformedSection` error.
    pub fn malformed(section: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedSection {
            section,
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the input binary itself was rejected by the decoder.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::UnsupportedEncoding { .. } | Self::UnknownType { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BundleError::decode("unexpected end-of-file (at offset 0x8)");
        assert_eq!(
            err.to_string(),
            "Failed to decode WebAssembly module: unexpected end-of-file (at offset 0x8)"
        );

        let err = BundleError::UnsupportedImport {
            namespace: "env".into(),
            name: "boom".into(),
            kind: "tag".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported import env.boom: tag imports cannot be bundled"
        );
    }

    #[test]
    fn test_unresolved_function_import_display() {
        let err = BundleError::UnresolvedFunctionImport {
            namespace: "env".into(),
            name: "gone".into(),
        };

        assert_eq!(
            err.to_string(),
            "Function import env.gone is not resolved by the bundle"
        );
        assert!(!err.is_decode_failure());
    }

    #[test]
    fn test_is_decode_failure() {
        assert!(BundleError::decode("bad magic").is_decode_failure());
        assert!(BundleError::UnknownType { index: 3 }.is_decode_failure());
        assert!(!BundleError::malformed("export", "truncated").is_decode_failure());
        assert!(!BundleError::invalid_config("empty name").is_decode_failure());
    }
}
