//! Configuration for the rewriting pipeline.

use serde::{Deserialize, Serialize};

/// Settings that shape how a module is rewritten for the bundle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// Replace import names with short bundle-unique identifiers.
    ///
    /// When disabled, retained imports keep their original name and only
    /// move into the shared mangled namespace.
    #[serde(default = "defaults::mangle_imports")]
    pub mangle_imports: bool,

    /// Export name of the synthesized init function when the number of
    /// observed exports is unknown.
    #[serde(default = "defaults::init_fallback_name")]
    pub init_fallback_name: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            mangle_imports: defaults::mangle_imports(),
            init_fallback_name: defaults::init_fallback_name(),
        }
    }
}

impl RewriteConfig {
    /// Check that the configuration can produce a valid module.
    pub fn validate(&self) -> Result<(), crate::BundleError> {
        if self.init_fallback_name.is_empty() {
            return Err(crate::BundleError::invalid_config(
                "init_fallback_name must not be empty",
            ));
        }
        Ok(())
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn mangle_imports() -> bool {
        true
    }

    pub fn init_fallback_name() -> String {
        "__bundle_init__".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RewriteConfig::default();

        assert!(config.mangle_imports);
        assert_eq!(config.init_fallback_name, "__bundle_init__");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"mangle_imports": false}"#;
        let config: RewriteConfig = serde_json::from_str(json).unwrap();

        assert!(!config.mangle_imports);
        assert_eq!(config.init_fallback_name, "__bundle_init__");
    }

    #[test]
    fn test_empty_fallback_name_rejected() {
        let config = RewriteConfig {
            init_fallback_name: String::new(),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
