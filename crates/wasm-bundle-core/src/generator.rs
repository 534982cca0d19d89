//! The generator path: rewrite a parsed module for the bundle.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument};

use wasm_bundle_common::{BundleError, RewriteConfig};

use crate::init_func::{InitFunction, init_export_name};
use crate::parser::ParsedModule;
use crate::transform::RewritePipeline;
use crate::usage::{
    DependencyUsage, ExportUsage, Mangled, NamingPolicy, Preserve, resolve_used_dependencies,
};

/// A rewritten module and the contract its host glue must follow.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedModule {
    #[serde(skip)]
    pub binary: Vec<u8>,

    /// Export to call right after instantiation.
    pub init_export: String,

    /// `namespace.name` of the former global import each init parameter
    /// replaces, in parameter order.
    pub init_params: Vec<String>,

    /// Mangled names of the imports left in the mangled namespace, keyed by
    /// `namespace:name`.
    pub imports: Vec<(String, String)>,
}

/// Rewrite `parsed` according to the usage the module graph resolved.
///
/// # Errors
///
/// Fails if the configuration is invalid, if the init export name collides
/// with a retained export, or if any rewrite step fails. No partial output is
/// produced.
#[instrument(skip_all, fields(bytes_len = parsed.binary().len()))]
pub fn generate<U>(
    parsed: &ParsedModule,
    usage: &U,
    config: &RewriteConfig,
) -> Result<GeneratedModule, BundleError>
where
    U: ExportUsage + DependencyUsage,
{
    config.validate()?;
    let start = Instant::now();

    let module = parsed.module();
    let export_name = init_export_name(usage.used_export_count(), &config.init_fallback_name);
    let init = InitFunction::new(export_name, module);

    let mut naming: Box<dyn NamingPolicy> = if config.mangle_imports {
        Box::new(Mangled::default())
    } else {
        Box::new(Preserve)
    };
    let used = resolve_used_dependencies(&parsed.interface().dependencies, usage, naming.as_mut());

    let init_export = init.export_name.clone();
    let init_params = init
        .params
        .iter()
        .map(|p| format!("{}.{}", p.namespace, p.name))
        .collect();

    let mut imports: Vec<_> = used
        .iter()
        .map(|(key, dep)| (key.to_string(), dep.mangled_name.clone()))
        .collect();
    imports.sort();

    let pipeline = RewritePipeline::new(usage, &used, init);
    let binary = pipeline.run(parsed.binary().to_vec())?;

    info!(
        init_export = %init_export,
        imports = imports.len(),
        bytes_in = parsed.binary().len(),
        bytes_out = binary.len(),
        duration_us = start.elapsed().as_micros(),
        "Module rewritten"
    );

    Ok(GeneratedModule {
        binary,
        init_export,
        init_params,
        imports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::parser::parse;
    use crate::usage::{MANGLED_NAMESPACE, ModuleUsage};

    #[test]
    fn test_generate_with_unknown_usage_uses_fallback_name() {
        let bytes = wat::parse_str(r#"(module (func (export "run")))"#).unwrap();
        let parsed = parse(bytes).unwrap();

        let generated = generate(&parsed, &ModuleUsage::all(), &RewriteConfig::default()).unwrap();

        assert_eq!(generated.init_export, "__bundle_init__");
        let names: Vec<_> = decode(&generated.binary)
            .unwrap()
            .exports
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["run", "__bundle_init__"]);
    }

    #[test]
    fn test_generate_without_mangling_keeps_import_names() {
        let bytes = wat::parse_str(r#"(module (import "env" "log" (func (param i32))))"#).unwrap();
        let parsed = parse(bytes).unwrap();
        let config = RewriteConfig {
            mangle_imports: false,
            ..Default::default()
        };

        let generated = generate(&parsed, &ModuleUsage::all(), &config).unwrap();

        let imports = decode(&generated.binary).unwrap().imports;
        assert_eq!(imports[0].namespace, MANGLED_NAMESPACE);
        assert_eq!(imports[0].name, "log");
        assert_eq!(
            generated.imports,
            [("env:log".to_string(), "log".to_string())]
        );
    }

    #[test]
    fn test_generate_rejects_invalid_config() {
        let bytes = wat::parse_str("(module)").unwrap();
        let parsed = parse(bytes).unwrap();
        let config = RewriteConfig {
            init_fallback_name: String::new(),
            ..Default::default()
        };

        let err = generate(&parsed, &ModuleUsage::all(), &config).unwrap_err();
        assert!(matches!(err, BundleError::InvalidConfig { .. }));
    }

    #[test]
    fn test_generate_reports_init_params() {
        let bytes = wat::parse_str(
            r#"
            (module
                (import "env" "a" (global i32))
                (import "lib" "b" (global f32))
            )
            "#,
        )
        .unwrap();
        let parsed = parse(bytes).unwrap();

        let generated = generate(&parsed, &ModuleUsage::all(), &RewriteConfig::default()).unwrap();

        assert_eq!(generated.init_params, ["env.a", "lib.b"]);
        assert!(generated.imports.is_empty());
        wasmparser::validate(&generated.binary).unwrap();
    }
}
