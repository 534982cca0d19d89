//! The ordered rewrite pipeline.
//!
//! Each [`RewriteStep`] takes a complete binary and returns a complete binary.
//! The order is fixed:
//!
//! 1. rename observed exports, drop the rest
//! 2. remove the start section
//! 3. turn imported globals into internal mutable globals
//! 4. move used imports into the mangled namespace, drop unused memories
//!    and tables
//! 5. append the init function
//!
//! Step 5 bakes in indices computed from the original module, and step 3 keeps
//! every global index stable, so the steps cannot be reordered.

use std::fmt;

use tracing::{debug, instrument};
use wasm_encoder::{ConstExpr, Encode, ExportSection, GlobalSection, GlobalType, RefType, SectionId};

use wasm_bundle_common::BundleError;

use crate::decoder::{ImportDescriptor, ValueType, decode};
use crate::edit::{Entries, SectionEditor, skip_name};
use crate::init_func::InitFunction;
use crate::usage::{ExportUsage, MANGLED_NAMESPACE, UsedDependencyMap};

/// One buffer-to-buffer transform.
pub enum RewriteStep<'a> {
    RewriteExportNames(&'a dyn ExportUsage),
    RemoveStartFunction,
    InternalizeImportedGlobals,
    RewriteImports(&'a UsedDependencyMap),
    AddInitFunction(InitFunction),
}

impl RewriteStep<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RewriteExportNames(_) => "rewrite-export-names",
            Self::RemoveStartFunction => "remove-start-function",
            Self::InternalizeImportedGlobals => "internalize-imported-globals",
            Self::RewriteImports(_) => "rewrite-imports",
            Self::AddInitFunction(_) => "add-init-function",
        }
    }

    pub fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, BundleError> {
        match self {
            Self::RewriteExportNames(usage) => rewrite_export_names(bytes, *usage),
            Self::RemoveStartFunction => remove_start_function(bytes),
            Self::InternalizeImportedGlobals => internalize_imported_globals(bytes),
            Self::RewriteImports(used) => rewrite_imports(bytes, used),
            Self::AddInitFunction(init) => init.apply(bytes),
        }
    }
}

impl fmt::Debug for RewriteStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The five rewrite steps, in the only order that keeps indices valid.
#[derive(Debug)]
pub struct RewritePipeline<'a> {
    steps: Vec<RewriteStep<'a>>,
}

impl<'a> RewritePipeline<'a> {
    pub fn new(
        exports: &'a dyn ExportUsage,
        used_dependencies: &'a UsedDependencyMap,
        init: InitFunction,
    ) -> Self {
        Self {
            steps: vec![
                RewriteStep::RewriteExportNames(exports),
                RewriteStep::RemoveStartFunction,
                RewriteStep::InternalizeImportedGlobals,
                RewriteStep::RewriteImports(used_dependencies),
                RewriteStep::AddInitFunction(init),
            ],
        }
    }

    pub fn steps(&self) -> &[RewriteStep<'a>] {
        &self.steps
    }

    /// Run every step. The first failure aborts the whole rewrite.
    #[instrument(skip_all, fields(bytes_len = binary.len()))]
    pub fn run(&self, binary: Vec<u8>) -> Result<Vec<u8>, BundleError> {
        self.steps.iter().try_fold(binary, |bytes, step| {
            let out = step.apply(&bytes)?;
            debug!(
                step = step.name(),
                before = bytes.len(),
                after = out.len(),
                "Rewrite step applied"
            );
            Ok(out)
        })
    }
}

/// Rename exports to their observed names and drop unobserved ones.
///
/// Kept exports are re-encoded from the decoded kind and index, which leaves
/// every index in canonical numeric form.
pub fn rewrite_export_names(
    bytes: &[u8],
    usage: &dyn ExportUsage,
) -> Result<Vec<u8>, BundleError> {
    let module = decode(bytes)?;
    if !module.has_section(SectionId::Export) {
        return Ok(bytes.to_vec());
    }

    let mut exports = ExportSection::new();
    for export in &module.exports {
        match usage.used_name(&export.name) {
            Some(used_name) => {
                exports.export(&used_name, export.kind.into(), export.index);
            }
            None => debug!(name = %export.name, "Export not observed, removing"),
        }
    }

    let mut editor = SectionEditor::new(bytes, &module);
    editor.replace_entries(SectionId::Export, Entries::from_encoded(&exports)?);
    Ok(editor.finish())
}

/// Drop the start section; the init function calls the start function instead.
pub fn remove_start_function(bytes: &[u8]) -> Result<Vec<u8>, BundleError> {
    let module = decode(bytes)?;
    let mut editor = SectionEditor::new(bytes, &module);
    if !editor.remove(SectionId::Start) {
        return Ok(bytes.to_vec());
    }
    Ok(editor.finish())
}

/// Replace each global import with a mutable, zero-initialized global of the
/// same type.
///
/// Imported globals precede defined ones in the index space, so the new
/// globals go to the front of the global section in import order and every
/// existing global index keeps naming the same global.
pub fn internalize_imported_globals(bytes: &[u8]) -> Result<Vec<u8>, BundleError> {
    let module = decode(bytes)?;

    let mut kept = Entries::new();
    let mut globals = GlobalSection::new();
    for import in &module.imports {
        match import.descriptor {
            ImportDescriptor::Global { value_type, .. } => {
                globals.global(
                    GlobalType {
                        val_type: value_type.to_encoder()?,
                        mutable: true,
                        shared: false,
                    },
                    &zero_value(value_type)?,
                );
            }
            _ => kept.push(&bytes[import.entry.clone()]),
        }
    }

    if globals.is_empty() {
        return Ok(bytes.to_vec());
    }

    debug!(count = globals.len(), "Internalizing imported globals");

    let mut editor = SectionEditor::new(bytes, &module);
    editor.replace_entries(SectionId::Import, kept);
    editor.prepend_entries(SectionId::Global, Entries::from_encoded(&globals)?)?;
    Ok(editor.finish())
}

/// Initializer for an internalized global.
fn zero_value(value_type: ValueType) -> Result<ConstExpr, BundleError> {
    Ok(match value_type {
        ValueType::I32 => ConstExpr::i32_const(0),
        ValueType::I64 => ConstExpr::i64_const(0),
        ValueType::F32 => ConstExpr::f32_const(0.0_f32.into()),
        ValueType::F64 => ConstExpr::f64_const(0.0_f64.into()),
        ValueType::V128 => ConstExpr::v128_const(0),
        ValueType::FuncRef => ConstExpr::ref_null(RefType::FUNCREF.heap_type),
        ValueType::ExternRef => ConstExpr::ref_null(RefType::EXTERNREF.heap_type),
        ValueType::Ref => {
            return Err(BundleError::UnsupportedGlobalType {
                value_type: value_type.to_string(),
            });
        }
    })
}

/// Move used imports into the mangled namespace under their mangled names and
/// drop every memory or table import the map does not know.
///
/// A function import missing from the map is an error: dropping it would
/// shift every function index after it, including the ones the init function
/// bakes in.
pub fn rewrite_imports(bytes: &[u8], used: &UsedDependencyMap) -> Result<Vec<u8>, BundleError> {
    let module = decode(bytes)?;
    if !module.has_section(SectionId::Import) {
        return Ok(bytes.to_vec());
    }

    let mut kept = Entries::new();
    for import in &module.imports {
        let Some(dep) = used.get(&import.namespace, &import.name) else {
            if import.is_function() {
                return Err(BundleError::UnresolvedFunctionImport {
                    namespace: import.namespace.clone(),
                    name: import.name.clone(),
                });
            }
            debug!(
                namespace = %import.namespace,
                name = %import.name,
                kind = import.descriptor.kind_name(),
                "Removing unused import"
            );
            continue;
        };

        let descriptor = skip_name(&bytes[import.entry.clone()])
            .and_then(skip_name)
            .ok_or_else(|| BundleError::malformed("import", "truncated import entry"))?;

        let mut entry = Vec::with_capacity(descriptor.len() + dep.mangled_name.len() + 4);
        MANGLED_NAMESPACE.encode(&mut entry);
        dep.mangled_name.as_str().encode(&mut entry);
        entry.extend_from_slice(descriptor);
        kept.push(&entry);
    }

    let mut editor = SectionEditor::new(bytes, &module);
    editor.replace_entries(SectionId::Import, kept);
    Ok(editor.finish())
}
