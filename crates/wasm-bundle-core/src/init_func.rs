//! Synthesis of the explicit init function.
//!
//! Rewritten modules have no start section and no global imports. Instead they
//! export an init function that host glue calls right after instantiation,
//! before anything else runs:
//!
//! ```wat
//! (func $init (export "<name>") (param $base i32) (param $scale f64)
//!     local.get 0
//!     global.set 0
//!     local.get 1
//!     global.set 1
//!     call $original_start)
//! ```
//!
//! Parameter `i` feeds global `i`: the internalized globals occupy the front of
//! the global index space in their original import order.

use tracing::debug;
use wasm_encoder::{
    CodeSection, ExportKind, ExportSection, Function, FunctionSection, Instruction, SectionId,
    TypeSection,
};

use wasm_bundle_common::BundleError;

use crate::decoder::{
    DecodedModule, FuncSignature, ImportDescriptor, SectionIndexCounters, ValueType, decode,
};
use crate::edit::{Entries, SectionEditor};
use crate::usage::number_to_identifier;

/// A formerly imported global, now set by the init function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParam {
    pub namespace: String,
    pub name: String,
    pub value_type: ValueType,
}

/// Everything needed to append the init function to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFunction {
    pub export_name: String,
    pub params: Vec<InitParam>,
    /// Function the module used to run implicitly.
    pub start: Option<u32>,
    pub counters: SectionIndexCounters,
}

/// Export name of the init function.
///
/// Derived from the number of observed exports, so it never clashes with the
/// short names the bundle assigns to those exports.
pub fn init_export_name(used_export_count: Option<usize>, fallback: &str) -> String {
    used_export_count.map_or_else(|| fallback.to_string(), number_to_identifier)
}

impl InitFunction {
    /// Capture the init contract of `module` before it is rewritten.
    pub fn new(export_name: impl Into<String>, module: &DecodedModule) -> Self {
        let params = module
            .imported_globals()
            .filter_map(|import| match import.descriptor {
                ImportDescriptor::Global { value_type, .. } => Some(InitParam {
                    namespace: import.namespace.clone(),
                    name: import.name.clone(),
                    value_type,
                }),
                _ => None,
            })
            .collect();

        Self {
            export_name: export_name.into(),
            params,
            start: module.start,
            counters: module.counters(),
        }
    }

    pub fn signature(&self) -> FuncSignature {
        FuncSignature {
            params: self.params.iter().map(|p| p.value_type).collect(),
            results: Vec::new(),
        }
    }

    /// The function body: store each parameter, then run the former start.
    pub fn body(&self) -> Function {
        let mut func = Function::new(Vec::new());
        for (index, _) in (0u32..).zip(&self.params) {
            func.instruction(&Instruction::LocalGet(index));
            func.instruction(&Instruction::GlobalSet(index));
        }
        if let Some(start) = self.start {
            func.instruction(&Instruction::Call(start));
        }
        func.instruction(&Instruction::End);
        func
    }

    /// Append the function with its type, declaration, export and body.
    pub fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, BundleError> {
        let module = decode(bytes)?;
        if module.exports.iter().any(|e| e.name == self.export_name) {
            return Err(BundleError::InitExportCollision {
                name: self.export_name.clone(),
            });
        }

        let params = self
            .params
            .iter()
            .map(|p| p.value_type.to_encoder())
            .collect::<Result<Vec<_>, _>>()?;

        let mut types = TypeSection::new();
        types.ty().function(params, Vec::new());

        let mut funcs = FunctionSection::new();
        funcs.function(self.counters.next_type_index);

        let mut exports = ExportSection::new();
        exports.export(
            &self.export_name,
            ExportKind::Func,
            self.counters.next_func_index,
        );

        let mut code = CodeSection::new();
        code.function(&self.body());

        let mut editor = SectionEditor::new(bytes, &module);
        editor.append_entries(SectionId::Type, Entries::from_encoded(&types)?)?;
        editor.append_entries(SectionId::Function, Entries::from_encoded(&funcs)?)?;
        editor.append_entries(SectionId::Export, Entries::from_encoded(&exports)?)?;
        editor.append_entries(SectionId::Code, Entries::from_encoded(&code)?)?;

        debug!(
            export = %self.export_name,
            params = self.params.len(),
            start = ?self.start,
            func_index = self.counters.next_func_index,
            type_index = self.counters.next_type_index,
            "Init function added"
        );

        Ok(editor.finish())
    }
}
