//! Decoding adapter over `wasmparser`.
//!
//! [`decode`] turns a binary into a [`DecodedModule`]: the typed view of the
//! import and export sections, the start function, the counters needed to
//! place new declarations, and the byte span of every section so the editor
//! can splice the binary without re-encoding untouched sections.
//!
//! Function bodies and data segments are never inspected.

use std::fmt;
use std::ops::Range;

use serde::Serialize;
use tracing::{debug, instrument};
use wasm_encoder::SectionId;
use wasmparser::{
    CompositeInnerType, Encoding, ExternalKind, FuncType, Parser, Payload, RefType, TypeRef, ValType,
};

use wasm_bundle_common::BundleError;

/// A value type as seen by the bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
    /// Any other reference type (typed function references, GC types).
    Ref,
}

impl ValueType {
    /// Whether the host calling convention carries this type faithfully.
    ///
    /// `i64` is excluded: the host boundary cannot represent it losslessly.
    pub fn is_host_interop_safe(self) -> bool {
        matches!(self, Self::I32 | Self::F32 | Self::F64)
    }

    /// The encoder's form of this type.
    pub(crate) fn to_encoder(self) -> Result<wasm_encoder::ValType, BundleError> {
        Ok(match self {
            Self::I32 => wasm_encoder::ValType::I32,
            Self::I64 => wasm_encoder::ValType::I64,
            Self::F32 => wasm_encoder::ValType::F32,
            Self::F64 => wasm_encoder::ValType::F64,
            Self::V128 => wasm_encoder::ValType::V128,
            Self::FuncRef => wasm_encoder::ValType::FUNCREF,
            Self::ExternRef => wasm_encoder::ValType::EXTERNREF,
            Self::Ref => {
                return Err(BundleError::UnsupportedGlobalType {
                    value_type: self.to_string(),
                });
            }
        })
    }
}

impl From<ValType> for ValueType {
    fn from(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Self::I32,
            ValType::I64 => Self::I64,
            ValType::F32 => Self::F32,
            ValType::F64 => Self::F64,
            ValType::V128 => Self::V128,
            ValType::Ref(r) if r == RefType::FUNCREF => Self::FuncRef,
            ValType::Ref(r) if r == RefType::EXTERNREF => Self::ExternRef,
            ValType::Ref(_) => Self::Ref,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::V128 => "v128",
            Self::FuncRef => "funcref",
            Self::ExternRef => "externref",
            Self::Ref => "ref",
        })
    }
}

/// Parameter and result types of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FuncSignature {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

impl From<&FuncType> for FuncSignature {
    fn from(ty: &FuncType) -> Self {
        Self {
            params: ty.params().iter().copied().map(ValueType::from).collect(),
            results: ty.results().iter().copied().map(ValueType::from).collect(),
        }
    }
}

/// What an import provides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportDescriptor {
    Memory,
    Table,
    Global { value_type: ValueType, mutable: bool },
    Function(FuncSignature),
}

impl ImportDescriptor {
    /// Short kind name used in logs and reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Table => "table",
            Self::Global { .. } => "global",
            Self::Function(_) => "function",
        }
    }
}

/// One entry of the import section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImport {
    pub namespace: String,
    pub name: String,
    pub descriptor: ImportDescriptor,
    /// Byte span of the whole entry within the decoded binary.
    pub(crate) entry: Range<usize>,
}

impl ModuleImport {
    pub fn is_global(&self) -> bool {
        matches!(self.descriptor, ImportDescriptor::Global { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.descriptor, ImportDescriptor::Function(_))
    }
}

/// Kind of entity an export refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
}

impl From<ExternalKind> for ExternKind {
    fn from(kind: ExternalKind) -> Self {
        match kind {
            ExternalKind::Func => Self::Func,
            ExternalKind::Table => Self::Table,
            ExternalKind::Memory => Self::Memory,
            ExternalKind::Global => Self::Global,
            ExternalKind::Tag => Self::Tag,
        }
    }
}

impl From<ExternKind> for wasm_encoder::ExportKind {
    fn from(kind: ExternKind) -> Self {
        match kind {
            ExternKind::Func => Self::Func,
            ExternKind::Table => Self::Table,
            ExternKind::Memory => Self::Memory,
            ExternKind::Global => Self::Global,
            ExternKind::Tag => Self::Tag,
        }
    }
}

/// One entry of the export section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleExport {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

/// Location of a section's contents (after the id and size prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SectionSpan {
    pub id: u8,
    pub range: Range<usize>,
}

/// Next free indices in the function and type index spaces.
///
/// Captured before any rewriting so that the synthesized init function is
/// declared right after everything the original module declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionIndexCounters {
    pub next_func_index: u32,
    pub next_type_index: u32,
}

/// Structural view of a core module.
#[derive(Debug, Clone, Default)]
pub struct DecodedModule {
    pub imports: Vec<ModuleImport>,
    pub exports: Vec<ModuleExport>,
    pub start: Option<u32>,
    /// Number of entries in the type index space.
    pub type_count: u32,
    /// Number of entries in the function section.
    pub declared_func_count: u32,
    pub(crate) sections: Vec<SectionSpan>,
}

impl DecodedModule {
    /// Imports of globals, in declaration order.
    pub fn imported_globals(&self) -> impl Iterator<Item = &ModuleImport> {
        self.imports.iter().filter(|import| import.is_global())
    }

    pub fn imported_func_count(&self) -> u32 {
        // The import section count is a u32, so this cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        let count = self.imports.iter().filter(|i| i.is_function()).count() as u32;
        count
    }

    pub fn counters(&self) -> SectionIndexCounters {
        SectionIndexCounters {
            next_func_index: self.declared_func_count + self.imported_func_count(),
            next_type_index: self.type_count,
        }
    }

    /// Whether the module carries a section with the given id.
    pub fn has_section(&self, id: SectionId) -> bool {
        self.sections.iter().any(|s| s.id == id as u8)
    }
}

/// Decode the section structure of a core module.
///
/// # Errors
///
/// Fails on malformed binaries, on unknown versions, on components, on tag
/// imports, and on function imports whose type index does not name a function
/// type.
#[instrument(skip(bytes), fields(bytes_len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<DecodedModule, BundleError> {
    let mut module = DecodedModule::default();
    let mut types: Vec<Option<FuncSignature>> = Vec::new();

    for payload in Parser::new(0).parse_all(bytes) {
        let payload = payload.map_err(decode_error)?;

        if let Some((id, range)) = payload.as_section() {
            module.sections.push(SectionSpan { id, range });
        }

        match payload {
            Payload::Version {
                num,
                encoding: Encoding::Module,
                ..
            } if num != 1 => {
                return Err(BundleError::decode(format!("unknown binary version {num:#x}")));
            }
            Payload::Version {
                encoding: Encoding::Component,
                ..
            } => {
                return Err(BundleError::UnsupportedEncoding {
                    found: "a component".to_string(),
                });
            }
            Payload::TypeSection(reader) => {
                for group in reader {
                    let group = group.map_err(decode_error)?;
                    for sub_type in group.types() {
                        types.push(match &sub_type.composite_type.inner {
                            CompositeInnerType::Func(func) => Some(FuncSignature::from(func)),
                            _ => None,
                        });
                    }
                }
            }
            Payload::ImportSection(reader) => {
                let end = reader.range().end;
                let mut entries = Vec::new();
                for item in reader.into_iter_with_offsets() {
                    entries.push(item.map_err(decode_error)?);
                }
                for (i, (offset, import)) in entries.iter().enumerate() {
                    let next = entries.get(i + 1).map_or(end, |(o, _)| *o);
                    let descriptor = match import.ty {
                        TypeRef::Func(index) => ImportDescriptor::Function(
                            usize::try_from(index)
                                .ok()
                                .and_then(|i| types.get(i).cloned().flatten())
                                .ok_or(BundleError::UnknownType { index })?,
                        ),
                        TypeRef::Table(_) => ImportDescriptor::Table,
                        TypeRef::Memory(_) => ImportDescriptor::Memory,
                        TypeRef::Global(global) => ImportDescriptor::Global {
                            value_type: global.content_type.into(),
                            mutable: global.mutable,
                        },
                        TypeRef::Tag(_) => {
                            return Err(BundleError::UnsupportedImport {
                                namespace: import.module.to_string(),
                                name: import.name.to_string(),
                                kind: "tag".to_string(),
                            });
                        }
                    };
                    module.imports.push(ModuleImport {
                        namespace: import.module.to_string(),
                        name: import.name.to_string(),
                        descriptor,
                        entry: *offset..next,
                    });
                }
            }
            Payload::FunctionSection(reader) => module.declared_func_count = reader.count(),
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.map_err(decode_error)?;
                    module.exports.push(ModuleExport {
                        name: export.name.to_string(),
                        kind: export.kind.into(),
                        index: export.index,
                    });
                }
            }
            Payload::StartSection { func, .. } => module.start = Some(func),
            Payload::End(_) => break,
            _ => {}
        }
    }

    module.type_count = u32::try_from(types.len())
        .map_err(|_| BundleError::decode("type index space exceeds u32"))?;

    debug!(
        imports = module.imports.len(),
        exports = module.exports.len(),
        start = ?module.start,
        sections = module.sections.len(),
        "Module decoded"
    );

    Ok(module)
}

fn decode_error(err: wasmparser::BinaryReaderError) -> BundleError {
    BundleError::decode(err.to_string())
}
