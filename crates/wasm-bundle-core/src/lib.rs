//! Binary rewriting core for bundling WebAssembly modules.
//!
//! This crate takes a pre-compiled core module and prepares it to share a
//! namespace, initialization order and host linkage with the other modules
//! of a bundle:
//! - [`parse`]: decode once, classify imports as [`ImportDependency`] records
//!   and list the provided exports
//! - [`generate`]: resolve used imports to mangled names and run the
//!   [`RewritePipeline`]
//! - [`InitFunction`]: the synthesized export that replaces the start
//!   function and feeds former global imports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  parse (parser path)                    │
//! │  decode ──► extract ──► ModuleInterface                 │
//! │  (dependencies + provided exports for the module graph) │
//! └─────────────────────────────────────────────────────────┘
//!                            │ ParsedModule
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                generate (generator path)                │
//! │  counters, imported globals, start ──► InitFunction     │
//! │  usage + naming policy ──► UsedDependencyMap            │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RewritePipeline                      │
//! │  exports ─► start ─► globals ─► imports ─► init func    │
//! │  (each step: whole binary in, whole binary out)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is synchronous and keeps no state between calls, so separate
//! modules can be processed concurrently by the caller.

pub mod decoder;
pub mod dependency;
mod edit;
pub mod generator;
pub mod init_func;
pub mod parser;
pub mod transform;
pub mod usage;

pub use decoder::{
    DecodedModule, ExternKind, FuncSignature, ImportDescriptor, ModuleExport, ModuleImport,
    SectionIndexCounters, ValueType, decode,
};
pub use dependency::{DirectOnlyReason, ImportDependency, ModuleInterface, SignaturePosition};
pub use generator::{GeneratedModule, generate};
pub use init_func::{InitFunction, InitParam};
pub use parser::{ExportsType, ParsedModule, parse};
pub use transform::{RewritePipeline, RewriteStep};
pub use usage::{
    DependencyUsage, ExportUsage, MANGLED_NAMESPACE, Mangled, ModuleUsage, NamingPolicy, Preserve,
    UsedDependency, UsedDependencyMap,
};
