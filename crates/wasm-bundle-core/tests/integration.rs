//! Integration tests for wasm-bundle-core.
//!
//! These tests verify the complete rewrite path:
//! - WAT compilation to a module binary
//! - Parsing into dependencies and provided exports
//! - Generation through the ordered rewrite pipeline
//! - Instantiation of the rewritten module against the mangled namespace

use wasm_bundle_common::{BundleError, ConfigFile, RewriteConfig, UsedExport};
use wasm_bundle_core::{
    DirectOnlyReason, ExternKind, GeneratedModule, ImportDescriptor, MANGLED_NAMESPACE,
    ModuleUsage, SignaturePosition, decode, generate, parse,
};
use wasmtime::{Caller, Engine, Linker, Module, Store};

/// Imports a mutable i32 global and a logger, starts at function 2, and
/// exports `run` plus a helper nobody observes.
const COUNTER_WAT: &str = r#"
    (module
        (import "env" "base" (global $base (mut i32)))
        (import "env" "log" (func $log (param i32)))
        (global $counter (mut i32) (i32.const 0))
        (func $helper (export "helper") (result i32) (i32.const 1))
        (func $start
            (call $log (i32.const 1))
            (global.set $counter (i32.const 7)))
        (func (export "run") (result i32)
            (call $log (global.get $counter))
            (i32.add (global.get $counter) (global.get $base)))
        (start $start)
    )
"#;

fn rewrite(wat: &str, usage: &ModuleUsage) -> GeneratedModule {
    let bytes = wat::parse_str(wat).unwrap();
    let parsed = parse(bytes).unwrap();
    generate(&parsed, usage, &RewriteConfig::default()).unwrap()
}

fn only_run_observed() -> ModuleUsage {
    ModuleUsage::all().with_used_exports(vec![UsedExport {
        name: "run".into(),
        used_name: None,
    }])
}

// ============================================================================
// Test: Structure of a rewritten module
// ============================================================================

#[test]
fn test_rewritten_module_structure() {
    let generated = rewrite(COUNTER_WAT, &only_run_observed());
    wasmparser::validate(&generated.binary).unwrap();

    let module = decode(&generated.binary).unwrap();

    // Only the logger survives, moved into the shared namespace.
    assert_eq!(module.imports.len(), 1);
    assert_eq!(module.imports[0].namespace, MANGLED_NAMESPACE);
    assert_eq!(module.imports[0].name, "a");
    assert!(module.imports[0].is_function());
    assert!(module.imported_globals().next().is_none());

    assert!(module.start.is_none());

    // One observed export, so the init function is named "b".
    assert_eq!(generated.init_export, "b");
    assert_eq!(generated.init_params, ["env.base"]);

    let names: Vec<_> = module.exports.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["run", "b"]);

    let init = &module.exports[1];
    assert_eq!(init.kind, ExternKind::Func);
    assert_eq!(init.index, 4);
}

#[test]
fn test_internalized_global_comes_first() {
    let generated = rewrite(COUNTER_WAT, &only_run_observed());

    let mut globals = Vec::new();
    for payload in wasmparser::Parser::new(0).parse_all(&generated.binary) {
        if let wasmparser::Payload::GlobalSection(reader) = payload.unwrap() {
            for global in reader {
                let global = global.unwrap();
                let mut init = global.init_expr.get_operators_reader();
                let op = init.read().unwrap();
                globals.push((global.ty.content_type, global.ty.mutable, format!("{op:?}")));
            }
        }
    }

    assert_eq!(globals.len(), 2);
    assert_eq!(globals[0].0, wasmparser::ValType::I32);
    assert!(globals[0].1);
    assert!(globals[0].2.contains("I32Const { value: 0 }"));
    assert!(globals[1].2.contains("I32Const { value: 0 }"));
}

// ============================================================================
// Test: Executing a rewritten module
// ============================================================================

#[test]
fn test_init_then_run() {
    let generated = rewrite(COUNTER_WAT, &only_run_observed());

    let engine = Engine::default();
    let module = Module::new(&engine, &generated.binary).unwrap();
    let mut linker: Linker<Vec<i32>> = Linker::new(&engine);
    linker
        .func_wrap(
            MANGLED_NAMESPACE,
            "a",
            |mut caller: Caller<'_, Vec<i32>>, value: i32| caller.data_mut().push(value),
        )
        .unwrap();

    let mut store = Store::new(&engine, Vec::new());
    let instance = linker.instantiate(&mut store, &module).unwrap();

    // Nothing runs implicitly any more.
    assert!(store.data().is_empty());

    let init = instance
        .get_typed_func::<i32, ()>(&mut store, &generated.init_export)
        .unwrap();
    init.call(&mut store, 5).unwrap();
    assert_eq!(store.data(), &[1]);

    let run = instance
        .get_typed_func::<(), i32>(&mut store, "run")
        .unwrap();
    assert_eq!(run.call(&mut store, ()).unwrap(), 12);
    assert_eq!(store.data(), &[1, 7]);

    assert!(instance.get_func(&mut store, "helper").is_none());
}

#[test]
fn test_empty_module_gets_no_op_init() {
    let generated = rewrite("(module)", &ModuleUsage::all());
    assert_eq!(generated.init_export, "__bundle_init__");
    assert!(generated.init_params.is_empty());

    let engine = Engine::default();
    let module = Module::new(&engine, &generated.binary).unwrap();
    let mut store = Store::new(&engine, ());
    let instance = Linker::new(&engine)
        .instantiate(&mut store, &module)
        .unwrap();

    let init = instance
        .get_typed_func::<(), ()>(&mut store, "__bundle_init__")
        .unwrap();
    init.call(&mut store, ()).unwrap();
}

// ============================================================================
// Test: Import mangling
// ============================================================================

#[test]
fn test_every_surviving_import_is_mangled() {
    let wat = r#"
        (module
            (import "env" "memory" (memory 1))
            (import "math" "sqrt" (func (param f64) (result f64)))
            (import "math" "gone" (table 1 externref))
            (import "env" "table" (table 1 funcref))
        )
    "#;
    let usage = ModuleUsage::all().with_unresolved("math:gone");
    let generated = rewrite(wat, &usage);
    wasmparser::validate(&generated.binary).unwrap();

    let imports = decode(&generated.binary).unwrap().imports;
    let names: Vec<_> = imports
        .iter()
        .map(|i| (i.namespace.as_str(), i.name.as_str()))
        .collect();
    assert_eq!(names, [("a", "a"), ("a", "b"), ("a", "c")]);
    assert_eq!(imports[0].descriptor, ImportDescriptor::Memory);
    assert_eq!(imports[2].descriptor, ImportDescriptor::Table);

    assert_eq!(
        generated.imports,
        [
            ("env:memory".to_string(), "a".to_string()),
            ("env:table".to_string(), "c".to_string()),
            ("math:sqrt".to_string(), "b".to_string()),
        ]
    );
}

#[test]
fn test_unresolved_function_import_fails_generation() {
    let wat = r#"
        (module
            (import "env" "log" (func (param i32)))
            (import "env" "gone" (func))
            (func (export "run") call 1)
        )
    "#;
    let parsed = parse(wat::parse_str(wat).unwrap()).unwrap();
    let usage = ModuleUsage::all().with_unresolved("env:gone");

    let err = generate(&parsed, &usage, &RewriteConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        BundleError::UnresolvedFunctionImport { ref name, .. } if name == "gone"
    ));
}

#[test]
fn test_unknown_version_is_rejected() {
    let err = parse(b"\0asm\x0d\0\0\0".to_vec()).unwrap_err();
    assert!(err.is_decode_failure());
}

// ============================================================================
// Test: Dependency extraction
// ============================================================================

#[test]
fn test_i64_signature_is_direct_only() {
    let bytes = wat::parse_str(
        r#"
        (module
            (import "env" "wide" (func (param i64)))
            (import "env" "narrow" (func (param i32) (result f64)))
            (import "env" "ret" (func (result i64)))
        )
        "#,
    )
    .unwrap();
    let parsed = parse(bytes).unwrap();
    let deps = &parsed.interface().dependencies;

    assert_eq!(
        deps[0].direct_only,
        Some(DirectOnlyReason::IncompatibleSignature {
            value_type: wasm_bundle_core::ValueType::I64,
            position: SignaturePosition::Parameter,
        })
    );
    assert_eq!(deps[1].direct_only, None);
    assert!(matches!(
        deps[2].direct_only,
        Some(DirectOnlyReason::IncompatibleSignature {
            position: SignaturePosition::Result,
            ..
        })
    ));
    assert_eq!(
        deps[0].direct_only.as_ref().unwrap().to_string(),
        "Host-incompatible function signature (i64 as parameter)"
    );
}

// ============================================================================
// Test: Manifest-driven usage
// ============================================================================

#[test]
fn test_manifest_usage() {
    let manifest = ConfigFile::from_toml(
        r#"
        [rewrite]
        init_fallback_name = "__init__"

        [[modules]]
        id = "counter"
        path = "counter.wasm"
        used_exports = [{ name = "run", used_name = "r" }]
        unresolved_imports = ["env:mem"]
        "#,
    )
    .unwrap();
    let entry = &manifest.modules[0];
    let usage = ModuleUsage::from(entry);

    let wat = r#"
        (module
            (import "env" "mem" (memory 1))
            (func (export "run") (result i32) (i32.const 3))
        )
    "#;
    let parsed = parse(wat::parse_str(wat).unwrap()).unwrap();
    let generated = generate(&parsed, &usage, &manifest.rewrite).unwrap();
    wasmparser::validate(&generated.binary).unwrap();

    let module = decode(&generated.binary).unwrap();
    assert!(module.imports.is_empty());
    let names: Vec<_> = module.exports.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["r", "b"]);
}

#[test]
fn test_generated_report_serializes() {
    let generated = rewrite(COUNTER_WAT, &only_run_observed());
    let json = serde_json::to_value(&generated).unwrap();

    assert_eq!(json["init_export"], "b");
    assert_eq!(json["init_params"][0], "env.base");
    assert!(json.get("binary").is_none());
}
