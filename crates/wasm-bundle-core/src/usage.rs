//! Usage queries answered by the bundler's module graph, and the mapping from
//! used imports to their mangled names.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use wasm_bundle_common::{ModuleEntry, UsedExport};

use crate::decoder::ImportDescriptor;
use crate::dependency::{ImportDependency, dependency_key};

/// Import namespace shared by every rewritten module of a bundle.
///
/// Host glue supplies one object under this name that satisfies every
/// cross-module import.
pub const MANGLED_NAMESPACE: &str = "a";

/// Tells whether an export is observed by other modules, and under what name.
pub trait ExportUsage {
    /// External name of `export`, or `None` if nothing observes it.
    fn used_name(&self, export: &str) -> Option<String>;

    /// How many exports are observed, when the graph knows.
    fn used_export_count(&self) -> Option<usize>;
}

/// Tells whether the graph resolved an import to another module.
pub trait DependencyUsage {
    fn is_used(&self, dependency: &ImportDependency) -> bool;
}

/// Picks the name a used import carries in the shared namespace.
pub trait NamingPolicy {
    fn mangled_name(&mut self, dependency: &ImportDependency) -> String;
}

const IDENTIFIER_CHARS: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Short identifier for `n`: `a`..`z`, `A`..`Z`, then two or more letters.
pub fn number_to_identifier(n: usize) -> String {
    let mut ident = String::new();
    push_identifier(n, &mut ident);
    ident
}

fn push_identifier(n: usize, out: &mut String) {
    let base = IDENTIFIER_CHARS.len();
    if n < base {
        out.push(char::from(IDENTIFIER_CHARS[n]));
    } else {
        push_identifier(n % base, out);
        push_identifier(n / base, out);
    }
}

/// Assigns short identifiers in order of use.
#[derive(Debug, Default)]
pub struct Mangled {
    next: usize,
}

impl NamingPolicy for Mangled {
    fn mangled_name(&mut self, _dependency: &ImportDependency) -> String {
        let name = number_to_identifier(self.next);
        self.next += 1;
        name
    }
}

/// Keeps the original import name.
#[derive(Debug, Default)]
pub struct Preserve;

impl NamingPolicy for Preserve {
    fn mangled_name(&mut self, dependency: &ImportDependency) -> String {
        dependency.name.clone()
    }
}

/// A used import and the name it carries after rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedDependency {
    pub mangled_name: String,
}

/// `namespace:name` to mangled name, for every import that survives rewriting.
#[derive(Debug, Clone, Default)]
pub struct UsedDependencyMap {
    entries: HashMap<String, UsedDependency>,
}

impl UsedDependencyMap {
    pub fn get(&self, namespace: &str, name: &str) -> Option<&UsedDependency> {
        self.entries.get(&dependency_key(namespace, name))
    }

    pub fn insert(&mut self, key: String, used: UsedDependency) {
        self.entries.insert(key, used);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UsedDependency)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Build the mangling map for the dependencies the graph marks as used.
///
/// Global imports are skipped: they are internalized and fed through the init
/// function instead of the shared namespace.
pub fn resolve_used_dependencies(
    dependencies: &[ImportDependency],
    usage: &dyn DependencyUsage,
    naming: &mut dyn NamingPolicy,
) -> UsedDependencyMap {
    let mut map = UsedDependencyMap::default();

    for dep in dependencies {
        if matches!(dep.descriptor, ImportDescriptor::Global { .. }) {
            continue;
        }
        if !usage.is_used(dep) {
            debug!(namespace = %dep.namespace, name = %dep.name, "Import unused");
            continue;
        }
        let mangled_name = naming.mangled_name(dep);
        map.insert(dep.key(), UsedDependency { mangled_name });
    }

    map
}

/// Resolved usage of one module, as recorded in the bundle manifest.
#[derive(Debug, Clone, Default)]
pub struct ModuleUsage {
    used_exports: Option<Vec<UsedExport>>,
    unresolved: HashSet<String>,
}

impl ModuleUsage {
    /// Every export observed under its own name, every import resolved.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only these exports are observed.
    #[must_use]
    pub fn with_used_exports(mut self, exports: Vec<UsedExport>) -> Self {
        self.used_exports = Some(exports);
        self
    }

    /// Mark an import (`namespace:name`) as unresolved.
    #[must_use]
    pub fn with_unresolved(mut self, key: impl Into<String>) -> Self {
        self.unresolved.insert(key.into());
        self
    }
}

impl From<&ModuleEntry> for ModuleUsage {
    fn from(entry: &ModuleEntry) -> Self {
        Self {
            used_exports: entry.used_exports.clone(),
            unresolved: entry.unresolved_imports.iter().cloned().collect(),
        }
    }
}

impl ExportUsage for ModuleUsage {
    fn used_name(&self, export: &str) -> Option<String> {
        match &self.used_exports {
            None => Some(export.to_string()),
            Some(used) => used
                .iter()
                .find(|e| e.name == export)
                .map(|e| e.external_name().to_string()),
        }
    }

    fn used_export_count(&self) -> Option<usize> {
        self.used_exports.as_ref().map(Vec::len)
    }
}

impl DependencyUsage for ModuleUsage {
    fn is_used(&self, dependency: &ImportDependency) -> bool {
        !self.unresolved.contains(&dependency.key())
    }
}
