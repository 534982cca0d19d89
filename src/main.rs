//! wasm-bundle CLI entry point.
//!
//! Inspects and rewrites WebAssembly modules for a multi-module bundle.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasm_bundle_common::{ConfigFile, RewriteConfig, UsedExport};
use wasm_bundle_core::{GeneratedModule, ModuleUsage, generate, parse};

#[derive(Parser)]
#[command(name = "wasm-bundle")]
#[command(about = "Rewrite WebAssembly modules for a multi-module bundle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the dependencies and exports of a module as JSON
    Inspect {
        /// Input WebAssembly binary
        input: PathBuf,
    },

    /// Rewrite a single module
    Rewrite {
        /// Input WebAssembly binary
        input: PathBuf,

        /// Where to write the rewritten binary
        #[arg(short, long)]
        output: PathBuf,

        /// Observed export, as `name` or `name=used_name`. Repeatable.
        /// Without any, every export is kept under its own name.
        #[arg(long = "export", value_name = "NAME[=USED]")]
        exports: Vec<String>,

        /// Import the bundle could not resolve, as `namespace:name`. Repeatable.
        #[arg(long = "unresolved", value_name = "NAMESPACE:NAME")]
        unresolved: Vec<String>,

        /// Keep original import names inside the mangled namespace
        #[arg(long)]
        no_mangle: bool,

        /// Init export name when observed exports are unknown
        #[arg(long, env = "WASM_BUNDLE_INIT_NAME")]
        init_name: Option<String>,
    },

    /// Rewrite every module listed in a TOML manifest
    Bundle {
        /// Manifest file
        manifest: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wasm_bundle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Inspect { input } => inspect(&input),
        Command::Rewrite {
            input,
            output,
            exports,
            unresolved,
            no_mangle,
            init_name,
        } => {
            let mut usage = ModuleUsage::all();
            if !exports.is_empty() {
                usage = usage.with_used_exports(exports.iter().map(|e| parse_export(e)).collect());
            }
            for key in unresolved {
                usage = usage.with_unresolved(key);
            }

            let mut config = RewriteConfig {
                mangle_imports: !no_mangle,
                ..Default::default()
            };
            if let Some(name) = init_name {
                config.init_fallback_name = name;
            }

            let generated = rewrite_file(&input, &output, &usage, &config)?;
            println!("{}", serde_json::to_string_pretty(&generated)?);
            Ok(())
        }
        Command::Bundle { manifest } => bundle(&manifest),
    }
}

fn inspect(input: &Path) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read '{}'", input.display()))?;
    let parsed = parse(bytes).with_context(|| format!("Failed to parse '{}'", input.display()))?;

    let report = serde_json::json!({
        "exports_type": parsed.exports_type(),
        "dependencies": parsed.interface().dependencies,
        "provided_exports": parsed.interface().provided_exports,
        "counters": parsed.module().counters(),
        "start": parsed.module().start,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn bundle(manifest: &Path) -> anyhow::Result<()> {
    let config = ConfigFile::from_file(manifest)?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));

    info!(modules = config.modules.len(), "Rewriting bundle");

    let mut reports = serde_json::Map::new();
    for entry in &config.modules {
        let usage = ModuleUsage::from(entry);
        let input = base.join(&entry.path);
        let output = base.join(entry.output_path());

        let generated = rewrite_file(&input, &output, &usage, &config.rewrite)
            .with_context(|| format!("Failed to rewrite module '{}'", entry.id))?;
        reports.insert(entry.id.clone(), serde_json::to_value(&generated)?);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn rewrite_file(
    input: &Path,
    output: &Path,
    usage: &ModuleUsage,
    config: &RewriteConfig,
) -> anyhow::Result<GeneratedModule> {
    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read '{}'", input.display()))?;
    let parsed = parse(bytes).with_context(|| format!("Failed to parse '{}'", input.display()))?;
    let generated = generate(&parsed, usage, config)?;

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create '{}'", dir.display()))?;
    }
    std::fs::write(output, &generated.binary)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        init_export = %generated.init_export,
        "Module written"
    );
    Ok(generated)
}

fn parse_export(arg: &str) -> UsedExport {
    match arg.split_once('=') {
        Some((name, used)) => UsedExport {
            name: name.to_string(),
            used_name: Some(used.to_string()),
        },
        None => UsedExport {
            name: arg.to_string(),
            used_name: None,
        },
    }
}
