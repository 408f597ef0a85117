use clap::Parser;
use std::path::PathBuf;

use tensir::pass::PassId;
use tensir::pipeline::{compute_provenance, fingerprint, run_pipeline, PipelineOptions};
use tensir::serial::{self, LoadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Module JSON, loadable again
    Json,
    /// Readable IR dump
    Summary,
    /// SHA-256 of the compact module JSON
    Fingerprint,
    /// Module hash, registry fingerprint and compiler version
    Provenance,
    /// Operator table as canonical JSON
    Registry,
}

#[derive(Parser, Debug)]
#[command(
    name = "tensir",
    version,
    about = "Tensor IR core — loads a module, runs rewrite passes, emits the result"
)]
struct Cli {
    /// Input module JSON (not needed for --emit registry)
    input: Option<PathBuf>,

    /// Pass to run; dependencies run first (repeatable)
    #[arg(long = "pass", value_enum)]
    passes: Vec<PassId>,

    /// Output kind
    #[arg(long, value_enum, default_value_t = EmitStage::Summary)]
    emit: EmitStage,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rewrite functions on parallel threads
    #[arg(long)]
    parallel: bool,

    /// Print passes and timing
    #[arg(long)]
    verbose: bool,
}

fn write_output(cli: &Cli, text: &str) {
    match &cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("tensir: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        }
        None => print!("{text}"),
    }
}

fn serialize_failed(e: serde_json::Error) -> ! {
    eprintln!("tensir: error: serialization failed: {e}");
    std::process::exit(2);
}

fn main() {
    let cli = Cli::parse();
    let registry = tensir::registry::global();

    if cli.verbose {
        eprintln!("tensir: emit   = {:?}", cli.emit);
        eprintln!("tensir: passes = {:?}", cli.passes);
        eprintln!("tensir: {} operators registered", registry.len());
    }

    if cli.emit == EmitStage::Registry {
        let json = registry.canonical_json().unwrap_or_else(|e| serialize_failed(e));
        write_output(&cli, &format!("{json}\n"));
        return;
    }

    // ── Read and load module ──
    let Some(input) = &cli.input else {
        eprintln!("tensir: error: an input module is required for --emit {:?}", cli.emit);
        std::process::exit(2);
    };
    let text = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tensir: error: {}: {}", input.display(), e);
            std::process::exit(2);
        }
    };
    let module = match serial::from_json(&text) {
        Ok(m) => m,
        Err(LoadError::Json(e)) => {
            eprintln!("tensir: error: {}: {}", input.display(), e);
            std::process::exit(2);
        }
        Err(LoadError::Ir(e)) => {
            eprintln!("tensir: {}", e.diagnostic);
            std::process::exit(1);
        }
    };
    if cli.verbose {
        eprintln!(
            "tensir: loaded {} functions from {}",
            module.len(),
            input.display()
        );
    }

    // ── Run passes ──
    let options = PipelineOptions {
        verbose: cli.verbose,
        parallel: cli.parallel,
    };
    let result = run_pipeline(&module, &cli.passes, &options, |_, diags| {
        for d in diags {
            eprintln!("tensir: {d}");
        }
    });
    let module = match result {
        Ok(m) => m,
        Err(e) => {
            // Diagnostics of a failing analysis pass were already printed.
            if e.function.is_some() {
                for d in &e.diagnostics {
                    eprintln!("tensir: {d}");
                }
            }
            eprintln!(
                "tensir: error: pass '{}' failed",
                tensir::pass::descriptor(e.failing_pass).name
            );
            std::process::exit(1);
        }
    };

    // ── Emit ──
    let text = match cli.emit {
        EmitStage::Json => serial::to_json_pretty(&module).map(|s| format!("{s}\n")),
        EmitStage::Summary => Ok(module.to_string()),
        EmitStage::Fingerprint => fingerprint(&module)
            .map(|hash| format!("{}\n", tensir::pipeline::bytes_to_hex(&hash))),
        EmitStage::Provenance => compute_provenance(&module, registry).map(|p| p.to_json()),
        EmitStage::Registry => registry.canonical_json().map(|s| format!("{s}\n")),
    };
    let text = text.unwrap_or_else(|e| serialize_failed(e));
    write_output(&cli, &text);
}
