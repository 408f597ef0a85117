// pipeline.rs — Pass orchestration over a module
//
// Expands the requested passes to their dependency closure and runs them in
// order, one function at a time, each function through its own builder.
// Rewriting passes produce a new module; the caller's module is never
// touched.
//
// Preconditions: none; the input module may come from the builder or from
//   JSON.
// Postconditions: on success every requested pass has run on every function.
// Failure modes: error-level diagnostics from well_formed; any IrError
//   raised while rewriting a function. Both stop the pipeline at that pass.
// Side effects: calls on_pass_complete after each pass; prints per-pass
//   timing to stderr when verbose.

use std::fmt;
use std::time::{Duration, Instant};

use crate::analysis::well_formed;
use crate::builder::Globals;
use crate::diag::{DiagLevel, Diagnostic, IrError};
use crate::ir::{Function, IrModule};
use crate::pass::{descriptor, expand_passes, PassId};
use crate::registry::Registry;
use crate::transform::{module_globals, normalize, rewrite_dataflow_reshape, to_anf};

// ── Options ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Print per-pass timing to stderr.
    pub verbose: bool,
    /// Rewrite the functions of a module on scoped threads.
    pub parallel: bool,
}

// ── Error type ─────────────────────────────────────────────────────────────

/// A pass reported errors; no output module was produced.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_pass: PassId,
    /// Function the failure was found in, when it is attributable to one.
    pub function: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass '{}' failed", descriptor(self.failing_pass).name)?;
        if let Some(func) = &self.function {
            write!(f, " in function '{func}'")?;
        }
        for d in &self.diagnostics {
            write!(f, "\n{d}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for cache keys and reproducibility checks.
///
/// `module_hash`: SHA-256 of the compact module JSON.
/// `registry_fingerprint`: SHA-256 of `Registry::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub module_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the module hash (64 characters).
    pub fn module_hash_hex(&self) -> String {
        bytes_to_hex(&self.module_hash)
    }

    /// Hex string of the registry fingerprint (64 characters).
    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"module_hash\": \"{}\",\n  \"registry_fingerprint\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.module_hash_hex(),
            self.registry_fingerprint_hex(),
            self.compiler_version,
        )
    }
}

pub fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// SHA-256 of the module's compact JSON form. Equal modules, including the
/// generated var names, hash equal.
pub fn fingerprint(module: &IrModule) -> Result<[u8; 32], serde_json::Error> {
    Ok(sha256(&crate::serial::to_json_compact(module)?))
}

pub fn compute_provenance(
    module: &IrModule,
    registry: &Registry,
) -> Result<Provenance, serde_json::Error> {
    Ok(Provenance {
        module_hash: fingerprint(module)?,
        registry_fingerprint: sha256(&registry.canonical_json()?),
        compiler_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Pass bookkeeping ───────────────────────────────────────────────────────

fn has_error_diags(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

/// Per-pass post-processing: callback, verbose timing, error check.
fn finish_pass(
    pass_id: PassId,
    diags: Vec<Diagnostic>,
    elapsed: Duration,
    verbose: bool,
    on_pass_complete: &mut impl FnMut(PassId, &[Diagnostic]),
) -> Result<(), PipelineError> {
    on_pass_complete(pass_id, &diags);
    if verbose {
        eprintln!(
            "tensir: {} complete, {:.1}ms",
            descriptor(pass_id).name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if has_error_diags(&diags) {
        return Err(PipelineError {
            failing_pass: pass_id,
            function: None,
            diagnostics: diags,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run `passes` and their dependencies over `module`.
pub fn run_passes(
    module: &IrModule,
    passes: &[PassId],
    options: &PipelineOptions,
) -> Result<IrModule, PipelineError> {
    run_pipeline(module, passes, options, |_, _| {})
}

/// `run_passes` with a callback invoked after each pass with the pass's
/// diagnostics, warnings included, for immediate display.
pub fn run_pipeline(
    module: &IrModule,
    passes: &[PassId],
    options: &PipelineOptions,
    mut on_pass_complete: impl FnMut(PassId, &[Diagnostic]),
) -> Result<IrModule, PipelineError> {
    let mut current = module.clone();
    for pass_id in expand_passes(passes) {
        let start = Instant::now();
        let diags = if descriptor(pass_id).rewrites {
            current = rewrite_module(&current, pass_id, options)?;
            Vec::new()
        } else {
            current.functions().flat_map(well_formed).collect()
        };
        finish_pass(
            pass_id,
            diags,
            start.elapsed(),
            options.verbose,
            &mut on_pass_complete,
        )?;
    }
    Ok(current)
}

fn run_on_function(pass_id: PassId, func: &Function, globals: &Globals) -> Result<Function, IrError> {
    match pass_id {
        PassId::Normalize => normalize(func, globals),
        PassId::ToAnf => to_anf(func, globals),
        PassId::RewriteDataflowReshape => rewrite_dataflow_reshape(func, globals),
        PassId::WellFormed => Ok(func.clone()),
    }
}

fn rewrite_module(
    module: &IrModule,
    pass_id: PassId,
    options: &PipelineOptions,
) -> Result<IrModule, PipelineError> {
    let globals = module_globals(module);
    let funcs: Vec<&Function> = module.functions().collect();
    let rewrite = |func: &Function| run_on_function(pass_id, func, &globals);

    let results: Vec<Result<Function, IrError>> = if options.parallel && funcs.len() > 1 {
        std::thread::scope(|s| {
            let rewrite = &rewrite;
            let handles: Vec<_> = funcs
                .iter()
                .map(|&func| s.spawn(move || rewrite(func)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                .collect()
        })
    } else {
        funcs.iter().map(|&func| rewrite(func)).collect()
    };

    let mut out = IrModule::new();
    for (func, result) in funcs.iter().zip(results) {
        let fail = |e: IrError| PipelineError {
            failing_pass: pass_id,
            function: Some(func.name.clone()),
            diagnostics: vec![e.diagnostic],
        };
        out.add(result.map_err(&fail)?).map_err(&fail)?;
    }
    Ok(out)
}
