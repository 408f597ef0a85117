// pass.rs — Pass descriptor module: metadata and dependency resolution
//
// Declares the module-level passes, the passes each one depends on and what
// each guarantees on success. The pipeline runner expands a requested pass
// list to its dependency closure before running it.

use std::collections::HashSet;

// ── Pass identifiers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum PassId {
    /// Scope and definition-before-use check over every function.
    WellFormed,
    /// Re-infer every binding's struct info.
    Normalize,
    /// Bind every nested call to its own var.
    ToAnf,
    /// Replace reshape kernel calls in dataflow blocks by the runtime builtin.
    RewriteDataflowReshape,
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Name used in verbose output and diagnostics.
    pub name: &'static str,
    /// Passes that must have run on the module first.
    pub inputs: &'static [PassId],
    /// Whether the pass produces a new module or only diagnostics.
    pub rewrites: bool,
    /// What holds for every function once the pass succeeds.
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::WellFormed => PassDescriptor {
            name: "well_formed",
            inputs: &[],
            rewrites: false,
            invariants: "vars bound once, used in scope, dataflow vars private to their block",
        },
        PassId::Normalize => PassDescriptor {
            name: "normalize",
            inputs: &[PassId::WellFormed],
            rewrites: true,
            invariants: "every node carries the struct info its children imply",
        },
        PassId::ToAnf => PassDescriptor {
            name: "to_anf",
            inputs: &[PassId::Normalize],
            rewrites: true,
            invariants: "call and tuple operands are atoms",
        },
        PassId::RewriteDataflowReshape => PassDescriptor {
            name: "rewrite_dataflow_reshape",
            inputs: &[PassId::Normalize],
            rewrites: true,
            invariants: "no call_tir(@reshape*, (x,), shape) left in dataflow blocks",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

pub const ALL_PASSES: [PassId; 4] = [
    PassId::WellFormed,
    PassId::Normalize,
    PassId::ToAnf,
    PassId::RewriteDataflowReshape,
];

/// Passes needed to run `terminal`, in execution order, ending with it.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

/// Dependency closure of `requested`, each pass once, in request order with
/// dependencies first.
pub fn expand_passes(requested: &[PassId]) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for &id in requested {
        visit(id, &mut visited, &mut order);
    }
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
