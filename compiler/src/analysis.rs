// analysis.rs — Read-only analyses over finished IR
//
// `free_vars` lists the vars an expression references. `well_formed` checks
// a finished function against the scoping rules the builder enforces during
// construction, for IR that arrives from elsewhere (a pass, a JSON file).
//
// Preconditions: none.
// Postconditions: neither function modifies its input.
// Failure modes: none; problems are returned as diagnostics.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::expr::{dummy_span, Expr, ExprKind, Span, Var};
use crate::id::VarId;
use crate::ir::Function;

// ── Free variables ──────────────────────────────────────────────────────────

/// Vars referenced by `expr`, in order of first occurrence.
pub fn free_vars(expr: &Expr) -> Vec<Var> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect_vars(expr, &mut seen, &mut out);
    out
}

fn collect_vars(expr: &Expr, seen: &mut HashSet<VarId>, out: &mut Vec<Var>) {
    match expr.kind() {
        ExprKind::Var(v) | ExprKind::DataflowVar(v) => {
            if seen.insert(v.id()) {
                out.push(v.clone());
            }
        }
        ExprKind::Call(call) => {
            for a in &call.args {
                collect_vars(a, seen, out);
            }
        }
        ExprKind::Tuple(fields) => {
            for f in fields {
                collect_vars(f, seen, out);
            }
        }
        ExprKind::ShapeExpr(_) | ExprKind::Constant(_) | ExprKind::GlobalVar(_) => {}
    }
}

// ── Well-formedness ─────────────────────────────────────────────────────────

/// Check `func` for:
/// - uses of vars that are not defined earlier in an enclosing scope
/// - vars bound more than once
/// - dataflow vars bound outside a dataflow block or used after it
/// - binding values without struct info (warning)
pub fn well_formed(func: &Function) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    // First definition site of each var.
    let mut defined: HashMap<VarId, Span> = HashMap::new();
    let mut visible: HashSet<VarId> = HashSet::new();

    let error = |span, msg: String| {
        Diagnostic::new(DiagLevel::Error, span, msg).with_code(codes::E0300)
    };

    for p in &func.params {
        if defined.insert(p.id(), dummy_span()).is_some() {
            diags.push(error(
                dummy_span(),
                format!("in '{}': parameter '{}' is declared twice", func.name, p.name()),
            ));
        }
        visible.insert(p.id());
    }

    for block in &func.blocks {
        let mut block_local = Vec::new();
        for b in &block.bindings {
            for v in free_vars(&b.value) {
                if !visible.contains(&v.id()) {
                    diags.push(error(
                        b.value.span(),
                        format!(
                            "in '{}': binding '{}' uses '{}' outside its scope",
                            func.name,
                            b.var.name(),
                            v.name()
                        ),
                    ));
                }
            }
            if b.value.struct_info().is_none() {
                diags.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        b.value.span(),
                        format!(
                            "in '{}': value bound to '{}' has no struct info",
                            func.name,
                            b.var.name()
                        ),
                    )
                    .with_code(codes::W0300)
                    .with_hint("run the normalize pass"),
                );
            }
            if b.var.is_dataflow() && !block.is_dataflow {
                diags.push(error(
                    b.value.span(),
                    format!(
                        "in '{}': dataflow var '{}' is bound outside a dataflow block",
                        func.name,
                        b.var.name()
                    ),
                ));
            }
            if let Some(first) = defined.insert(b.var.id(), b.value.span()) {
                diags.push(
                    error(
                        b.value.span(),
                        format!("in '{}': var '{}' is bound more than once", func.name, b.var.name()),
                    )
                    .with_related(first, "first bound here"),
                );
            }
            visible.insert(b.var.id());
            if b.var.is_dataflow() {
                block_local.push(b.var.id());
            }
        }
        for id in block_local {
            visible.remove(&id);
        }
    }

    for out in &func.outputs {
        for v in free_vars(out) {
            if !visible.contains(&v.id()) {
                diags.push(error(
                    out.span(),
                    format!(
                        "in '{}': function output uses '{}' outside its scope",
                        func.name,
                        v.name()
                    ),
                ));
            }
        }
    }
    diags
}
