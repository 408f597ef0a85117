// type_infer.rs — Struct-info normalization
//
// Fills in the struct info of an expression tree bottom-up. Leaves take
// theirs directly (a var's declared info, a constant's literal shape); calls
// look up the operator's inference rule in the global registry and run it
// over the already-normalized arguments.
//
// Preconditions: every var referenced by the tree carries struct info.
// Postconditions: every node of the returned tree has struct info; nodes
//   whose children were unchanged and already annotated are returned as-is.
// Failure modes: UnknownOpError for an unregistered operator; ArityError or
//   KindError when arguments do not match the operator's declaration; any
//   error raised by an inference rule.
// Side effects: none.

use crate::arith::Analyzer;
use crate::builder::Globals;
use crate::diag::{ErrorKind, IrError};
use crate::expr::{Call, CallTarget, Expr, ExprKind};
use crate::op::InferCtx;
use crate::registry;
use crate::struct_info::StructInfo;

/// What inference may consult besides the expression itself.
#[derive(Debug, Clone, Copy)]
pub struct InferEnv<'a> {
    pub globals: &'a Globals,
    pub analyzer: &'a Analyzer,
}

/// Return `expr` with struct info on every node.
pub fn normalize(expr: &Expr, env: &InferEnv<'_>) -> Result<Expr, IrError> {
    match expr.kind() {
        ExprKind::Var(_)
        | ExprKind::DataflowVar(_)
        | ExprKind::Constant(_)
        | ExprKind::ShapeExpr(_)
        | ExprKind::GlobalVar(_) => {
            if expr.struct_info().is_some() {
                return Ok(expr.clone());
            }
            let sinfo = infer_node(expr, env)?;
            Ok(expr.with_struct_info(sinfo))
        }
        ExprKind::Tuple(fields) => {
            let (new_fields, changed) = normalize_all(fields, env)?;
            let node = if changed {
                expr.rebuild(ExprKind::Tuple(new_fields))
            } else if expr.struct_info().is_some() {
                return Ok(expr.clone());
            } else {
                expr.clone()
            };
            let sinfo = infer_node(&node, env)?;
            Ok(node.with_struct_info(sinfo))
        }
        ExprKind::Call(call) => {
            let (new_args, changed) = normalize_all(&call.args, env)?;
            let node = if changed {
                expr.rebuild(ExprKind::Call(Call {
                    target: call.target.clone(),
                    args: new_args,
                    attrs: call.attrs.clone(),
                }))
            } else if expr.struct_info().is_some() {
                return Ok(expr.clone());
            } else {
                expr.clone()
            };
            let sinfo = infer_node(&node, env)?;
            Ok(node.with_struct_info(sinfo))
        }
    }
}

fn normalize_all(exprs: &[Expr], env: &InferEnv<'_>) -> Result<(Vec<Expr>, bool), IrError> {
    let mut changed = false;
    let mut out = Vec::with_capacity(exprs.len());
    for e in exprs {
        let n = normalize(e, env)?;
        changed |= !n.same_as(e);
        out.push(n);
    }
    Ok((out, changed))
}

/// Struct info of `expr` computed from its children's struct info.
///
/// The node's own cached struct info is ignored; children without struct
/// info are inferred recursively.
pub fn infer_node(expr: &Expr, env: &InferEnv<'_>) -> Result<StructInfo, IrError> {
    match expr.kind() {
        ExprKind::Var(v) | ExprKind::DataflowVar(v) => Ok(v.struct_info().clone()),
        ExprKind::Constant(c) => Ok(StructInfo::tensor_static(&c.shape, c.dtype)),
        ExprKind::ShapeExpr(dims) => Ok(StructInfo::shape(dims.clone())),
        ExprKind::GlobalVar(_) => Ok(StructInfo::Unknown),
        ExprKind::Tuple(fields) => {
            let infos = fields
                .iter()
                .map(|f| child_struct_info(f, env))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StructInfo::Tuple(infos))
        }
        ExprKind::Call(call) => match &call.target {
            CallTarget::Global(name) => Ok(env
                .globals
                .get(name)
                .cloned()
                .unwrap_or(StructInfo::Unknown)),
            CallTarget::Op(name) => {
                let Some(def) = registry::global().lookup(name) else {
                    return Err(IrError::new(
                        ErrorKind::UnknownOp,
                        expr.span(),
                        format!("no inference rule is registered for operator '{name}'"),
                    ));
                };
                if call.args.iter().any(|a| a.struct_info().is_none()) {
                    let normalized = normalize(expr, env)?;
                    if let Some(sinfo) = normalized.struct_info() {
                        return Ok(sinfo.clone());
                    }
                }
                let ctx = InferCtx::new(def, expr.span(), env.analyzer);
                ctx.check_args(call)?;
                (def.infer)(call, &ctx)
            }
        },
    }
}

fn child_struct_info(expr: &Expr, env: &InferEnv<'_>) -> Result<StructInfo, IrError> {
    match expr.struct_info() {
        Some(s) => Ok(s.clone()),
        None => infer_node(expr, env),
    }
}
