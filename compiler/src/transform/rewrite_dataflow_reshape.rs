// transform/rewrite_dataflow_reshape.rs — call_tir(@reshape*) → vm.builtin.reshape
//
// Inside dataflow blocks, a kernel call whose callee name starts with
// `reshape` and whose input tuple holds exactly one tensor is replaced by
// the runtime reshape builtin, which aliases the input instead of copying
// it. Ordinary blocks are copied unchanged.

use crate::builder::{Globals, IrBuilder};
use crate::diag::IrError;
use crate::expr::{Attrs, Call, CallTarget, Expr, ExprKind};
use crate::ir::{BindingBlock, Function};
use crate::transform::mutator::{mutate_function, Mutate};

const RESHAPE_PREFIX: &str = "reshape";
const BUILTIN_RESHAPE: &str = "vm.builtin.reshape";

pub struct RewriteDataflowReshape;

impl Mutate for RewriteDataflowReshape {
    fn visits_block(&self, block: &BindingBlock) -> bool {
        block.is_dataflow
    }

    fn rewrite(&self, expr: Expr, _builder: &IrBuilder) -> Result<Expr, IrError> {
        let Some((data, shape)) = match_reshape_kernel(&expr) else {
            return Ok(expr);
        };
        let call = Call {
            target: CallTarget::Op(BUILTIN_RESHAPE.to_string()),
            args: vec![data.clone(), shape.clone()],
            attrs: Attrs::new(),
        };
        Ok(expr.rebuild(ExprKind::Call(call)))
    }
}

/// `(x, shape)` when `expr` is `call_tir(@reshape*, (x,), shape)`.
fn match_reshape_kernel(expr: &Expr) -> Option<(&Expr, &Expr)> {
    let call = expr.as_call()?;
    if call.op_name() != Some("call_tir") || call.args.len() != 3 {
        return None;
    }
    if !call.args[0].global_name()?.starts_with(RESHAPE_PREFIX) {
        return None;
    }
    match call.args[1].kind() {
        ExprKind::Tuple(fields) if fields.len() == 1 => Some((&fields[0], &call.args[2])),
        _ => None,
    }
}

pub fn rewrite_dataflow_reshape(func: &Function, globals: &Globals) -> Result<Function, IrError> {
    mutate_function(&RewriteDataflowReshape, func, globals)
}
