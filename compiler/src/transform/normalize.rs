// transform/normalize.rs — Re-infer struct info everywhere
//
// Recomputes the struct info of every node from its children, ignoring what
// is cached. A var whose value now infers differently is rebound and its
// later uses follow. On IR that is already consistent the pass changes
// nothing, which is how inference determinism is checked.

use crate::builder::{Globals, IrBuilder};
use crate::diag::IrError;
use crate::expr::Expr;
use crate::ir::Function;
use crate::transform::mutator::{mutate_function, Mutate};

pub struct Normalize;

impl Mutate for Normalize {
    fn rewrite(&self, expr: Expr, builder: &IrBuilder) -> Result<Expr, IrError> {
        let sinfo = builder.infer_struct_info(&expr)?;
        if expr.struct_info() == Some(&sinfo) {
            Ok(expr)
        } else {
            Ok(expr.with_struct_info(sinfo))
        }
    }
}

pub fn normalize(func: &Function, globals: &Globals) -> Result<Function, IrError> {
    mutate_function(&Normalize, func, globals)
}
