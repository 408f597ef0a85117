// transform/mutator.rs — Shared driver for function rewrites
//
// `mutate_function` replays a finished function through a fresh builder:
// params are reused, every block is reopened with its original kind and
// every binding is re-emitted with its value rewritten bottom-up. A node is
// reconstructed only when one of its children changed, so untouched
// subtrees keep their identity.
//
// Preconditions: `func` is well formed; `globals` holds the return struct
//   info of the functions `func` may call.
// Postconditions: the returned function has the same name, params, attrs
//   and return struct info as `func`. Bindings that were not rewritten keep
//   their original var and value.
// Failure modes: any IrError raised by a pass hook, by re-inference or by a
//   scope check during re-emission. No partial function is returned.
// Side effects: none; `func` is not modified.

use std::collections::HashMap;

use crate::builder::{Globals, IrBuilder};
use crate::diag::IrError;
use crate::expr::{Call, Expr, ExprKind, Var};
use crate::id::VarId;
use crate::ir::{Binding, BindingBlock, Function, IrModule};

// ── Pass hooks ──────────────────────────────────────────────────────────────

/// A structural rewrite over one function.
pub trait Mutate {
    /// Whether the bindings of `block` are rewritten. Blocks that are not
    /// visited are copied, with only var remapping applied.
    fn visits_block(&self, _block: &BindingBlock) -> bool {
        true
    }

    /// Whether a rewritten operand must be bound to a var of its own before
    /// the enclosing call or tuple uses it.
    fn hoists(&self, _operand: &Expr) -> bool {
        false
    }

    /// Called on every node after its children have been rewritten.
    fn rewrite(&self, expr: Expr, _builder: &IrBuilder) -> Result<Expr, IrError> {
        Ok(expr)
    }
}

/// Return struct info of every function of `module` that has one.
pub fn module_globals(module: &IrModule) -> Globals {
    module
        .functions()
        .filter_map(|f| f.ret_struct_info.clone().map(|r| (f.name.clone(), r)))
        .collect()
}

/// Rebuild `func` with `pass` applied.
pub fn mutate_function<M: Mutate + ?Sized>(
    pass: &M,
    func: &Function,
    globals: &Globals,
) -> Result<Function, IrError> {
    let mut rw = Rewriter {
        pass,
        builder: IrBuilder::with_globals(globals.clone()),
        remap: HashMap::new(),
        active: true,
    };
    rw.builder.enter_function(&func.name)?;
    for p in &func.params {
        rw.builder.reuse_param(p)?;
    }
    for (key, value) in func.attrs.iter() {
        rw.builder.set_attr(key, value.clone())?;
    }
    // Names generated for hoisted values must not collide with bindings
    // that are re-emitted later under their original names.
    for b in func.bindings() {
        rw.builder.name_table.reserve(b.var.name());
    }

    for block in &func.blocks {
        rw.active = pass.visits_block(block);
        rw.builder.enter_block(block.is_dataflow)?;
        for binding in &block.bindings {
            rw.visit_binding(binding)?;
        }
        rw.builder.exit()?;
    }

    rw.active = true;
    let mut outputs = Vec::with_capacity(func.outputs.len());
    for out in &func.outputs {
        outputs.push(rw.visit_operand(out)?);
    }
    rw.builder.emit_func_output(outputs)?;
    if let Some(ret) = &func.ret_struct_info {
        rw.builder.set_ret_struct_info(ret.clone())?;
    }
    rw.builder.exit()?;

    let mut module = rw.builder.finish()?;
    module.take(&func.name).ok_or_else(|| {
        IrError::scope(
            crate::expr::dummy_span(),
            format!("rewritten function '{}' missing from builder output", func.name),
        )
    })
}

// ── Traversal ───────────────────────────────────────────────────────────────

struct Rewriter<'p, M: ?Sized> {
    pass: &'p M,
    builder: IrBuilder,
    /// Vars rebound with new struct info, by the id of the var they replace.
    remap: HashMap<VarId, Var>,
    /// False while copying a block the pass does not visit.
    active: bool,
}

impl<M: Mutate + ?Sized> Rewriter<'_, M> {
    fn visit_binding(&mut self, binding: &Binding) -> Result<(), IrError> {
        let context = |e: IrError| {
            e.with_cause(
                format!("while rewriting the binding of '{}'", binding.var.name()),
                Some(binding.value.span()),
            )
        };
        let value = self.visit_expr(&binding.value).map_err(context)?;
        let var = self
            .builder
            .emit_binding(&Binding {
                var: binding.var.clone(),
                value,
            })
            .map_err(context)?;
        if var != binding.var {
            self.remap.insert(binding.var.id(), var);
        }
        Ok(())
    }

    fn visit_expr(&mut self, expr: &Expr) -> Result<Expr, IrError> {
        let visited = match expr.kind() {
            ExprKind::Var(v) | ExprKind::DataflowVar(v) => match self.remap.get(&v.id()) {
                Some(new) => Expr::var(new).with_span(expr.span()),
                None => expr.clone(),
            },
            ExprKind::Tuple(fields) => match self.visit_operands(fields)? {
                Some(fields) => expr.rebuild(ExprKind::Tuple(fields)),
                None => expr.clone(),
            },
            ExprKind::Call(call) => match self.visit_operands(&call.args)? {
                Some(args) => expr.rebuild(ExprKind::Call(Call {
                    target: call.target.clone(),
                    args,
                    attrs: call.attrs.clone(),
                })),
                None => expr.clone(),
            },
            ExprKind::ShapeExpr(_) | ExprKind::Constant(_) | ExprKind::GlobalVar(_) => {
                expr.clone()
            }
        };
        if self.active {
            self.pass.rewrite(visited, &self.builder)
        } else {
            Ok(visited)
        }
    }

    fn visit_operand(&mut self, operand: &Expr) -> Result<Expr, IrError> {
        let new = self.visit_expr(operand)?;
        if self.active && self.pass.hoists(&new) {
            let var = self.builder.emit(new)?;
            return Ok(Expr::var(&var));
        }
        Ok(new)
    }

    /// Rewritten operands, or `None` when every one is unchanged.
    fn visit_operands(&mut self, operands: &[Expr]) -> Result<Option<Vec<Expr>>, IrError> {
        let mut changed = false;
        let mut out = Vec::with_capacity(operands.len());
        for op in operands {
            let new = self.visit_operand(op)?;
            changed |= !new.same_as(op);
            out.push(new);
        }
        Ok(changed.then_some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Attrs;
    use crate::struct_info::{DataType, StructInfo};

    struct Identity;
    impl Mutate for Identity {}

    fn t(dims: &[i64]) -> StructInfo {
        StructInfo::tensor_static(dims, DataType::Float32)
    }

    fn sample() -> Function {
        let mut b = IrBuilder::new();
        b.enter_function("main").unwrap();
        let x = b.add_param("x", t(&[2, 3])).unwrap();
        let gv = b
            .emit(Expr::call_op("nn.relu", vec![Expr::var(&x)], Attrs::new()))
            .unwrap();
        b.enter_block(true).unwrap();
        let lv = b
            .emit(Expr::call_op("exp", vec![Expr::var(&gv)], Attrs::new()))
            .unwrap();
        let out = b
            .emit_output(Expr::call_op("add", vec![Expr::var(&lv), Expr::var(&x)], Attrs::new()))
            .unwrap();
        b.exit().unwrap();
        b.emit_func_output(vec![Expr::var(&out)]).unwrap();
        b.exit().unwrap();
        b.finish().unwrap().take("main").unwrap()
    }

    #[test]
    fn identity_preserves_vars_and_values() {
        let f = sample();
        let g = mutate_function(&Identity, &f, &Globals::new()).unwrap();
        assert_eq!(g.params, f.params);
        assert_eq!(g.blocks.len(), f.blocks.len());
        for (a, b) in f.bindings().zip(g.bindings()) {
            assert_eq!(a.var, b.var);
            assert!(a.value.same_as(&b.value));
        }
        assert_eq!(g.ret_struct_info, f.ret_struct_info);
    }

    struct ReluToExp;
    impl Mutate for ReluToExp {
        fn rewrite(&self, expr: Expr, _builder: &IrBuilder) -> Result<Expr, IrError> {
            match expr.as_call() {
                Some(c) if c.op_name() == Some("nn.relu") => Ok(expr.rebuild(ExprKind::Call(Call {
                    target: crate::expr::CallTarget::Op("exp".into()),
                    args: c.args.clone(),
                    attrs: Attrs::new(),
                }))),
                _ => Ok(expr),
            }
        }
    }

    #[test]
    fn rewritten_binding_keeps_var_when_struct_info_matches() {
        let f = sample();
        let g = mutate_function(&ReluToExp, &f, &Globals::new()).unwrap();
        let first = g.bindings().next().unwrap();
        assert_eq!(first.var, f.bindings().next().unwrap().var);
        assert_eq!(first.value.to_string(), "exp(x)");
        // Later bindings did not change.
        let (a, b) = (f.bindings().nth(1).unwrap(), g.bindings().nth(1).unwrap());
        assert!(a.value.same_as(&b.value));
    }

    struct SkipDataflow;
    impl Mutate for SkipDataflow {
        fn visits_block(&self, block: &BindingBlock) -> bool {
            !block.is_dataflow
        }
        fn rewrite(&self, expr: Expr, builder: &IrBuilder) -> Result<Expr, IrError> {
            ReluToExp.rewrite(expr, builder)
        }
    }

    #[test]
    fn unvisited_blocks_are_copied() {
        let f = sample();
        let g = mutate_function(&SkipDataflow, &f, &Globals::new()).unwrap();
        assert!(g.blocks[1].is_dataflow);
        for (a, b) in f.blocks[1].bindings.iter().zip(&g.blocks[1].bindings) {
            assert!(a.value.same_as(&b.value));
        }
    }
}
