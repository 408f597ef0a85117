// transform/to_anf.rs — Administrative normal form
//
// Binds every non-atomic operand to a fresh var right before the binding
// that uses it, in evaluation order (left to right, innermost first). Atoms
// are leaves and tuples whose fields are all atoms. Input already in ANF
// comes back unchanged.

use crate::builder::Globals;
use crate::diag::IrError;
use crate::expr::{Expr, ExprKind};
use crate::ir::Function;
use crate::transform::mutator::{mutate_function, Mutate};

pub struct ToAnf;

impl Mutate for ToAnf {
    fn hoists(&self, operand: &Expr) -> bool {
        !is_atomic(operand)
    }
}

/// A leaf, or a tuple of atoms.
pub fn is_atomic(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Tuple(fields) => fields.iter().all(is_atomic),
        ExprKind::Call(_) => false,
        _ => true,
    }
}

pub fn to_anf(func: &Function, globals: &Globals) -> Result<Function, IrError> {
    mutate_function(&ToAnf, func, globals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::expr::{Attrs, Var};
    use crate::struct_info::{DataType, StructInfo};

    fn t(dims: &[i64]) -> StructInfo {
        StructInfo::tensor_static(dims, DataType::Float32)
    }

    fn call(op: &str, args: Vec<Expr>) -> Expr {
        Expr::call_op(op, args, Attrs::new())
    }

    #[test]
    fn atoms() {
        let x = Var::new("x", t(&[1]), false);
        assert!(is_atomic(&Expr::var(&x)));
        assert!(is_atomic(&Expr::tuple(vec![Expr::var(&x), Expr::shape(vec![])])));
        assert!(!is_atomic(&call("exp", vec![Expr::var(&x)])));
        assert!(!is_atomic(&Expr::tuple(vec![call("exp", vec![Expr::var(&x)])])));
    }

    #[test]
    fn nested_calls_are_hoisted_in_order() {
        let mut b = IrBuilder::new();
        b.enter_function("main").unwrap();
        let x = b.add_param("x", t(&[2])).unwrap();
        let nested = call(
            "add",
            vec![
                call("nn.relu", vec![Expr::var(&x)]),
                call("exp", vec![call("log", vec![Expr::var(&x)])]),
            ],
        );
        let gv = b.emit(nested).unwrap();
        b.emit_func_output(vec![Expr::var(&gv)]).unwrap();
        b.exit().unwrap();
        let f = b.finish().unwrap().take("main").unwrap();

        let g = to_anf(&f, &Globals::new()).unwrap();
        let lines: Vec<String> = g
            .bindings()
            .map(|b| format!("{} = {}", b.var, b.value))
            .collect();
        assert_eq!(
            lines,
            vec![
                "gv1 = nn.relu(x)",
                "gv2 = log(x)",
                "gv3 = exp(gv2)",
                "gv = add(gv1, gv3)",
            ]
        );
        assert!(crate::analysis::well_formed(&g).is_empty());
    }

    #[test]
    fn hoisting_inside_dataflow_uses_dataflow_vars() {
        let mut b = IrBuilder::new();
        b.enter_function("main").unwrap();
        let x = b.add_param("x", t(&[2])).unwrap();
        b.enter_block(true).unwrap();
        let out = b
            .emit_output(call("exp", vec![call("nn.relu", vec![Expr::var(&x)])]))
            .unwrap();
        b.exit().unwrap();
        b.emit_func_output(vec![Expr::var(&out)]).unwrap();
        b.exit().unwrap();
        let f = b.finish().unwrap().take("main").unwrap();

        let g = to_anf(&f, &Globals::new()).unwrap();
        let vars: Vec<(&str, bool)> = g
            .bindings()
            .map(|b| (b.var.name(), b.var.is_dataflow()))
            .collect();
        assert_eq!(vars, vec![("lv", true), ("gv", false)]);
    }

    #[test]
    fn anf_input_is_unchanged() {
        let mut b = IrBuilder::new();
        b.enter_function("main").unwrap();
        let x = b.add_param("x", t(&[2])).unwrap();
        let gv = b.emit(call("exp", vec![Expr::var(&x)])).unwrap();
        let gv1 = b
            .emit(Expr::tuple(vec![Expr::var(&gv), Expr::var(&x)]))
            .unwrap();
        b.emit_func_output(vec![Expr::var(&gv1)]).unwrap();
        b.exit().unwrap();
        let f = b.finish().unwrap().take("main").unwrap();

        let g = to_anf(&f, &Globals::new()).unwrap();
        assert_eq!(g.num_bindings(), f.num_bindings());
        for (a, c) in f.bindings().zip(g.bindings()) {
            assert_eq!(a.var, c.var);
            assert!(a.value.same_as(&c.value));
        }
    }
}
