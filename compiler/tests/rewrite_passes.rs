// Rewrite passes over builder-made functions.
//
// The reshape rewrite is checked against a function with two dataflow
// blocks separated by an ordinary block; ANF and normalize are checked for
// their identity behaviour on input they have nothing to do on.

use tensir::analysis::well_formed;
use tensir::builder::{Globals, IrBuilder};
use tensir::dim::PrimExpr;
use tensir::expr::{AttrValue, Attrs, Expr, Var};
use tensir::ir::{Function, IrModule};
use tensir::pass::PassId;
use tensir::pipeline::{run_passes, PipelineOptions};
use tensir::struct_info::{DataType, StructInfo};
use tensir::transform::{normalize, rewrite_dataflow_reshape, to_anf};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn t(dims: &[i64]) -> StructInfo {
    StructInfo::tensor_static(dims, DataType::Float32)
}

fn reshape_kernel(x: &Var, dims: &[i64]) -> Expr {
    Expr::call_op(
        "call_tir",
        vec![
            Expr::global_var("reshape"),
            Expr::tuple(vec![Expr::var(x)]),
            Expr::shape(dims.iter().copied().map(PrimExpr::Int).collect()),
        ],
        Attrs::new().with("dtype", AttrValue::DType(DataType::Float32)),
    )
}

fn unary(op: &str, x: &Var) -> Expr {
    Expr::call_op(op, vec![Expr::var(x)], Attrs::new())
}

/// Two dataflow blocks, each with one reshape kernel and one unrelated
/// binding, around an ordinary block that also calls the kernel.
fn two_dataflow_blocks() -> Function {
    let mut b = IrBuilder::new();
    b.enter_function("main").unwrap();
    let x = b.add_param("x", t(&[2, 3])).unwrap();

    b.enter_block(true).unwrap();
    let lv = b.emit(reshape_kernel(&x, &[3, 2])).unwrap();
    let gv = b.emit_output(unary("exp", &lv)).unwrap();
    b.exit().unwrap();

    let gv1 = b.emit(reshape_kernel(&gv, &[6])).unwrap();

    b.enter_block(true).unwrap();
    let lv1 = b.emit(unary("nn.relu", &gv1)).unwrap();
    let gv2 = b.emit_output(reshape_kernel(&lv1, &[2, 3])).unwrap();
    b.exit().unwrap();

    b.emit_func_output(vec![Expr::var(&gv2)]).unwrap();
    b.exit().unwrap();
    b.finish().unwrap().take("main").unwrap()
}

fn render(f: &Function) -> Vec<String> {
    f.bindings()
        .map(|b| format!("{} = {}", b.var, b.value))
        .collect()
}

// ── rewrite_dataflow_reshape ────────────────────────────────────────────────

#[test]
fn reshape_rewrite_end_to_end() {
    let f = two_dataflow_blocks();
    let g = rewrite_dataflow_reshape(&f, &Globals::new()).unwrap();

    assert_eq!(
        render(&g),
        vec![
            "lv = vm.builtin.reshape(x, shape(3, 2))",
            "gv = exp(lv)",
            "gv1 = call_tir(@reshape, (gv,), shape(6,), dtype=float32)",
            "lv1 = nn.relu(gv1)",
            "gv2 = vm.builtin.reshape(lv1, shape(2, 3))",
        ]
    );

    // Same block structure and var kinds.
    let kinds = |f: &Function| -> Vec<(bool, Vec<bool>)> {
        f.blocks
            .iter()
            .map(|blk| (blk.is_dataflow, blk.bindings.iter().map(|b| b.var.is_dataflow()).collect()))
            .collect()
    };
    assert_eq!(kinds(&g), kinds(&f));

    // Unmatched bindings keep their identity; the ordinary block is untouched.
    for (old, new) in f.bindings().zip(g.bindings()) {
        assert_eq!(old.var, new.var);
    }
    assert!(g.blocks[0].bindings[1].value.same_as(&f.blocks[0].bindings[1].value));
    assert!(g.blocks[1].bindings[0].value.same_as(&f.blocks[1].bindings[0].value));
    assert!(g.blocks[2].bindings[0].value.same_as(&f.blocks[2].bindings[0].value));
    assert!(well_formed(&g).is_empty());
}

#[test]
fn reshape_rewrite_is_idempotent() {
    let f = two_dataflow_blocks();
    let once = rewrite_dataflow_reshape(&f, &Globals::new()).unwrap();
    let twice = rewrite_dataflow_reshape(&once, &Globals::new()).unwrap();
    for (a, b) in once.bindings().zip(twice.bindings()) {
        assert!(a.value.same_as(&b.value));
    }
}

// ── to_anf ──────────────────────────────────────────────────────────────────

#[test]
fn anf_flattens_then_stays_put() {
    let mut b = IrBuilder::new();
    b.enter_function("main").unwrap();
    let x = b.add_param("x", t(&[4])).unwrap();
    let y = b.add_param("y", t(&[4])).unwrap();
    b.enter_block(true).unwrap();
    let nested = Expr::call_op(
        "add",
        vec![
            unary("exp", &x),
            Expr::call_op("multiply", vec![unary("log", &y), Expr::var(&x)], Attrs::new()),
        ],
        Attrs::new(),
    );
    let gv = b.emit_output(nested).unwrap();
    b.exit().unwrap();
    b.emit_func_output(vec![Expr::tuple(vec![Expr::var(&gv), Expr::var(&x)])])
        .unwrap();
    b.exit().unwrap();
    let f = b.finish().unwrap().take("main").unwrap();

    let g = to_anf(&f, &Globals::new()).unwrap();
    assert_eq!(
        render(&g),
        vec![
            "lv = exp(x)",
            "lv1 = log(y)",
            "lv2 = multiply(lv1, x)",
            "gv = add(lv, lv2)",
        ]
    );
    assert!(well_formed(&g).is_empty());

    let h = to_anf(&g, &Globals::new()).unwrap();
    assert_eq!(render(&h), render(&g));
    for (a, b) in g.bindings().zip(h.bindings()) {
        assert!(a.value.same_as(&b.value));
    }
}

// ── normalize ───────────────────────────────────────────────────────────────

#[test]
fn normalize_reaches_fixed_point() {
    let f = two_dataflow_blocks();
    let once = normalize(&f, &Globals::new()).unwrap();
    for (a, b) in f.bindings().zip(once.bindings()) {
        assert_eq!(a.var, b.var);
        assert_eq!(a.var.struct_info(), b.var.struct_info());
    }
}

// ── pipeline ────────────────────────────────────────────────────────────────

#[test]
fn pipeline_runs_rewrites_in_order() {
    let mut m = IrModule::new();
    m.add(two_dataflow_blocks()).unwrap();
    let out = run_passes(
        &m,
        &[PassId::RewriteDataflowReshape, PassId::ToAnf],
        &PipelineOptions::default(),
    )
    .unwrap();
    let f = out.get("main").unwrap();
    let builtin = f
        .bindings()
        .filter(|b| b.value.as_call().and_then(|c| c.op_name()) == Some("vm.builtin.reshape"))
        .count();
    assert_eq!(builtin, 2);
    assert!(well_formed(f).is_empty());
}
