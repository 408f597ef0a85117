// Property-based tests for inference and rewrite invariants.
//
// Four categories:
// 1. Broadcast symmetry over literal shapes
// 2. Axis normalization: a negative axis and its positive form agree
// 3. ANF: flattening is idempotent and yields well-formed functions
// 4. Determinism: rebuilding the same function serializes identically
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;
use tensir::analysis::well_formed;
use tensir::builder::{Globals, IrBuilder};
use tensir::diag::{ErrorKind, IrError};
use tensir::expr::{AttrValue, Attrs, Expr};
use tensir::ir::{Function, IrModule};
use tensir::serial::to_json_compact;
use tensir::struct_info::{DataType, StructInfo};
use tensir::transform::{is_atomic, to_anf};

// ── Test helpers ────────────────────────────────────────────────────────────

fn t(dims: &[i64]) -> StructInfo {
    StructInfo::tensor_static(dims, DataType::Float32)
}

fn infer(op: &str, params: Vec<StructInfo>, attrs: Attrs) -> Result<StructInfo, IrError> {
    let mut b = IrBuilder::new();
    b.enter_function("main")?;
    let mut args = Vec::new();
    for (i, si) in params.into_iter().enumerate() {
        args.push(Expr::var(&b.add_param(&format!("p{i}"), si)?));
    }
    Ok(b.emit(Expr::call_op(op, args, attrs))?.struct_info().clone())
}

/// Shapes of rank 0..=4 whose dims are drawn from {1, 2, 3}.
fn arb_shape() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..=3, 0..=4)
}

/// Nest unary and binary calls around `x` following `steps`, then bind the
/// result either in a dataflow block or at function level.
fn nested_function(steps: &[u8], dataflow: bool) -> Function {
    let mut b = IrBuilder::new();
    b.enter_function("main").unwrap();
    let x = b.add_param("x", t(&[2, 3])).unwrap();
    let mut e = Expr::var(&x);
    for step in steps {
        e = match step % 4 {
            0 => Expr::call_op("exp", vec![e], Attrs::new()),
            1 => Expr::call_op("nn.relu", vec![e], Attrs::new()),
            2 => Expr::call_op("add", vec![e, Expr::var(&x)], Attrs::new()),
            _ => Expr::call_op("multiply", vec![Expr::var(&x), e], Attrs::new()),
        };
    }
    let out = if dataflow {
        b.enter_block(true).unwrap();
        let gv = b.emit_output(e).unwrap();
        b.exit().unwrap();
        gv
    } else {
        b.emit(e).unwrap()
    };
    b.emit_func_output(vec![Expr::var(&out)]).unwrap();
    b.exit().unwrap();
    b.finish().unwrap().take("main").unwrap()
}

fn module_of(f: Function) -> IrModule {
    let mut m = IrModule::new();
    m.add(f).unwrap();
    m
}

// ── Broadcast ───────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 200,
        .. ProptestConfig::default()
    })]

    #[test]
    fn broadcast_is_symmetric(a in arb_shape(), b in arb_shape()) {
        let ab = infer("add", vec![t(&a), t(&b)], Attrs::new());
        let ba = infer("add", vec![t(&b), t(&a)], Attrs::new());
        match (ab, ba) {
            (Ok(x), Ok(y)) => {
                prop_assert_eq!(&x, &y);
                let rank = x.as_tensor().and_then(|t| t.ndim());
                prop_assert_eq!(rank, Some(a.len().max(b.len())));
            }
            (Err(x), Err(y)) => {
                prop_assert_eq!(x.kind, ErrorKind::ShapeConflict);
                prop_assert_eq!(y.kind, ErrorKind::ShapeConflict);
            }
            (x, y) => prop_assert!(false, "asymmetric result: {:?} vs {:?}", x, y),
        }
    }
}

// ── Axis normalization ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn negative_axis_matches_positive(shape in prop::collection::vec(1i64..=5, 1..=5), pick in 0usize..5) {
        let rank = shape.len() as i64;
        let axis = (pick as i64) % rank;
        let sum = |ax: i64| {
            infer(
                "sum",
                vec![t(&shape)],
                Attrs::new().with("axis", AttrValue::Ints(vec![ax])),
            )
        };
        let pos = sum(axis).unwrap();
        let neg = sum(axis - rank).unwrap();
        prop_assert_eq!(&pos, &neg);

        let mut expected = shape.clone();
        expected.remove(axis as usize);
        prop_assert_eq!(pos, t(&expected));

        prop_assert_eq!(sum(rank).unwrap_err().kind, ErrorKind::Range);
        prop_assert_eq!(sum(-rank - 1).unwrap_err().kind, ErrorKind::Range);
    }
}

// ── ANF ─────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn anf_is_idempotent(steps in prop::collection::vec(any::<u8>(), 1..8), dataflow in any::<bool>()) {
        let f = nested_function(&steps, dataflow);
        let once = to_anf(&f, &Globals::new()).unwrap();
        prop_assert!(well_formed(&once).is_empty());
        prop_assert_eq!(once.num_bindings(), steps.len());
        for binding in once.bindings() {
            let call = binding.value.as_call().unwrap();
            prop_assert!(call.args.iter().all(is_atomic));
        }

        let twice = to_anf(&once, &Globals::new()).unwrap();
        for (a, b) in once.bindings().zip(twice.bindings()) {
            prop_assert_eq!(&a.var, &b.var);
            prop_assert!(a.value.same_as(&b.value));
        }
        prop_assert_eq!(
            to_json_compact(&module_of(once)).unwrap(),
            to_json_compact(&module_of(twice)).unwrap()
        );
    }
}

// ── Determinism ─────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 50,
        .. ProptestConfig::default()
    })]

    #[test]
    fn rebuilding_serializes_identically(steps in prop::collection::vec(any::<u8>(), 1..8), dataflow in any::<bool>()) {
        let first = to_json_compact(&module_of(nested_function(&steps, dataflow))).unwrap();
        let second = to_json_compact(&module_of(nested_function(&steps, dataflow))).unwrap();
        prop_assert_eq!(first, second);
    }
}
