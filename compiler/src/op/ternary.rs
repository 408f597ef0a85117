// op/ternary.rs — Fused multiply-add
//
// `ewise_fma(x1, x2, x3)` computes `x1 * x2 + x3` elementwise with no
// broadcasting: all three operands must agree on rank, shape and dtype.

use crate::diag::{ErrorKind, IrError};
use crate::expr::Call;
use crate::op::InferCtx;
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{StructInfo, TensorStructInfo};

pub fn ops() -> Vec<OpDef> {
    vec![OpDef::new("ewise_fma", infer_ewise_fma)
        .describe("Elementwise fused multiply-add of three same-shaped tensors.")
        .arg("x1", ArgKind::Tensor, "The left hand operand of the multiplication.")
        .arg("x2", ArgKind::Tensor, "The right hand operand of the multiplication.")
        .arg("x3", ArgKind::Tensor, "The operand of the addition.")]
}

fn infer_ewise_fma(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let t = ctx.input_tensors(call)?;
    let (t1, t2, t3) = (t[0], t[1], t[2]);

    let dtype = match (t1.dtype(), t2.dtype(), t3.dtype()) {
        (Some(a), Some(b), Some(c)) if a != b || b != c => {
            return Err(ctx.fatal(
                ErrorKind::DtypeConflict,
                format!(
                    "Data types {a}, {b} and {c} must be equal for EwiseFMA"
                ),
            ))
        }
        (Some(a), Some(_), Some(_)) => Some(a),
        _ => None,
    };

    let ndim = match (t1.ndim(), t2.ndim(), t3.ndim()) {
        (Some(a), Some(b), Some(c)) if a != b || b != c => {
            return Err(ctx.fatal(
                ErrorKind::ShapeConflict,
                format!("The 3 arguments of EwiseFMA must have the same number of dimensions, got {a}, {b} and {c}"),
            ))
        }
        (Some(a), Some(_), Some(_)) => Some(a),
        _ => None,
    };

    let (Some(s1), Some(s2), Some(s3)) = (t1.shape(), t2.shape(), t3.shape()) else {
        return Ok(TensorStructInfo::with_ndim(ndim, dtype).into());
    };
    for i in 0..s1.len() {
        let (d1, d2, d3) = (&s1[i], &s2[i], &s3[i]);
        if ctx.can_prove_equal(d1, d2) && ctx.can_prove_equal(d2, d3) {
            continue;
        }
        if let (Some(a), Some(b), Some(c)) = (d1.as_int(), d2.as_int(), d3.as_int()) {
            return Err(ctx.fatal(
                ErrorKind::ShapeConflict,
                format!(
                    "The 3 arguments of EwiseFMA must have the same shape, but dim {i} is {a}, {b} and {c}"
                ),
            ));
        }
        return Ok(TensorStructInfo::with_ndim(ndim, dtype).into());
    }
    Ok(TensorStructInfo::new(s1.to_vec(), dtype).into())
}

#[cfg(test)]
mod tests {
    use crate::diag::ErrorKind;
    use crate::expr::Attrs;
    use crate::op::test_util::*;
    use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

    #[test]
    fn same_shapes_pass_through() {
        let t = tensor(&[2, 3]);
        let out = infer("ewise_fma", vec![t.clone(), t.clone(), t.clone()], Attrs::new()).unwrap();
        assert_eq!(out, t);
    }

    #[test]
    fn literal_mismatch_is_fatal() {
        let err = infer(
            "ewise_fma",
            vec![tensor(&[2, 3]), tensor(&[2, 3]), tensor(&[2, 4])],
            Attrs::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeConflict);

        let err = infer(
            "ewise_fma",
            vec![tensor(&[2, 3]), tensor(&[2, 3]), tensor(&[6])],
            Attrs::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeConflict);
    }

    #[test]
    fn undecidable_dims_keep_rank() {
        let s = StructInfo::tensor(sym(&["n", "3"]), DataType::Float32);
        let out = infer(
            "ewise_fma",
            vec![s.clone(), tensor(&[4, 3]), s],
            Attrs::new(),
        )
        .unwrap();
        assert_eq!(
            out,
            StructInfo::Tensor(TensorStructInfo::with_ndim(Some(2), Some(DataType::Float32)))
        );
    }

    #[test]
    fn dtypes_must_agree() {
        let i = StructInfo::tensor_static(&[2], DataType::Int32);
        let err = infer("ewise_fma", vec![tensor(&[2]), tensor(&[2]), i], Attrs::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DtypeConflict);
    }
}
