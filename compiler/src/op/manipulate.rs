// op/manipulate.rs — Layout manipulation: transpose, reshape

use crate::diag::{ErrorKind, IrError};
use crate::dim::{fmt_shape, PrimExpr};
use crate::expr::Call;
use crate::op::{normalize_axes, InferCtx};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{StructInfo, TensorStructInfo};

pub fn ops() -> Vec<OpDef> {
    vec![
        OpDef::new("transpose", infer_transpose)
            .describe("Permute the axes of a tensor; reverses them when no axes are given.")
            .arg("data", ArgKind::Tensor, "The input tensor."),
        OpDef::new("reshape", infer_reshape)
            .describe("Reshape a tensor; one -1 entry is inferred from the element count.")
            .arg("data", ArgKind::Tensor, "The input tensor.")
            .arg("shape", ArgKind::Shape, "The new shape."),
    ]
}

fn infer_transpose(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let axes = ctx.attr_ints(call, "axes")?;

    let ndim = match (data.ndim(), &axes) {
        (Some(n), _) => n,
        (None, Some(a)) => return Ok(TensorStructInfo::with_ndim(Some(a.len()), data.dtype()).into()),
        (None, None) => return Ok(StructInfo::Tensor(data.clone())),
    };
    let perm: Vec<usize> = match &axes {
        Some(a) => {
            if a.len() != ndim {
                return Err(ctx.fatal(
                    ErrorKind::Attr,
                    format!(
                        "transpose expects the number of axes to equal the input ndim {ndim}, but got {} axes",
                        a.len()
                    ),
                ));
            }
            normalize_axes(ctx, ndim, a)?
        }
        None => (0..ndim).rev().collect(),
    };
    Ok(match data.shape() {
        Some(s) => TensorStructInfo::new(perm.iter().map(|&i| s[i].clone()).collect(), data.dtype()),
        None => TensorStructInfo::with_ndim(Some(ndim), data.dtype()),
    }
    .into())
}

fn infer_reshape(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let (values, ndim) = ctx.shape_arg(call, 1)?;
    let Some(values) = values else {
        return Ok(TensorStructInfo::with_ndim(ndim, data.dtype()).into());
    };

    let inferred: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_int(-1))
        .map(|(i, _)| i)
        .collect();
    if inferred.len() > 1 {
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            format!("reshape accepts at most one -1 in the new shape, got {}", fmt_shape(values)),
        ));
    }

    let mut out = values.to_vec();
    match (inferred.first(), data.shape()) {
        (Some(&pos), Some(old)) => {
            let known = PrimExpr::product(values.iter().filter(|d| !d.is_int(-1)));
            let dim = PrimExpr::floordiv(PrimExpr::product(old), known);
            out[pos] = ctx.analyzer.simplify(&dim);
        }
        (Some(_), None) => {
            return Ok(TensorStructInfo::with_ndim(Some(values.len()), data.dtype()).into());
        }
        (None, Some(old)) => {
            let before = PrimExpr::product(old);
            let after = PrimExpr::product(values);
            if ctx.can_prove_not_equal(&before, &after) {
                return Err(ctx.fatal(
                    ErrorKind::ShapeConflict,
                    format!(
                        "reshape expects the new shape {} to have the same number of elements as the input shape {}",
                        fmt_shape(values),
                        fmt_shape(old)
                    ),
                ));
            }
        }
        (None, None) => {}
    }
    Ok(TensorStructInfo::new(out, data.dtype()).into())
}

#[cfg(test)]
mod tests {
    use crate::diag::ErrorKind;
    use crate::expr::{AttrValue, Attrs};
    use crate::op::test_util::*;
    use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

    #[test]
    fn transpose_with_negative_axes() {
        let attrs = Attrs::new().with("axes", AttrValue::Ints(vec![1, -1, 2, -4]));
        let out = infer("transpose", vec![tensor(&[1, 2, 3, 4])], attrs).unwrap();
        assert_eq!(out, tensor(&[2, 4, 3, 1]));
    }

    #[test]
    fn transpose_defaults_to_reverse() {
        let out = infer("transpose", vec![tensor(&[1, 2, 3])], Attrs::new()).unwrap();
        assert_eq!(out, tensor(&[3, 2, 1]));
    }

    #[test]
    fn transpose_rejects_bad_axes() {
        let attrs = Attrs::new().with("axes", AttrValue::Ints(vec![0, 1]));
        let err = infer("transpose", vec![tensor(&[1, 2, 3])], attrs).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Attr);

        let attrs = Attrs::new().with("axes", AttrValue::Ints(vec![0, 0, 1]));
        let err = infer("transpose", vec![tensor(&[1, 2, 3])], attrs).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateAxis);
    }

    #[test]
    fn transpose_unknown_rank_takes_axes_length() {
        let data = StructInfo::Tensor(TensorStructInfo::with_ndim(None, Some(DataType::Float32)));
        let attrs = Attrs::new().with("axes", AttrValue::Ints(vec![1, 0]));
        let out = infer("transpose", vec![data], attrs).unwrap();
        assert_eq!(
            out,
            StructInfo::Tensor(TensorStructInfo::with_ndim(Some(2), Some(DataType::Float32)))
        );
    }

    #[test]
    fn reshape_infers_minus_one() {
        let shape = StructInfo::shape(sym(&["4", "-1"]));
        let out = infer("reshape", vec![tensor(&[2, 3, 4]), shape], Attrs::new()).unwrap();
        assert_eq!(out, tensor(&[4, 6]));

        let data = StructInfo::tensor(sym(&["n", "4"]), DataType::Float32);
        let shape = StructInfo::shape(sym(&["-1", "2"]));
        let out = infer("reshape", vec![data, shape], Attrs::new()).unwrap();
        assert_eq!(out.to_string(), "Tensor[(n * 2, 2), float32]");
    }

    #[test]
    fn reshape_checks_element_count() {
        let shape = StructInfo::shape(sym(&["5", "5"]));
        let err = infer("reshape", vec![tensor(&[2, 3, 4]), shape], Attrs::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeConflict);

        let shape = StructInfo::shape(sym(&["-1", "-1"]));
        let err = infer("reshape", vec![tensor(&[4]), shape], Attrs::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeConflict);
    }
}
