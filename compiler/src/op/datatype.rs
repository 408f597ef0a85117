// op/datatype.rs — Element-type and accumulation operators
//
// astype, wrap_param, cumsum, collapse_sum_like, collapse_sum_to.

use crate::diag::IrError;
use crate::dim::PrimExpr;
use crate::expr::Call;
use crate::op::{normalize_axis, InferCtx};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{StructInfo, TensorStructInfo};

pub fn ops() -> Vec<OpDef> {
    vec![
        OpDef::new("astype", infer_cast)
            .describe("Cast the input tensor to the given dtype.")
            .arg("x", ArgKind::Tensor, "The input tensor."),
        OpDef::new("wrap_param", infer_cast)
            .describe("Cast a model parameter to the given dtype; never rewritten by mixed precision.")
            .arg("data", ArgKind::Tensor, "The input tensor."),
        OpDef::new("cumsum", infer_cumsum)
            .describe("Cumulative sum along an axis, or over the flattened input.")
            .arg("data", ArgKind::Tensor, "The input tensor."),
        OpDef::new("collapse_sum_like", infer_collapse_sum_like)
            .describe("Sum data down to the shape of collapse_target.")
            .arg("data", ArgKind::Tensor, "The input tensor.")
            .arg(
                "collapse_target",
                ArgKind::Tensor,
                "The tensor whose shape is the shape to collapse to.",
            ),
        OpDef::new("collapse_sum_to", infer_collapse_sum_to)
            .describe("Sum data down to the given shape.")
            .arg("data", ArgKind::Tensor, "The input tensor.")
            .arg("shape", ArgKind::Shape, "The shape to collapse to."),
    ]
}

fn infer_cast(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let x = ctx.tensor(call, 0)?;
    let dtype = ctx
        .attr_dtype(call, "dtype")?
        .ok_or_else(|| ctx.missing_attr("dtype"))?;
    Ok(x.with_dtype(Some(dtype)).into())
}

fn infer_cumsum(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    match ctx.attr_int(call, "axis")? {
        Some(axis) => {
            if let Some(ndim) = data.ndim() {
                normalize_axis(ctx, ndim, axis)?;
            }
            Ok(StructInfo::Tensor(data.clone()))
        }
        None => Ok(match data.shape() {
            Some(shape) => TensorStructInfo::new(vec![PrimExpr::product(shape)], data.dtype()),
            None => TensorStructInfo::with_ndim(Some(1), data.dtype()),
        }
        .into()),
    }
}

fn infer_collapse_sum_like(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let target = ctx.tensor(call, 1)?;
    Ok(target.with_dtype(data.dtype()).into())
}

fn infer_collapse_sum_to(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let (values, ndim) = ctx.shape_arg(call, 1)?;
    Ok(TensorStructInfo::from_parts(values.map(<[PrimExpr]>::to_vec), ndim, data.dtype()).into())
}

#[cfg(test)]
mod tests {
    use crate::diag::ErrorKind;
    use crate::expr::{AttrValue, Attrs};
    use crate::op::test_util::*;
    use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

    #[test]
    fn astype_changes_dtype_only() {
        let attrs = Attrs::new().with("dtype", AttrValue::DType(DataType::Float16));
        let out = infer("astype", vec![tensor(&[2, 3])], attrs).unwrap();
        assert_eq!(out, StructInfo::tensor_static(&[2, 3], DataType::Float16));

        let attrs = Attrs::new().with("dtype", AttrValue::Str("int8".into()));
        let out = infer("wrap_param", vec![tensor(&[4])], attrs).unwrap();
        assert_eq!(out, StructInfo::tensor_static(&[4], DataType::Int8));

        let err = infer("astype", vec![tensor(&[2])], Attrs::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Attr);
    }

    #[test]
    fn cumsum_flattens_without_axis() {
        let out = infer("cumsum", vec![tensor(&[2, 3, 4])], Attrs::new()).unwrap();
        assert_eq!(out, tensor(&[24]));

        let n = StructInfo::tensor(sym(&["n", "4"]), DataType::Float32);
        let out = infer("cumsum", vec![n], Attrs::new()).unwrap();
        assert_eq!(out.to_string(), "Tensor[(n * 4,), float32]");

        let attrs = Attrs::new().with("axis", AttrValue::Int(1));
        let out = infer("cumsum", vec![tensor(&[2, 3])], attrs).unwrap();
        assert_eq!(out, tensor(&[2, 3]));
    }

    #[test]
    fn collapse_sum_targets() {
        let out = infer(
            "collapse_sum_like",
            vec![tensor(&[3, 4]), StructInfo::tensor_static(&[4], DataType::Int32)],
            Attrs::new(),
        )
        .unwrap();
        assert_eq!(out, tensor(&[4]));

        let out = infer(
            "collapse_sum_to",
            vec![tensor(&[3, 4]), StructInfo::shape(sym(&["1", "4"]))],
            Attrs::new(),
        )
        .unwrap();
        assert_eq!(out, tensor(&[1, 4]));

        let rank_only = StructInfo::Shape {
            values: None,
            ndim: Some(2),
        };
        let out = infer("collapse_sum_to", vec![tensor(&[3, 4]), rank_only], Attrs::new()).unwrap();
        assert_eq!(
            out,
            StructInfo::Tensor(TensorStructInfo::with_ndim(Some(2), Some(DataType::Float32)))
        );
    }
}
