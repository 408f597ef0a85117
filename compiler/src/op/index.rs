// op/index.rs — Indexing operators: take, strided_slice

use crate::diag::{ErrorKind, IrError};
use crate::dim::PrimExpr;
use crate::expr::Call;
use crate::op::{normalize_axes, normalize_axis, InferCtx};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{StructInfo, TensorStructInfo};

pub fn ops() -> Vec<OpDef> {
    vec![
        OpDef::new("take", infer_take)
            .describe("Gather elements of data along an axis at the given indices.")
            .arg("data", ArgKind::Tensor, "The source tensor.")
            .arg("indices", ArgKind::Tensor, "The indices of the values to extract."),
        OpDef::new("strided_slice", infer_strided_slice)
            .describe("Strided slice of a tensor along the given axes.")
            .arg("data", ArgKind::Tensor, "The source tensor to be sliced."),
    ]
}

// ── take ────────────────────────────────────────────────────────────────────

fn infer_take(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let indices = ctx.tensor(call, 1)?;
    let axis = ctx.attr_int(call, "axis")?;

    if indices.ndim() != Some(1) {
        let shown = indices
            .ndim()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".into());
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            format!("Take op requires the input indices to be 1-dimensional tensor. However, the given indices ndim is {shown}"),
        ));
    }
    if let Some(d) = indices.dtype() {
        if !d.is_int() {
            return Err(ctx.fatal(
                ErrorKind::DtypeConflict,
                format!("Take op requires the input indices to have integer dtype. However, the given indices dtype is {d}"),
            ));
        }
    }
    if axis.is_none() && data.ndim().is_some_and(|n| n != 1) {
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            format!(
                "Take op expects the input data to be 1-dimensional tensor when the axis is not specified. However, the given data tensor has ndim {}",
                data.ndim().unwrap_or_default()
            ),
        ));
    }

    let Some(ndim) = data.ndim() else {
        return Ok(TensorStructInfo::with_ndim(None, data.dtype()).into());
    };
    let axis = normalize_axis(ctx, ndim, axis.unwrap_or(0))?;
    match (data.shape(), indices.shape()) {
        (Some(ds), Some(is)) => {
            let mut out = ds.to_vec();
            out[axis] = is[0].clone();
            Ok(TensorStructInfo::new(out, data.dtype()).into())
        }
        _ => Ok(TensorStructInfo::with_ndim(Some(ndim), data.dtype()).into()),
    }
}

// ── strided_slice ───────────────────────────────────────────────────────────

fn infer_strided_slice(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let axes = ctx
        .attr_ints(call, "axes")?
        .ok_or_else(|| ctx.missing_attr("axes"))?;
    let begin = ctx
        .attr_dims(call, "begin")?
        .ok_or_else(|| ctx.missing_attr("begin"))?;
    let end = ctx
        .attr_dims(call, "end")?
        .ok_or_else(|| ctx.missing_attr("end"))?;
    let strides = ctx.attr_dims(call, "strides")?;

    let n = axes.len();
    if begin.len() != n || end.len() != n || strides.as_ref().is_some_and(|s| s.len() != n) {
        return Err(ctx.fatal(
            ErrorKind::Attr,
            format!(
                "StridedSlice requires begin, end and strides to have the same length as axes ({n})"
            ),
        ));
    }
    if axes.is_empty() {
        return Ok(StructInfo::Tensor(data.clone()));
    }
    let Some(ndim) = data.ndim() else {
        return Ok(TensorStructInfo::with_ndim(None, data.dtype()).into());
    };
    let axes = normalize_axes(ctx, ndim, &axes)?;
    let Some(shape) = data.shape() else {
        return Ok(TensorStructInfo::with_ndim(Some(ndim), data.dtype()).into());
    };

    let mut out = shape.to_vec();
    for (i, &axis) in axes.iter().enumerate() {
        let stride = match &strides {
            Some(s) => s[i].as_int(),
            None => Some(1),
        };
        let (Some(b), Some(e), Some(s)) = (begin[i].as_int(), end[i].as_int(), stride) else {
            return Ok(TensorStructInfo::with_ndim(Some(ndim), data.dtype()).into());
        };
        if s == 0 {
            return Err(ctx.fatal(
                ErrorKind::Attr,
                format!("StridedSlice requires non-zero strides, but the stride of axis {axis} is 0"),
            ));
        }
        let (b, e) = match shape[axis].as_int() {
            Some(extent) => (
                canonical_index(b, extent, s),
                canonical_index(e, extent, s),
            ),
            None => (b, e),
        };
        let Some(len) = slice_len(b, e, s) else {
            return Ok(TensorStructInfo::with_ndim(Some(ndim), data.dtype()).into());
        };
        out[axis] = PrimExpr::Int(len);
    }
    Ok(TensorStructInfo::new(out, data.dtype()).into())
}

/// Wrap a negative index once and clamp it into the range a slice with
/// stride `s` can address on an axis of `extent`.
fn canonical_index(index: i64, extent: i64, s: i64) -> i64 {
    let index = if index < 0 { index.saturating_add(extent) } else { index };
    if s > 0 {
        index.clamp(0, extent.max(0))
    } else {
        index.clamp(-1, extent.max(0) - 1)
    }
}

/// Number of elements from `b` towards `e` in steps of `s` (non-zero).
/// `None` when the distance does not fit in an i64.
fn slice_len(b: i64, e: i64, s: i64) -> Option<i64> {
    let dist = if s < 0 { b.checked_sub(e)? } else { e.checked_sub(b)? };
    if dist <= 0 {
        return Some(0);
    }
    i64::try_from(dist.unsigned_abs().div_ceil(s.unsigned_abs())).ok()
}

#[cfg(test)]
mod tests {
    use crate::diag::ErrorKind;
    use crate::expr::{AttrValue, Attrs};
    use crate::op::test_util::*;
    use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

    fn idx(n: i64) -> StructInfo {
        StructInfo::tensor_static(&[n], DataType::Int64)
    }

    #[test]
    fn take_replaces_axis_with_index_count() {
        let attrs = Attrs::new().with("axis", AttrValue::Int(-1));
        let out = infer("take", vec![tensor(&[4, 5, 6]), idx(3)], attrs).unwrap();
        assert_eq!(out, tensor(&[4, 5, 3]));

        let out = infer("take", vec![tensor(&[10]), idx(2)], Attrs::new()).unwrap();
        assert_eq!(out, tensor(&[2]));
    }

    #[test]
    fn take_validates_indices_and_axis() {
        let err = infer(
            "take",
            vec![tensor(&[4]), StructInfo::tensor_static(&[2, 2], DataType::Int64)],
            Attrs::new(),
        )
        .unwrap_err();
        assert!(err.message().contains("ndim is 2"));

        let err = infer("take", vec![tensor(&[4]), tensor(&[2])], Attrs::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DtypeConflict);

        let err = infer("take", vec![tensor(&[4, 4]), idx(2)], Attrs::new()).unwrap_err();
        assert!(err.message().contains("axis is not specified"));

        let attrs = Attrs::new().with("axis", AttrValue::Int(2));
        let err = infer("take", vec![tensor(&[4, 4]), idx(2)], attrs).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Range);
    }

    #[test]
    fn take_unknown_data_shape_keeps_rank() {
        let data = StructInfo::Tensor(TensorStructInfo::with_ndim(Some(2), Some(DataType::Float32)));
        let attrs = Attrs::new().with("axis", AttrValue::Int(0));
        let out = infer("take", vec![data.clone(), idx(3)], attrs).unwrap();
        assert_eq!(out, data);
    }

    fn slice(axes: &[i64], begin: &[i64], end: &[i64], strides: Option<&[i64]>) -> Attrs {
        let mut attrs = Attrs::new()
            .with("axes", AttrValue::Ints(axes.to_vec()))
            .with("begin", AttrValue::Ints(begin.to_vec()))
            .with("end", AttrValue::Ints(end.to_vec()));
        if let Some(s) = strides {
            attrs = attrs.with("strides", AttrValue::Ints(s.to_vec()));
        }
        attrs
    }

    #[test]
    fn strided_slice_lengths() {
        let out = infer(
            "strided_slice",
            vec![tensor(&[8, 9, 10])],
            slice(&[0, 2], &[1, 0], &[8, 10], Some(&[2, 3])),
        )
        .unwrap();
        assert_eq!(out, tensor(&[4, 9, 4]));

        let out = infer(
            "strided_slice",
            vec![tensor(&[8])],
            slice(&[0], &[7], &[0], Some(&[-2])),
        )
        .unwrap();
        assert_eq!(out, tensor(&[4]));

        let out = infer("strided_slice", vec![tensor(&[8])], slice(&[0], &[5], &[2], None)).unwrap();
        assert_eq!(out, tensor(&[0]));
    }

    #[test]
    fn strided_slice_extreme_bounds() {
        // Slice to the end with a negative begin.
        let out = infer(
            "strided_slice",
            vec![tensor(&[10])],
            slice(&[0], &[-3], &[i64::MAX], None),
        )
        .unwrap();
        assert_eq!(out, tensor(&[3]));

        let out = infer(
            "strided_slice",
            vec![tensor(&[10])],
            slice(&[0], &[i64::MIN], &[i64::MAX], Some(&[i64::MAX])),
        )
        .unwrap();
        assert_eq!(out, tensor(&[1]));

        let out = infer(
            "strided_slice",
            vec![tensor(&[10])],
            slice(&[0], &[9], &[i64::MIN], Some(&[i64::MIN])),
        )
        .unwrap();
        assert_eq!(out, tensor(&[1]));

        // Symbolic extent: bounds are used as given and overflow keeps the rank.
        let data = StructInfo::tensor(sym(&["n"]), DataType::Float32);
        let out = infer(
            "strided_slice",
            vec![data],
            slice(&[0], &[-3], &[i64::MAX], None),
        )
        .unwrap();
        assert_eq!(
            out,
            StructInfo::Tensor(TensorStructInfo::with_ndim(Some(1), Some(DataType::Float32)))
        );
    }

    #[test]
    fn strided_slice_empty_axes_and_symbolic_bounds() {
        let out = infer("strided_slice", vec![tensor(&[3])], slice(&[], &[], &[], None)).unwrap();
        assert_eq!(out, tensor(&[3]));

        let attrs = Attrs::new()
            .with("axes", AttrValue::Ints(vec![0]))
            .with("begin", AttrValue::Ints(vec![0]))
            .with("end", AttrValue::Dims(sym(&["n"])));
        let out = infer("strided_slice", vec![tensor(&[8, 2])], attrs).unwrap();
        assert_eq!(
            out,
            StructInfo::Tensor(TensorStructInfo::with_ndim(Some(2), Some(DataType::Float32)))
        );
    }

    #[test]
    fn strided_slice_rejects_bad_attrs() {
        let err = infer("strided_slice", vec![tensor(&[8])], slice(&[0], &[0, 1], &[2], None))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Attr);
        let err = infer("strided_slice", vec![tensor(&[8])], slice(&[0], &[0], &[2], Some(&[0])))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Attr);
        let err = infer("strided_slice", vec![tensor(&[8])], Attrs::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Attr);
    }
}
