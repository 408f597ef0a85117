// op/reduce.rs — Reductions: sum, mean, variance, max, min
//
// `axis` lists the reduced axes (all of them when absent); `keepdims`
// leaves each reduced axis in place with length 1.

use crate::diag::IrError;
use crate::dim::PrimExpr;
use crate::expr::Call;
use crate::op::{normalize_axes, InferCtx};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{StructInfo, TensorStructInfo};

const REDUCE: [(&str, &str); 5] = [
    ("sum", "Sum of elements over the given axes."),
    ("mean", "Mean of elements over the given axes."),
    ("variance", "Variance of elements over the given axes."),
    ("max", "Maximum of elements over the given axes."),
    ("min", "Minimum of elements over the given axes."),
];

pub fn ops() -> Vec<OpDef> {
    REDUCE
        .into_iter()
        .map(|(name, description)| {
            OpDef::new(name, infer_reduce)
                .describe(description)
                .arg("data", ArgKind::Tensor, "The input tensor.")
        })
        .collect()
}

fn infer_reduce(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let axis = ctx.attr_ints(call, "axis")?;
    let keepdims = ctx.attr_bool(call, "keepdims", false)?;
    let dtype = data.dtype();

    let Some(ndim) = data.ndim() else {
        return Ok(match (&axis, keepdims) {
            (None, false) => TensorStructInfo::new(Vec::new(), dtype),
            _ => TensorStructInfo::with_ndim(None, dtype),
        }
        .into());
    };
    let reduced = match &axis {
        Some(axes) => normalize_axes(ctx, ndim, axes)?,
        None => (0..ndim).collect(),
    };
    let out_ndim = if keepdims { ndim } else { ndim - reduced.len() };

    let Some(shape) = data.shape() else {
        return Ok(TensorStructInfo::with_ndim(Some(out_ndim), dtype).into());
    };
    let mut out = Vec::with_capacity(out_ndim);
    for (i, dim) in shape.iter().enumerate() {
        if !reduced.contains(&i) {
            out.push(dim.clone());
        } else if keepdims {
            out.push(PrimExpr::Int(1));
        }
    }
    Ok(TensorStructInfo::new(out, dtype).into())
}
