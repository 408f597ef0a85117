// op/binary.rs — Broadcasting binary operators
//
// Arithmetic ops unify the operand dtypes; comparison ops always produce
// bool. Both broadcast the operand shapes, falling back to rank-only
// struct info when a symbolic pair cannot be decided.

use crate::diag::IrError;
use crate::expr::Call;
use crate::op::{binary_arith_dtype, infer_binary_broadcast_shape, InferCtx};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

const ARITH: [(&str, &str); 5] = [
    ("add", "Elementwise addition with broadcasting."),
    ("subtract", "Elementwise subtraction with broadcasting."),
    ("multiply", "Elementwise multiplication with broadcasting."),
    ("divide", "Elementwise division with broadcasting."),
    ("floor_divide", "Elementwise floor division with broadcasting."),
];

const COMPARE: [(&str, &str); 3] = [
    ("less", "Elementwise lhs < rhs with broadcasting."),
    ("greater", "Elementwise lhs > rhs with broadcasting."),
    ("equal", "Elementwise lhs == rhs with broadcasting."),
];

pub fn ops() -> Vec<OpDef> {
    let arith = ARITH
        .into_iter()
        .map(|(name, d)| binary_def(OpDef::new(name, infer_broadcast_arith).describe(d)));
    let cmp = COMPARE
        .into_iter()
        .map(|(name, d)| binary_def(OpDef::new(name, infer_broadcast_cmp).describe(d)));
    arith.chain(cmp).collect()
}

fn binary_def(def: OpDef) -> OpDef {
    def.arg("lhs", ArgKind::Tensor, "The left operand.")
        .arg("rhs", ArgKind::Tensor, "The right operand.")
}

fn infer_broadcast_arith(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    infer_broadcast(call, ctx, binary_arith_dtype)
}

fn infer_broadcast_cmp(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    infer_broadcast(call, ctx, |_, _, _| Ok(Some(DataType::Bool)))
}

fn infer_broadcast(
    call: &Call,
    ctx: &InferCtx<'_>,
    out_dtype: impl Fn(
        &InferCtx<'_>,
        &TensorStructInfo,
        &TensorStructInfo,
    ) -> Result<Option<DataType>, IrError>,
) -> Result<StructInfo, IrError> {
    let lhs = ctx.tensor(call, 0)?;
    let rhs = ctx.tensor(call, 1)?;
    let dtype = out_dtype(ctx, lhs, rhs)?;

    let ndim = match (lhs.ndim(), rhs.ndim()) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    };
    let out = match (lhs.shape(), rhs.shape()) {
        (Some(l), Some(r)) => match infer_binary_broadcast_shape(ctx, l, r)? {
            Some(shape) => TensorStructInfo::new(shape, dtype),
            None => TensorStructInfo::with_ndim(ndim, dtype),
        },
        _ => TensorStructInfo::with_ndim(ndim, dtype),
    };
    Ok(StructInfo::Tensor(out))
}
