// op/base.rs — Kernel invocation and shape plumbing
//
// call_tir(func, (args...), out_shape) invokes a low-level kernel that
// writes one output tensor of `out_shape`; the element type comes from the
// `dtype` attribute. shape_of exposes a tensor's shape as a first-class
// value. vm.builtin.reshape is the runtime form reshape calls are lowered to.

use crate::diag::IrError;
use crate::dim::PrimExpr;
use crate::expr::Call;
use crate::op::InferCtx;
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{StructInfo, TensorStructInfo};

pub fn ops() -> Vec<OpDef> {
    vec![
        OpDef::new("call_tir", infer_call_tir)
            .describe("Call a kernel that writes a single output tensor of the given shape.")
            .arg("func", ArgKind::Any, "The kernel to call.")
            .arg("args", ArgKind::Tuple, "The kernel inputs.")
            .arg("out_shape", ArgKind::Shape, "The shape of the output."),
        OpDef::new("shape_of", infer_shape_of)
            .describe("The shape of a tensor, as a shape value.")
            .arg("input", ArgKind::Tensor, "The input tensor."),
        OpDef::new("vm.builtin.reshape", infer_builtin_reshape)
            .describe("Runtime reshape; the element count is not checked.")
            .arg("data", ArgKind::Tensor, "The input tensor.")
            .arg("shape", ArgKind::Shape, "The new shape."),
    ]
}

fn infer_call_tir(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let (values, ndim) = ctx.shape_arg(call, 2)?;
    let dtype = ctx.attr_dtype(call, "dtype")?;
    Ok(TensorStructInfo::from_parts(values.map(<[PrimExpr]>::to_vec), ndim, dtype).into())
}

fn infer_shape_of(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let t = ctx.tensor(call, 0)?;
    Ok(StructInfo::Shape {
        values: t.shape().map(<[PrimExpr]>::to_vec),
        ndim: t.ndim(),
    })
}

fn infer_builtin_reshape(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let (values, ndim) = ctx.shape_arg(call, 1)?;
    Ok(TensorStructInfo::from_parts(values.map(<[PrimExpr]>::to_vec), ndim, data.dtype()).into())
}
