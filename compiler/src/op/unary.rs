// op/unary.rs — Elementwise unary operators
//
// Output struct info is the input tensor's, unchanged.

use crate::diag::IrError;
use crate::expr::Call;
use crate::op::InferCtx;
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::StructInfo;

const UNARY: [(&str, &str); 9] = [
    ("nn.relu", "Rectified linear unit."),
    ("nn.gelu", "Gaussian error linear unit."),
    ("nn.silu", "Sigmoid linear unit."),
    ("exp", "Elementwise exponential."),
    ("log", "Elementwise natural logarithm."),
    ("sqrt", "Elementwise square root."),
    ("sigmoid", "Elementwise logistic sigmoid."),
    ("tanh", "Elementwise hyperbolic tangent."),
    ("negative", "Elementwise negation."),
];

pub fn ops() -> Vec<OpDef> {
    UNARY
        .into_iter()
        .map(|(name, description)| {
            OpDef::new(name, infer_unary)
                .describe(description)
                .arg("x", ArgKind::Tensor, "The input tensor.")
        })
        .collect()
}

fn infer_unary(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    Ok(StructInfo::Tensor(ctx.tensor(call, 0)?.clone()))
}
