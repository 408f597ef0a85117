// op/mod.rs — Operator inference rules and their shared algorithms
//
// Each submodule contributes the `OpDef`s of one operator family through
// its `ops()` function. `InferCtx` is what an inference rule sees besides
// the call: the operator's declaration, the call span for diagnostics and
// the symbolic prover.
//
// Shared algorithms: input extraction, binary broadcast shape inference,
// axis normalization and binary dtype unification.
//
// Failure modes: every helper returns `IrError` of the matching kind; none
//   of them panics.

pub mod base;
pub mod binary;
pub mod datatype;
pub mod index;
pub mod manipulate;
pub mod nn;
pub mod reduce;
pub mod ternary;
pub mod unary;

use crate::arith::Analyzer;
use crate::diag::{ErrorKind, IrError};
use crate::dim::PrimExpr;
use crate::expr::{AttrValue, Call, Span};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

/// Every builtin operator definition.
pub fn builtin_ops() -> Vec<OpDef> {
    let mut defs = Vec::new();
    defs.extend(unary::ops());
    defs.extend(binary::ops());
    defs.extend(ternary::ops());
    defs.extend(index::ops());
    defs.extend(datatype::ops());
    defs.extend(nn::ops());
    defs.extend(reduce::ops());
    defs.extend(manipulate::ops());
    defs.extend(base::ops());
    defs
}

static UNKNOWN: StructInfo = StructInfo::Unknown;

// ── Inference context ───────────────────────────────────────────────────────

pub struct InferCtx<'a> {
    pub def: &'a OpDef,
    pub span: Span,
    pub analyzer: &'a Analyzer,
}

impl<'a> InferCtx<'a> {
    pub fn new(def: &'a OpDef, span: Span, analyzer: &'a Analyzer) -> Self {
        InferCtx {
            def,
            span,
            analyzer,
        }
    }

    pub fn op_name(&self) -> &str {
        self.def.name
    }

    pub fn can_prove_equal(&self, a: &PrimExpr, b: &PrimExpr) -> bool {
        self.analyzer.can_prove_equal(a, b)
    }

    pub fn can_prove_not_equal(&self, a: &PrimExpr, b: &PrimExpr) -> bool {
        self.analyzer.can_prove_not_equal(a, b)
    }

    /// Fatal diagnostic at the call site.
    pub fn fatal(&self, kind: ErrorKind, message: impl Into<String>) -> IrError {
        IrError::new(kind, self.span, message)
    }

    // ── Inputs ──────────────────────────────────────────────────────────────

    /// Argument count and per-argument category against the declaration.
    pub fn check_args(&self, call: &Call) -> Result<(), IrError> {
        let expected = self.def.num_inputs();
        if call.args.len() != expected {
            return Err(self.fatal(
                ErrorKind::Arity,
                format!(
                    "{} op should have {} argument{}, but {} {} given",
                    self.op_name(),
                    expected,
                    if expected == 1 { "" } else { "s" },
                    call.args.len(),
                    if call.args.len() == 1 { "is" } else { "are" },
                ),
            ));
        }
        for (i, spec) in self.def.args.iter().enumerate() {
            let sinfo = self.arg(call, i);
            let ok = match spec.kind {
                ArgKind::Tensor => matches!(sinfo, StructInfo::Tensor(_)),
                ArgKind::Shape => matches!(sinfo, StructInfo::Shape { .. }),
                ArgKind::Tuple => matches!(sinfo, StructInfo::Tuple(_)),
                ArgKind::Any => true,
            };
            if !ok {
                return Err(self.kind_error(i, sinfo));
            }
        }
        Ok(())
    }

    fn kind_error(&self, i: usize, actual: &StructInfo) -> IrError {
        let (name, expected) = match self.def.args.get(i) {
            Some(spec) => (spec.name, spec.kind),
            None => ("?", ArgKind::Any),
        };
        let expected = match expected {
            ArgKind::Tensor => "Tensor",
            ArgKind::Shape => "Shape",
            ArgKind::Tuple => "Tuple",
            ArgKind::Any => "Object",
        };
        self.fatal(
            ErrorKind::Kind,
            format!(
                "{} requires the input {} to be {}. However, the given one is {}",
                self.op_name(),
                name,
                expected,
                actual.kind_name()
            ),
        )
    }

    /// Struct info of argument `i`; Unknown when absent.
    pub fn arg<'c>(&self, call: &'c Call, i: usize) -> &'c StructInfo {
        call.args
            .get(i)
            .and_then(|a| a.struct_info())
            .unwrap_or(&UNKNOWN)
    }

    pub fn tensor<'c>(&self, call: &'c Call, i: usize) -> Result<&'c TensorStructInfo, IrError> {
        let sinfo = self.arg(call, i);
        sinfo.as_tensor().ok_or_else(|| self.kind_error(i, sinfo))
    }

    /// Every argument as a tensor, in order.
    pub fn input_tensors<'c>(&self, call: &'c Call) -> Result<Vec<&'c TensorStructInfo>, IrError> {
        (0..call.args.len()).map(|i| self.tensor(call, i)).collect()
    }

    /// Values and rank carried by a `Shape` argument.
    pub fn shape_arg<'c>(
        &self,
        call: &'c Call,
        i: usize,
    ) -> Result<(Option<&'c [PrimExpr]>, Option<usize>), IrError> {
        match self.arg(call, i) {
            StructInfo::Shape { values, ndim } => Ok((values.as_deref(), *ndim)),
            other => Err(self.kind_error(i, other)),
        }
    }

    // ── Attributes ──────────────────────────────────────────────────────────

    fn attr_error(&self, key: &str, expected: &str, got: &AttrValue) -> IrError {
        self.fatal(
            ErrorKind::Attr,
            format!(
                "{} expects attribute '{}' to be {}, but got {}",
                self.op_name(),
                key,
                expected,
                got
            ),
        )
    }

    pub fn missing_attr(&self, key: &str) -> IrError {
        self.fatal(
            ErrorKind::Attr,
            format!("{} requires attribute '{}'", self.op_name(), key),
        )
    }

    pub fn attr_int(&self, call: &Call, key: &str) -> Result<Option<i64>, IrError> {
        match call.attrs.get(key) {
            None => Ok(None),
            Some(AttrValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(self.attr_error(key, "an integer", other)),
        }
    }

    pub fn attr_bool(&self, call: &Call, key: &str, default: bool) -> Result<bool, IrError> {
        match call.attrs.get(key) {
            None => Ok(default),
            Some(AttrValue::Bool(v)) => Ok(*v),
            Some(other) => Err(self.attr_error(key, "a boolean", other)),
        }
    }

    pub fn attr_float(&self, call: &Call, key: &str) -> Result<Option<f64>, IrError> {
        match call.attrs.get(key) {
            None => Ok(None),
            Some(AttrValue::Float(v)) => Ok(Some(*v)),
            Some(AttrValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(self.attr_error(key, "a number", other)),
        }
    }

    /// Integer list; a single integer is accepted as a one-element list.
    pub fn attr_ints(&self, call: &Call, key: &str) -> Result<Option<Vec<i64>>, IrError> {
        match call.attrs.get(key) {
            None => Ok(None),
            Some(AttrValue::Ints(v)) => Ok(Some(v.clone())),
            Some(AttrValue::Int(v)) => Ok(Some(vec![*v])),
            Some(other) => Err(self.attr_error(key, "a list of integers", other)),
        }
    }

    /// Symbolic dim list; integer lists are widened.
    pub fn attr_dims(&self, call: &Call, key: &str) -> Result<Option<Vec<PrimExpr>>, IrError> {
        match call.attrs.get(key) {
            None => Ok(None),
            Some(AttrValue::Dims(v)) => Ok(Some(v.clone())),
            Some(AttrValue::Ints(v)) => Ok(Some(v.iter().copied().map(PrimExpr::Int).collect())),
            Some(AttrValue::Int(v)) => Ok(Some(vec![PrimExpr::Int(*v)])),
            Some(other) => Err(self.attr_error(key, "a list of dims", other)),
        }
    }

    pub fn attr_dtype(&self, call: &Call, key: &str) -> Result<Option<DataType>, IrError> {
        match call.attrs.get(key) {
            None => Ok(None),
            Some(AttrValue::DType(d)) => Ok(Some(*d)),
            Some(AttrValue::Str(s)) => s
                .parse::<DataType>()
                .map(Some)
                .map_err(|e| self.fatal(ErrorKind::Attr, e.to_string())),
            Some(other) => Err(self.attr_error(key, "a dtype", other)),
        }
    }

    pub fn attr_str<'c>(&self, call: &'c Call, key: &str) -> Result<Option<&'c str>, IrError> {
        match call.attrs.get(key) {
            None => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(self.attr_error(key, "a string", other)),
        }
    }
}

// ── Shared algorithms ───────────────────────────────────────────────────────

/// Right-aligned broadcast of two shapes.
///
/// `Ok(None)` when some aligned pair is symbolic and undecidable; the
/// caller falls back to rank-only struct info.
pub fn infer_binary_broadcast_shape(
    ctx: &InferCtx<'_>,
    lhs: &[PrimExpr],
    rhs: &[PrimExpr],
) -> Result<Option<Vec<PrimExpr>>, IrError> {
    let (ln, rn) = (lhs.len(), rhs.len());
    let max_ndim = ln.max(rn);
    let mut out = Vec::with_capacity(max_ndim);
    for i in 1..=ln.min(rn) {
        let d0 = &lhs[ln - i];
        let d1 = &rhs[rn - i];
        if d0.is_int(1) {
            out.push(d1.clone());
        } else if d1.is_int(1) {
            out.push(d0.clone());
        } else if ctx.can_prove_equal(d0, d1) {
            out.push(d0.clone());
        } else if let (Some(a), Some(b)) = (d0.as_int(), d1.as_int()) {
            return Err(ctx.fatal(
                ErrorKind::ShapeConflict,
                format!(
                    "In {}, the lhs shape at dim {} is {} and the rhs shape at dim {} is {}, which are not broadcastable.",
                    ctx.op_name(),
                    ln - i,
                    a,
                    rn - i,
                    b
                ),
            ));
        } else {
            return Ok(None);
        }
    }
    let longer = if ln > rn { lhs } else { rhs };
    for i in (ln.min(rn) + 1)..=max_ndim {
        out.push(longer[max_ndim - i].clone());
    }
    out.reverse();
    Ok(Some(out))
}

/// Map `axis` into `[0, ndim)`.
pub fn normalize_axis(ctx: &InferCtx<'_>, ndim: usize, axis: i64) -> Result<usize, IrError> {
    let n = ndim as i64;
    if axis < -n || axis >= n {
        return Err(ctx.fatal(
            ErrorKind::Range,
            format!(
                "In {}, the input axis {} is out of range. The input tensor has {} dimensions, so axis should be in range [{}, {}).",
                ctx.op_name(),
                axis,
                ndim,
                -n,
                n
            ),
        ));
    }
    Ok(if axis < 0 { (axis + n) as usize } else { axis as usize })
}

/// Normalize every axis and reject repeats.
pub fn normalize_axes(ctx: &InferCtx<'_>, ndim: usize, axes: &[i64]) -> Result<Vec<usize>, IrError> {
    let mut seen = vec![false; ndim];
    let mut out = Vec::with_capacity(axes.len());
    for &axis in axes {
        let a = normalize_axis(ctx, ndim, axis)?;
        if seen[a] {
            return Err(ctx.fatal(
                ErrorKind::DuplicateAxis,
                format!(
                    "In {}, the input axes is required to be non-repetitive. However, there are multiple given axes referring to axis {}",
                    ctx.op_name(),
                    a
                ),
            ));
        }
        seen[a] = true;
        out.push(a);
    }
    Ok(out)
}

/// Output dtype of a binary arithmetic op. Unknown on either side stays
/// unknown.
pub fn binary_arith_dtype(
    ctx: &InferCtx<'_>,
    lhs: &TensorStructInfo,
    rhs: &TensorStructInfo,
) -> Result<Option<DataType>, IrError> {
    match (lhs.dtype(), rhs.dtype()) {
        (Some(a), Some(b)) if a != b => Err(ctx.fatal(
            ErrorKind::DtypeConflict,
            format!("Data types {a} and {b} must be equal for binary operators"),
        )),
        (Some(a), Some(_)) => Ok(Some(a)),
        _ => Ok(None),
    }
}
