// op/nn.rs — Neural-network operators
//
// Dense, softmax, flatten, normalization, dropout, and the NCHW
// convolution / pooling family. Spatial ops only accept the NCHW data
// layout (OIHW for conv weights); other layouts are an AttrError.

use crate::diag::{ErrorKind, IrError};
use crate::dim::PrimExpr;
use crate::expr::Call;
use crate::op::{binary_arith_dtype, normalize_axes, normalize_axis, InferCtx};
use crate::registry::{ArgKind, OpDef};
use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

pub fn ops() -> Vec<OpDef> {
    vec![
        OpDef::new("nn.dense", infer_dense)
            .describe("Fully connected layer: data @ weight^T.")
            .arg("data", ArgKind::Tensor, "The input data.")
            .arg("weight", ArgKind::Tensor, "The weight matrix of shape (units, in)."),
        OpDef::new("nn.softmax", infer_softmax)
            .describe("Softmax along an axis.")
            .arg("data", ArgKind::Tensor, "The input data."),
        OpDef::new("nn.flatten", infer_flatten)
            .describe("Collapse every dimension but the first.")
            .arg("data", ArgKind::Tensor, "The input tensor."),
        OpDef::new("nn.batch_norm", infer_batch_norm)
            .describe("Batch normalization; returns (output, new mean, new variance).")
            .arg("data", ArgKind::Tensor, "Input to which batch_norm will be applied.")
            .arg("gamma", ArgKind::Tensor, "The gamma scale factor.")
            .arg("beta", ArgKind::Tensor, "The beta offset factor.")
            .arg("moving_mean", ArgKind::Tensor, "Running mean of input.")
            .arg("moving_var", ArgKind::Tensor, "Running variance of input."),
        OpDef::new("nn.dropout", infer_dropout)
            .describe("Dropout; returns (output, mask).")
            .arg("data", ArgKind::Tensor, "Input to which dropout will be applied."),
        OpDef::new("nn.layer_norm", infer_layer_norm)
            .describe("Layer normalization over the given axes.")
            .arg("data", ArgKind::Tensor, "Input to which layer_norm will be applied.")
            .arg("gamma", ArgKind::Tensor, "The gamma scale factor.")
            .arg("beta", ArgKind::Tensor, "The beta offset factor."),
        OpDef::new("nn.conv2d", infer_conv2d)
            .describe("2-D convolution, NCHW data and OIHW weight.")
            .arg("data", ArgKind::Tensor, "The input data.")
            .arg("weight", ArgKind::Tensor, "The convolution weight."),
        OpDef::new("nn.max_pool2d", infer_max_pool2d)
            .describe("2-D max pooling over NCHW data.")
            .arg("data", ArgKind::Tensor, "The input data."),
        OpDef::new("nn.adaptive_avg_pool2d", infer_adaptive_avg_pool2d)
            .describe("2-D adaptive average pooling to a fixed output size.")
            .arg("data", ArgKind::Tensor, "The input data."),
    ]
}

fn rank_only(ndim: Option<usize>, dtype: Option<DataType>) -> StructInfo {
    TensorStructInfo::with_ndim(ndim, dtype).into()
}

/// Explicit `out_dtype`, else the unified input dtype.
fn out_dtype(
    call: &Call,
    ctx: &InferCtx<'_>,
    a: &TensorStructInfo,
    b: &TensorStructInfo,
) -> Result<Option<DataType>, IrError> {
    match ctx.attr_dtype(call, "out_dtype")? {
        Some(d) => Ok(Some(d)),
        None => binary_arith_dtype(ctx, a, b),
    }
}

// ── dense / softmax / flatten ───────────────────────────────────────────────

fn infer_dense(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let weight = ctx.tensor(call, 1)?;
    let dtype = out_dtype(call, ctx, data, weight)?;

    if data.ndim() == Some(0) {
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            "nn.dense requires the input data to have at least one dimension",
        ));
    }
    if let Some(n) = weight.ndim().filter(|&n| n != 2) {
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            format!("nn.dense requires the weight to be a 2-dim tensor. However, the given weight has ndim {n}"),
        ));
    }
    let units = ctx.attr_dims(call, "units")?.and_then(|u| u.into_iter().next());

    let Some(ds) = data.shape() else {
        return Ok(rank_only(data.ndim(), dtype));
    };
    let (prefix, k) = ds.split_at(ds.len() - 1);
    let out_units = match weight.shape() {
        Some(ws) => {
            if ctx.can_prove_not_equal(&k[0], &ws[1]) {
                return Err(ctx.fatal(
                    ErrorKind::ShapeConflict,
                    format!(
                        "nn.dense expects the reduction dim of data ({}) and weight ({}) to match",
                        k[0], ws[1]
                    ),
                ));
            }
            Some(ws[0].clone())
        }
        None => units,
    };
    match out_units {
        Some(u) => {
            let mut out = prefix.to_vec();
            out.push(u);
            Ok(TensorStructInfo::new(out, dtype).into())
        }
        None => Ok(rank_only(data.ndim(), dtype)),
    }
}

fn infer_softmax(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let axis = ctx.attr_int(call, "axis")?.unwrap_or(-1);
    if let Some(ndim) = data.ndim() {
        normalize_axis(ctx, ndim, axis)?;
    }
    Ok(StructInfo::Tensor(data.clone()))
}

fn infer_flatten(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    if data.ndim() == Some(0) {
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            "nn.flatten requires the input to have at least one dimension",
        ));
    }
    Ok(match data.shape() {
        Some(s) => TensorStructInfo::new(
            vec![s[0].clone(), PrimExpr::product(&s[1..])],
            data.dtype(),
        )
        .into(),
        None => rank_only(Some(2), data.dtype()),
    })
}

// ── normalization / dropout ─────────────────────────────────────────────────

fn infer_batch_norm(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let t = ctx.input_tensors(call)?;
    let data = t[0];
    let axis = ctx.attr_int(call, "axis")?.unwrap_or(1);
    ctx.attr_float(call, "epsilon")?;
    let center = ctx.attr_bool(call, "center", true)?;
    let scale = ctx.attr_bool(call, "scale", true)?;

    let axis = match data.ndim() {
        Some(ndim) => Some(normalize_axis(ctx, ndim, axis)?),
        None => None,
    };
    let channels = match (axis, data.shape()) {
        (Some(a), Some(s)) => Some(&s[a]),
        _ => None,
    };
    for (i, name) in [(1, "gamma"), (2, "beta"), (3, "moving_mean"), (4, "moving_var")] {
        if (i == 1 && !scale) || (i == 2 && !center) {
            continue;
        }
        let p = t[i];
        if let Some(n) = p.ndim().filter(|&n| n != 1) {
            return Err(ctx.fatal(
                ErrorKind::ShapeConflict,
                format!("nn.batch_norm expects the input {name} to be a 1-dim tensor, while the given {name} has {n} dimensions"),
            ));
        }
        if let (Some(c), Some(ps)) = (channels, p.shape()) {
            if ctx.can_prove_not_equal(c, &ps[0]) {
                return Err(ctx.fatal(
                    ErrorKind::ShapeConflict,
                    format!(
                        "nn.batch_norm expects the input {name} to have length {c} on the channel axis, but got {}",
                        ps[0]
                    ),
                ));
            }
        }
    }
    Ok(StructInfo::Tuple(vec![
        StructInfo::Tensor(data.clone()),
        StructInfo::Tensor(t[3].clone()),
        StructInfo::Tensor(t[4].clone()),
    ]))
}

fn infer_dropout(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    if let Some(rate) = ctx.attr_float(call, "rate")? {
        if !(0.0..1.0).contains(&rate) {
            return Err(ctx.fatal(
                ErrorKind::Attr,
                format!("nn.dropout requires a rate in [0, 1), but got {rate}"),
            ));
        }
    }
    let out = StructInfo::Tensor(data.clone());
    Ok(StructInfo::Tuple(vec![out.clone(), out]))
}

fn infer_layer_norm(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let t = ctx.input_tensors(call)?;
    let (data, gamma, beta) = (t[0], t[1], t[2]);
    let axes = ctx
        .attr_ints(call, "axes")?
        .ok_or_else(|| ctx.missing_attr("axes"))?;
    let n_axes = axes.len();

    for (name, p) in [("gamma", gamma), ("beta", beta)] {
        if let Some(n) = p.ndim().filter(|&n| n != n_axes) {
            return Err(ctx.fatal(
                ErrorKind::ShapeConflict,
                format!("nn.layer_norm expects the input {name} to have the same rank as the number of input axes. However, the given {name} has rank {n} while the number of given axes is {n_axes}"),
            ));
        }
    }
    let Some(ndim) = data.ndim() else {
        if let (Some(g), Some(b)) = (gamma.shape(), beta.shape()) {
            for (i, (gd, bd)) in g.iter().zip(b).enumerate() {
                if ctx.can_prove_not_equal(gd, bd) {
                    return Err(ctx.fatal(
                        ErrorKind::ShapeConflict,
                        format!("nn.layer_norm expects the input gamma and beta to have the same shape. However, the given gamma and beta shapes differ on dim {i}"),
                    ));
                }
            }
        }
        return Ok(StructInfo::Tensor(data.clone()));
    };
    let axes = normalize_axes(ctx, ndim, &axes)?;
    if let Some(ds) = data.shape() {
        for (i, &axis) in axes.iter().enumerate() {
            for (name, p) in [("gamma", gamma), ("beta", beta)] {
                if let Some(ps) = p.shape() {
                    if ctx.can_prove_not_equal(&ps[i], &ds[axis]) {
                        return Err(ctx.fatal(
                            ErrorKind::ShapeConflict,
                            format!("nn.layer_norm expects the input {name} to have compatible shape with the input data with regard to the input axis indices. However, the {name} dimension {i} has length {} while the data dimension {axis} has length {}", ps[i], ds[axis]),
                        ));
                    }
                }
            }
        }
    }
    Ok(StructInfo::Tensor(data.clone()))
}

// ── NCHW spatial ops ────────────────────────────────────────────────────────

fn check_layout(call: &Call, ctx: &InferCtx<'_>, key: &str, expected: &str) -> Result<(), IrError> {
    match ctx.attr_str(call, key)? {
        Some(layout) if layout != expected => Err(ctx.fatal(
            ErrorKind::Attr,
            format!("{} only supports {key} {expected}, but got {layout}", ctx.op_name()),
        )),
        _ => Ok(()),
    }
}

fn check_ndim4(ctx: &InferCtx<'_>, t: &TensorStructInfo, what: &str) -> Result<(), IrError> {
    match t.ndim() {
        Some(n) if n != 4 => Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            format!(
                "In {}, layout NCHW requires the {what} to be 4-dim tensor. However, the given {what} has ndim {n}",
                ctx.op_name()
            ),
        )),
        _ => Ok(()),
    }
}

/// A 2-entry attribute; one entry applies to both spatial dims.
fn attr_pair(
    call: &Call,
    ctx: &InferCtx<'_>,
    key: &str,
    default: i64,
) -> Result<[PrimExpr; 2], IrError> {
    let v = ctx.attr_dims(call, key)?.unwrap_or_else(|| vec![PrimExpr::Int(default)]);
    match v.as_slice() {
        [a] => Ok([a.clone(), a.clone()]),
        [a, b] => Ok([a.clone(), b.clone()]),
        _ => Err(ctx.fatal(
            ErrorKind::Attr,
            format!("{} expects {key} to have 1 or 2 entries, but got {}", ctx.op_name(), v.len()),
        )),
    }
}

/// `attr_pair` whose literal entries must be positive.
fn positive_pair(
    call: &Call,
    ctx: &InferCtx<'_>,
    key: &str,
    default: i64,
) -> Result<[PrimExpr; 2], IrError> {
    let pair = attr_pair(call, ctx, key, default)?;
    if let Some(bad) = pair.iter().filter_map(PrimExpr::as_int).find(|&v| v <= 0) {
        return Err(ctx.fatal(
            ErrorKind::Attr,
            format!("{} requires positive {key}, but got {bad}", ctx.op_name()),
        ));
    }
    Ok(pair)
}

/// Padding as (top, left, bottom, right).
fn attr_padding(call: &Call, ctx: &InferCtx<'_>) -> Result<[PrimExpr; 4], IrError> {
    let v = ctx.attr_dims(call, "padding")?.unwrap_or_else(|| vec![PrimExpr::Int(0)]);
    match v.as_slice() {
        [p] => Ok([p.clone(), p.clone(), p.clone(), p.clone()]),
        [h, w] => Ok([h.clone(), w.clone(), h.clone(), w.clone()]),
        [t, l, b, r] => Ok([t.clone(), l.clone(), b.clone(), r.clone()]),
        _ => Err(ctx.fatal(
            ErrorKind::Attr,
            format!(
                "The input padding length is expected to be either 1, 2 or 4. However, the given padding has {} entries",
                v.len()
            ),
        )),
    }
}

/// `(in + pad_lo + pad_hi - dilation * (kernel - 1) - 1 [+ stride - 1]) // stride + 1`
fn window_out(
    ctx: &InferCtx<'_>,
    input: &PrimExpr,
    pad: (&PrimExpr, &PrimExpr),
    kernel: &PrimExpr,
    stride: &PrimExpr,
    dilation: &PrimExpr,
    ceil_mode: bool,
) -> PrimExpr {
    let padded = PrimExpr::add(PrimExpr::add(input.clone(), pad.0.clone()), pad.1.clone());
    let reach = PrimExpr::mul(
        dilation.clone(),
        PrimExpr::sub(kernel.clone(), PrimExpr::Int(1)),
    );
    let mut numer = PrimExpr::sub(PrimExpr::sub(padded, reach), PrimExpr::Int(1));
    if ceil_mode {
        numer = PrimExpr::add(numer, PrimExpr::sub(stride.clone(), PrimExpr::Int(1)));
    }
    let out = PrimExpr::add(PrimExpr::floordiv(numer, stride.clone()), PrimExpr::Int(1));
    ctx.analyzer.simplify(&out)
}

fn infer_conv2d(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    let weight = ctx.tensor(call, 1)?;
    check_layout(call, ctx, "data_layout", "NCHW")?;
    check_layout(call, ctx, "kernel_layout", "OIHW")?;
    check_ndim4(ctx, data, "input")?;
    check_ndim4(ctx, weight, "weight")?;
    let dtype = out_dtype(call, ctx, data, weight)?;
    let strides = positive_pair(call, ctx, "strides", 1)?;
    let dilation = positive_pair(call, ctx, "dilation", 1)?;
    let padding = attr_padding(call, ctx)?;
    let groups = ctx.attr_int(call, "groups")?.unwrap_or(1);
    if groups < 1 {
        return Err(ctx.fatal(
            ErrorKind::Attr,
            format!("nn.conv2d expects groups to be positive, but got {groups}"),
        ));
    }

    let (Some(ds), Some(ws)) = (data.shape(), weight.shape()) else {
        return Ok(rank_only(Some(4), dtype));
    };
    let in_channels = PrimExpr::mul(ws[1].clone(), PrimExpr::Int(groups));
    if ctx.can_prove_not_equal(&ds[1], &in_channels) {
        return Err(ctx.fatal(
            ErrorKind::ShapeConflict,
            format!(
                "The input channel size {} of nn.conv2d must equal the weight input channels {} times groups {groups}",
                ds[1], ws[1]
            ),
        ));
    }
    let out = vec![
        ds[0].clone(),
        ws[0].clone(),
        window_out(ctx, &ds[2], (&padding[0], &padding[2]), &ws[2], &strides[0], &dilation[0], false),
        window_out(ctx, &ds[3], (&padding[1], &padding[3]), &ws[3], &strides[1], &dilation[1], false),
    ];
    Ok(TensorStructInfo::new(out, dtype).into())
}

fn infer_max_pool2d(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    check_layout(call, ctx, "layout", "NCHW")?;
    check_ndim4(ctx, data, "input")?;
    if call.attrs.get("pool_size").is_none() {
        return Err(ctx.missing_attr("pool_size"));
    }
    let pool = attr_pair(call, ctx, "pool_size", 1)?;
    let strides = positive_pair(call, ctx, "strides", 1)?;
    let dilation = positive_pair(call, ctx, "dilation", 1)?;
    let padding = attr_padding(call, ctx)?;
    let ceil_mode = ctx.attr_bool(call, "ceil_mode", false)?;

    let Some(ds) = data.shape() else {
        return Ok(rank_only(Some(4), data.dtype()));
    };
    let out = vec![
        ds[0].clone(),
        ds[1].clone(),
        window_out(ctx, &ds[2], (&padding[0], &padding[2]), &pool[0], &strides[0], &dilation[0], ceil_mode),
        window_out(ctx, &ds[3], (&padding[1], &padding[3]), &pool[1], &strides[1], &dilation[1], ceil_mode),
    ];
    Ok(TensorStructInfo::new(out, data.dtype()).into())
}

fn infer_adaptive_avg_pool2d(call: &Call, ctx: &InferCtx<'_>) -> Result<StructInfo, IrError> {
    let data = ctx.tensor(call, 0)?;
    check_layout(call, ctx, "layout", "NCHW")?;
    check_ndim4(ctx, data, "input")?;
    let output_size = match call.attrs.get("output_size") {
        Some(_) => Some(attr_pair(call, ctx, "output_size", 1)?),
        None => None,
    };
    let Some(ds) = data.shape() else {
        return Ok(rank_only(Some(4), data.dtype()));
    };
    let mut out = ds.to_vec();
    if let Some([h, w]) = output_size {
        out[2] = h;
        out[3] = w;
    }
    Ok(TensorStructInfo::new(out, data.dtype()).into())
}
