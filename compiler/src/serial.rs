// serial.rs — JSON interchange for modules
//
// `ModuleRepr` and friends are plain serde types mirroring the finished IR.
// Dumping walks a module; loading replays the representation through an
// `IrBuilder`, so a loaded module has passed the same scope checks and
// struct-info inference as one built in code. Symbolic dims and dtypes use
// their text form ("n * 2", "float32").
//
// Preconditions: none.
// Postconditions: `load(dump(m))` rebuilds `m` with the same var names and
//   struct info.
// Failure modes: LoadError::Json for malformed input; LoadError::Ir for
//   references to unknown vars, names bound twice, scope violations and
//   inference errors.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::builder::IrBuilder;
use crate::diag::{codes, IrError};
use crate::dim::PrimExpr;
use crate::expr::{dummy_span, Attrs, CallTarget, Expr, ExprKind, Var};
use crate::ir::{Binding, Function, IrModule};
use crate::struct_info::{DataType, StructInfo, TensorStructInfo};

// ── Representation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRepr {
    pub functions: Vec<FunctionRepr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRepr {
    pub name: String,
    pub params: Vec<ParamRepr>,
    #[serde(default)]
    pub blocks: Vec<BlockRepr>,
    pub outputs: Vec<ExprRepr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret_struct_info: Option<StructInfoRepr>,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRepr {
    pub name: String,
    pub struct_info: StructInfoRepr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRepr {
    #[serde(default)]
    pub dataflow: bool,
    pub bindings: Vec<BindingRepr>,
}

/// `var = value`. `dataflow` marks a var private to its dataflow block.
/// `struct_info` is written for readers; loading infers it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRepr {
    pub var: String,
    #[serde(default)]
    pub dataflow: bool,
    pub value: ExprRepr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struct_info: Option<StructInfoRepr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprRepr {
    Var {
        name: String,
    },
    Call {
        op: String,
        args: Vec<ExprRepr>,
        #[serde(default, skip_serializing_if = "Attrs::is_empty")]
        attrs: Attrs,
    },
    CallFunc {
        func: String,
        args: Vec<ExprRepr>,
        #[serde(default, skip_serializing_if = "Attrs::is_empty")]
        attrs: Attrs,
    },
    Tuple {
        fields: Vec<ExprRepr>,
    },
    Shape {
        dims: Vec<PrimExpr>,
    },
    Constant {
        shape: Vec<i64>,
        dtype: DataType,
        #[serde(default)]
        values: Vec<f64>,
    },
    GlobalVar {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructInfoRepr {
    Tensor {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape: Option<Vec<PrimExpr>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ndim: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dtype: Option<DataType>,
    },
    Tuple {
        fields: Vec<StructInfoRepr>,
    },
    Shape {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Vec<PrimExpr>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ndim: Option<usize>,
    },
    Object,
}

impl From<&StructInfo> for StructInfoRepr {
    fn from(sinfo: &StructInfo) -> Self {
        match sinfo {
            StructInfo::Tensor(t) => StructInfoRepr::Tensor {
                shape: t.shape().map(<[PrimExpr]>::to_vec),
                ndim: if t.shape().is_some() { None } else { t.ndim() },
                dtype: t.dtype(),
            },
            StructInfo::Tuple(fields) => StructInfoRepr::Tuple {
                fields: fields.iter().map(StructInfoRepr::from).collect(),
            },
            StructInfo::Shape { values, ndim } => StructInfoRepr::Shape {
                values: values.clone(),
                ndim: if values.is_some() { None } else { *ndim },
            },
            StructInfo::Unknown => StructInfoRepr::Object,
        }
    }
}

impl From<StructInfoRepr> for StructInfo {
    fn from(repr: StructInfoRepr) -> Self {
        match repr {
            StructInfoRepr::Tensor { shape, ndim, dtype } => {
                TensorStructInfo::from_parts(shape, ndim, dtype).into()
            }
            StructInfoRepr::Tuple { fields } => {
                StructInfo::Tuple(fields.into_iter().map(StructInfo::from).collect())
            }
            StructInfoRepr::Shape {
                values: Some(v), ..
            } => StructInfo::shape(v),
            StructInfoRepr::Shape { values: None, ndim } => StructInfo::Shape { values: None, ndim },
            StructInfoRepr::Object => StructInfo::Unknown,
        }
    }
}

// ── Dump ───────────────────────────────────────────────────────────────────

pub fn dump_module(module: &IrModule) -> ModuleRepr {
    ModuleRepr {
        functions: module.functions().map(dump_function).collect(),
    }
}

fn dump_function(func: &Function) -> FunctionRepr {
    FunctionRepr {
        name: func.name.clone(),
        params: func
            .params
            .iter()
            .map(|p| ParamRepr {
                name: p.name().to_string(),
                struct_info: p.struct_info().into(),
            })
            .collect(),
        blocks: func
            .blocks
            .iter()
            .map(|block| BlockRepr {
                dataflow: block.is_dataflow,
                bindings: block.bindings.iter().map(dump_binding).collect(),
            })
            .collect(),
        outputs: func.outputs.iter().map(dump_expr).collect(),
        ret_struct_info: func.ret_struct_info.as_ref().map(StructInfoRepr::from),
        attrs: func.attrs.clone(),
    }
}

fn dump_binding(b: &Binding) -> BindingRepr {
    BindingRepr {
        var: b.var.name().to_string(),
        dataflow: b.var.is_dataflow(),
        value: dump_expr(&b.value),
        struct_info: Some(b.var.struct_info().into()),
    }
}

fn dump_expr(expr: &Expr) -> ExprRepr {
    match expr.kind() {
        ExprKind::Var(v) | ExprKind::DataflowVar(v) => ExprRepr::Var {
            name: v.name().to_string(),
        },
        ExprKind::Call(call) => {
            let args = call.args.iter().map(dump_expr).collect();
            let attrs = call.attrs.clone();
            match &call.target {
                CallTarget::Op(op) => ExprRepr::Call {
                    op: op.clone(),
                    args,
                    attrs,
                },
                CallTarget::Global(func) => ExprRepr::CallFunc {
                    func: func.clone(),
                    args,
                    attrs,
                },
            }
        }
        ExprKind::Tuple(fields) => ExprRepr::Tuple {
            fields: fields.iter().map(dump_expr).collect(),
        },
        ExprKind::ShapeExpr(dims) => ExprRepr::Shape { dims: dims.clone() },
        ExprKind::Constant(c) => ExprRepr::Constant {
            shape: c.shape.clone(),
            dtype: c.dtype,
            values: c.values.clone(),
        },
        ExprKind::GlobalVar(name) => ExprRepr::GlobalVar { name: name.clone() },
    }
}

/// Compact JSON, the form module fingerprints are taken over.
pub fn to_json_compact(module: &IrModule) -> Result<String, serde_json::Error> {
    serde_json::to_string(&dump_module(module))
}

pub fn to_json_pretty(module: &IrModule) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&dump_module(module))
}

// ── Load ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LoadError {
    Json(serde_json::Error),
    Ir(IrError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Json(e) => write!(f, "invalid module JSON: {e}"),
            LoadError::Ir(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<serde_json::Error> for LoadError {
    fn from(e: serde_json::Error) -> Self {
        LoadError::Json(e)
    }
}

impl From<IrError> for LoadError {
    fn from(e: IrError) -> Self {
        LoadError::Ir(e)
    }
}

pub fn from_json(text: &str) -> Result<IrModule, LoadError> {
    let repr: ModuleRepr = serde_json::from_str(text)?;
    Ok(load_module(&repr)?)
}

/// Build a module from its representation, one function at a time in the
/// listed order. A call to a function listed later resolves to Unknown.
pub fn load_module(repr: &ModuleRepr) -> Result<IrModule, IrError> {
    let mut builder = IrBuilder::new();
    for func in &repr.functions {
        load_function(&mut builder, func)?;
    }
    builder.finish()
}

fn load_function(b: &mut IrBuilder, func: &FunctionRepr) -> Result<(), IrError> {
    let mut scope: HashMap<String, Var> = HashMap::new();
    b.enter_function(&func.name)?;
    for p in &func.params {
        check_fresh(&scope, &p.name)?;
        let var = b.add_param(&p.name, p.struct_info.clone().into())?;
        scope.insert(p.name.clone(), var);
    }
    for (key, value) in func.attrs.iter() {
        b.set_attr(key, value.clone())?;
    }
    for block in &func.blocks {
        b.enter_block(block.dataflow)?;
        for binding in &block.bindings {
            check_fresh(&scope, &binding.var)?;
            let value = load_expr(&scope, &binding.value)?;
            let declared = binding
                .struct_info
                .clone()
                .map(StructInfo::from)
                .unwrap_or(StructInfo::Unknown);
            let var = b.emit_binding(&Binding {
                var: Var::new(binding.var.clone(), declared, binding.dataflow),
                value,
            })?;
            scope.insert(binding.var.clone(), var);
        }
        b.exit()?;
    }
    let outputs = func
        .outputs
        .iter()
        .map(|o| load_expr(&scope, o))
        .collect::<Result<Vec<_>, _>>()?;
    b.emit_func_output(outputs)?;
    if let Some(ret) = &func.ret_struct_info {
        b.set_ret_struct_info(ret.clone().into())?;
    }
    b.exit()
}

fn check_fresh(scope: &HashMap<String, Var>, name: &str) -> Result<(), IrError> {
    if scope.contains_key(name) {
        return Err(IrError::scope(
            dummy_span(),
            format!("var '{name}' is bound more than once"),
        )
        .with_code(codes::E0300));
    }
    Ok(())
}

fn load_expr(scope: &HashMap<String, Var>, repr: &ExprRepr) -> Result<Expr, IrError> {
    let load_all = |items: &[ExprRepr]| {
        items
            .iter()
            .map(|e| load_expr(scope, e))
            .collect::<Result<Vec<_>, _>>()
    };
    Ok(match repr {
        ExprRepr::Var { name } => match scope.get(name) {
            Some(v) => Expr::var(v),
            None => {
                return Err(
                    IrError::scope(dummy_span(), format!("unknown var '{name}'"))
                        .with_code(codes::E0101),
                )
            }
        },
        ExprRepr::Call { op, args, attrs } => {
            Expr::call(CallTarget::Op(op.clone()), load_all(args)?, attrs.clone())
        }
        ExprRepr::CallFunc { func, args, attrs } => {
            Expr::call(CallTarget::Global(func.clone()), load_all(args)?, attrs.clone())
        }
        ExprRepr::Tuple { fields } => Expr::tuple(load_all(fields)?),
        ExprRepr::Shape { dims } => Expr::shape(dims.clone()),
        ExprRepr::Constant {
            shape,
            dtype,
            values,
        } => Expr::constant(shape.clone(), *dtype, values.clone()),
        ExprRepr::GlobalVar { name } => Expr::global_var(name.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ErrorKind;

    const MODULE: &str = r#"{
      "functions": [{
        "name": "main",
        "params": [{"name": "x", "struct_info": {"kind": "tensor", "shape": ["n", "4"], "dtype": "float32"}}],
        "blocks": [{
          "dataflow": true,
          "bindings": [
            {"var": "lv", "dataflow": true, "value": {"kind": "call", "op": "nn.relu", "args": [{"kind": "var", "name": "x"}]}},
            {"var": "gv", "value": {"kind": "call", "op": "reshape", "args": [
              {"kind": "var", "name": "lv"}, {"kind": "shape", "dims": ["-1", "2"]}]}}
          ]
        }],
        "outputs": [{"kind": "var", "name": "gv"}]
      }]
    }"#;

    #[test]
    fn load_infers_struct_info() {
        let m = from_json(MODULE).unwrap();
        let f = m.get("main").unwrap();
        let names: Vec<(&str, bool)> = f.bindings().map(|b| (b.var.name(), b.var.is_dataflow())).collect();
        assert_eq!(names, vec![("lv", true), ("gv", false)]);
        let gv = &f.blocks[0].bindings[1].var;
        assert_eq!(gv.struct_info().to_string(), "Tensor[(n * 2, 2), float32]");
    }

    #[test]
    fn dump_then_load_is_stable() {
        let m = from_json(MODULE).unwrap();
        let once = to_json_compact(&m).unwrap();
        let again = to_json_compact(&from_json(&once).unwrap()).unwrap();
        assert_eq!(once, again);
    }

    #[test]
    fn struct_info_repr_omits_derived_ndim() {
        let json = serde_json::to_string(&StructInfoRepr::from(&StructInfo::tensor_static(
            &[2],
            DataType::Int64,
        )))
        .unwrap();
        assert_eq!(json, r#"{"kind":"tensor","shape":["2"],"dtype":"int64"}"#);
        let rank_only = StructInfo::Tensor(TensorStructInfo::with_ndim(Some(3), None));
        let back: StructInfo = StructInfoRepr::from(&rank_only).into();
        assert_eq!(back, rank_only);
    }

    #[test]
    fn unknown_var_is_a_scope_error() {
        let text = MODULE.replace(r#""name": "lv"}, {"kind": "shape""#, r#""name": "nope"}, {"kind": "shape""#);
        match from_json(&text) {
            Err(LoadError::Ir(e)) => {
                assert_eq!(e.kind, ErrorKind::Scope);
                assert!(e.message().contains("unknown var 'nope'"));
            }
            other => panic!("expected scope error, got {other:?}"),
        }
    }

    #[test]
    fn escaping_dataflow_var_is_rejected() {
        let text = MODULE.replace(
            r#""outputs": [{"kind": "var", "name": "gv"}]"#,
            r#""outputs": [{"kind": "var", "name": "lv"}]"#,
        );
        assert!(matches!(from_json(&text), Err(LoadError::Ir(_))));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(from_json("{"), Err(LoadError::Json(_))));
    }
}
