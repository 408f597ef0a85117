// Expression node types for the tensor IR.
//
// Expressions are immutable trees shared through `Arc`. A rewrite never
// mutates a node; it builds a new one and reuses unchanged children, so
// `Expr::same_as` (pointer identity) tells a pass whether anything changed.
// Every node carries a `SimpleSpan` for error reporting.
//
// Preconditions: none.
// Postconditions: a `Var` keeps its struct info for its whole lifetime.
// Failure modes: none (data-only module).
// Side effects: `Var::new` draws a fresh id from the global counter.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chumsky::span::SimpleSpan;
use serde::{Deserialize, Serialize};

use crate::dim::{fmt_shape, PrimExpr};
use crate::id::VarId;
use crate::struct_info::{DataType, StructInfo};

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Span for nodes with no source location.
pub fn dummy_span() -> Span {
    (0..0).into()
}

// ── Variables ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct VarNode {
    pub id: VarId,
    pub name: String,
    pub struct_info: StructInfo,
    pub is_dataflow: bool,
}

/// A bound variable. Equality and hashing go by id, never by name.
#[derive(Debug, Clone)]
pub struct Var(Arc<VarNode>);

impl Var {
    pub fn new(name: impl Into<String>, struct_info: StructInfo, is_dataflow: bool) -> Self {
        Var(Arc::new(VarNode {
            id: VarId::fresh(),
            name: name.into(),
            struct_info,
            is_dataflow,
        }))
    }

    pub fn id(&self) -> VarId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn struct_info(&self) -> &StructInfo {
        &self.0.struct_info
    }

    /// True for a var private to the dataflow block that bound it.
    pub fn is_dataflow(&self) -> bool {
        self.0.is_dataflow
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

// ── Attributes ──────────────────────────────────────────────────────────────

/// A single operator attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ints(Vec<i64>),
    #[serde(rename = "dtype")]
    DType(DataType),
    Dims(Vec<PrimExpr>),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v:?}"),
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Str(s) => write!(f, "{s:?}"),
            AttrValue::Ints(vs) => {
                let parts: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            AttrValue::DType(d) => write!(f, "{d}"),
            AttrValue::Dims(ds) => write!(f, "{}", fmt_shape(ds)),
        }
    }
}

/// Operator attributes, ordered by key for deterministic printing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs(BTreeMap<String, AttrValue>);

impl Attrs {
    pub fn new() -> Self {
        Attrs::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }
}

// ── Expressions ─────────────────────────────────────────────────────────────

/// What a call invokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// A registered operator, e.g. `add` or `nn.relu`.
    Op(String),
    /// A function of the enclosing module.
    Global(String),
}

impl CallTarget {
    pub fn name(&self) -> &str {
        match self {
            CallTarget::Op(name) | CallTarget::Global(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub target: CallTarget,
    pub args: Vec<Expr>,
    pub attrs: Attrs,
}

impl Call {
    /// Name of the invoked operator, or `None` for a call to a module function.
    pub fn op_name(&self) -> Option<&str> {
        match &self.target {
            CallTarget::Op(name) => Some(name),
            CallTarget::Global(_) => None,
        }
    }
}

/// A literal tensor. Only its type matters to the core; values ride along.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub shape: Vec<i64>,
    pub dtype: DataType,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Var(Var),
    DataflowVar(Var),
    Call(Call),
    Tuple(Vec<Expr>),
    ShapeExpr(Vec<PrimExpr>),
    Constant(Constant),
    /// By-name reference to a module function or kernel.
    GlobalVar(String),
}

#[derive(Debug)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub span: Span,
    /// Filled in by normalization; `None` until then.
    pub struct_info: Option<StructInfo>,
}

/// Shared, immutable expression.
#[derive(Debug, Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr(Arc::new(ExprNode {
            kind,
            span,
            struct_info: None,
        }))
    }

    /// Reference to a bound var. The node kind follows the var's class.
    pub fn var(v: &Var) -> Self {
        let kind = if v.is_dataflow() {
            ExprKind::DataflowVar(v.clone())
        } else {
            ExprKind::Var(v.clone())
        };
        Expr(Arc::new(ExprNode {
            kind,
            span: dummy_span(),
            struct_info: Some(v.struct_info().clone()),
        }))
    }

    pub fn call(target: CallTarget, args: Vec<Expr>, attrs: Attrs) -> Self {
        Expr::new(
            ExprKind::Call(Call {
                target,
                args,
                attrs,
            }),
            dummy_span(),
        )
    }

    pub fn call_op(op: &str, args: Vec<Expr>, attrs: Attrs) -> Self {
        Expr::call(CallTarget::Op(op.to_string()), args, attrs)
    }

    pub fn tuple(fields: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Tuple(fields), dummy_span())
    }

    pub fn shape(dims: Vec<PrimExpr>) -> Self {
        Expr::new(ExprKind::ShapeExpr(dims), dummy_span())
    }

    pub fn constant(shape: Vec<i64>, dtype: DataType, values: Vec<f64>) -> Self {
        Expr::new(
            ExprKind::Constant(Constant {
                shape,
                dtype,
                values,
            }),
            dummy_span(),
        )
    }

    pub fn global_var(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::GlobalVar(name.into()), dummy_span())
    }

    /// Same node with a different span.
    pub fn with_span(&self, span: Span) -> Self {
        Expr(Arc::new(ExprNode {
            kind: self.0.kind.clone(),
            span,
            struct_info: self.0.struct_info.clone(),
        }))
    }

    /// Same node with struct info attached.
    pub fn with_struct_info(&self, struct_info: StructInfo) -> Self {
        Expr(Arc::new(ExprNode {
            kind: self.0.kind.clone(),
            span: self.0.span,
            struct_info: Some(struct_info),
        }))
    }

    /// New node of a different kind that keeps this node's span.
    pub fn rebuild(&self, kind: ExprKind) -> Self {
        Expr::new(kind, self.0.span)
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn span(&self) -> Span {
        self.0.span
    }

    pub fn struct_info(&self) -> Option<&StructInfo> {
        self.0.struct_info.as_ref()
    }

    /// Pointer identity.
    pub fn same_as(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The bound var if this is a `Var` or `DataflowVar` reference.
    pub fn as_var(&self) -> Option<&Var> {
        match &self.0.kind {
            ExprKind::Var(v) | ExprKind::DataflowVar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.0.kind {
            ExprKind::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn global_name(&self) -> Option<&str> {
        match &self.0.kind {
            ExprKind::GlobalVar(name) => Some(name),
            _ => None,
        }
    }

    /// Vars, constants, global references and shape literals.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self.0.kind,
            ExprKind::Var(_)
                | ExprKind::DataflowVar(_)
                | ExprKind::Constant(_)
                | ExprKind::GlobalVar(_)
                | ExprKind::ShapeExpr(_)
        )
    }
}

impl From<&Var> for Expr {
    fn from(v: &Var) -> Self {
        Expr::var(v)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            ExprKind::Var(v) | ExprKind::DataflowVar(v) => write!(f, "{v}"),
            ExprKind::GlobalVar(name) => write!(f, "@{name}"),
            ExprKind::ShapeExpr(dims) => write!(f, "shape{}", fmt_shape(dims)),
            ExprKind::Constant(c) => write!(
                f,
                "const[{}, {}]",
                fmt_shape(&c.shape.iter().copied().map(PrimExpr::Int).collect::<Vec<_>>()),
                c.dtype
            ),
            ExprKind::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            ExprKind::Call(call) => {
                match &call.target {
                    CallTarget::Op(name) => write!(f, "{name}(")?,
                    CallTarget::Global(name) => write!(f, "@{name}(")?,
                }
                let mut first = true;
                for arg in &call.args {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{arg}")?;
                }
                for (key, value) in call.attrs.iter() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{key}={value}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_identity_not_name() {
        let a = Var::new("x", StructInfo::Unknown, false);
        let b = Var::new("x", StructInfo::Unknown, false);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn var_expr_kind_follows_class() {
        let dv = Var::new("lv", StructInfo::Unknown, true);
        assert!(matches!(Expr::var(&dv).kind(), ExprKind::DataflowVar(_)));
        let v = Var::new("gv", StructInfo::Unknown, false);
        assert!(matches!(Expr::var(&v).kind(), ExprKind::Var(_)));
        assert!(Expr::var(&v).struct_info().is_some());
    }

    #[test]
    fn same_as_is_pointer_identity() {
        let e = Expr::tuple(vec![]);
        assert!(e.same_as(&e.clone()));
        assert!(!e.same_as(&Expr::tuple(vec![])));
        assert!(!e.same_as(&e.with_struct_info(StructInfo::Tuple(vec![]))));
    }

    #[test]
    fn display_call_with_attrs() {
        let x = Var::new("x", StructInfo::Unknown, false);
        let e = Expr::call_op(
            "sum",
            vec![Expr::var(&x)],
            Attrs::new()
                .with("keepdims", AttrValue::Bool(true))
                .with("axis", AttrValue::Ints(vec![1, -1])),
        );
        assert_eq!(e.to_string(), "sum(x, axis=[1, -1], keepdims=true)");
    }

    #[test]
    fn display_leaves() {
        assert_eq!(Expr::global_var("reshape1").to_string(), "@reshape1");
        assert_eq!(
            Expr::shape(vec![PrimExpr::var("n"), 4.into()]).to_string(),
            "shape(n, 4)"
        );
        assert_eq!(
            Expr::constant(vec![], DataType::Float32, vec![1.0]).to_string(),
            "const[(), float32]"
        );
        let x = Var::new("x", StructInfo::Unknown, false);
        assert_eq!(Expr::tuple(vec![Expr::var(&x)]).to_string(), "(x,)");
    }

    #[test]
    fn attrs_serialize_tagged() {
        let attrs = Attrs::new().with("dtype", AttrValue::DType(DataType::Float16));
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"dtype":{"type":"dtype","value":"float16"}}"#);
        let back: Attrs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
