// struct_info.rs — Structural type information for IR values
//
// `StructInfo` records what is statically known about a value: a tensor's
// rank, symbolic shape and element type, the component layout of a tuple,
// or the contents of a shape value. Every component may be unknown.
//
// Preconditions: none (types only).
// Postconditions: a `TensorStructInfo` with a known shape always reports
//   `ndim == shape.len()`.
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dim::{fmt_shape, PrimExpr};

// ── Element type ────────────────────────────────────────────────────────────

/// Tensor element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    Float16,
    Float32,
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 9] = [
        DataType::Bool,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt8,
        DataType::Float16,
        DataType::Float32,
        DataType::Float64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Storage size of one element in bytes.
    pub fn bytes(self) -> u64 {
        match self {
            DataType::Bool | DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::Float16 => 2,
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DataType::Float16 | DataType::Float32 | DataType::Float64
        )
    }

    pub fn is_int(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::UInt8
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognized dtype name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDataType(pub String);

impl fmt::Display for UnknownDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown data type '{}'", self.0)
    }
}

impl std::error::Error for UnknownDataType {}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| UnknownDataType(s.to_string()))
    }
}

impl TryFrom<String> for DataType {
    type Error = UnknownDataType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataType> for String {
    fn from(d: DataType) -> String {
        d.name().to_string()
    }
}

// ── Tensor ──────────────────────────────────────────────────────────────────

/// What is known about a tensor value.
///
/// Three levels of knowledge: full symbolic shape, rank only, or nothing.
/// The element type is tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorStructInfo {
    shape: Option<Vec<PrimExpr>>,
    dtype: Option<DataType>,
    ndim: Option<usize>,
}

impl TensorStructInfo {
    /// Tensor with a known shape.
    pub fn new(shape: Vec<PrimExpr>, dtype: Option<DataType>) -> Self {
        let ndim = Some(shape.len());
        TensorStructInfo {
            shape: Some(shape),
            dtype,
            ndim,
        }
    }

    /// Tensor whose shape is unknown; `ndim` may be known.
    pub fn with_ndim(ndim: Option<usize>, dtype: Option<DataType>) -> Self {
        TensorStructInfo {
            shape: None,
            dtype,
            ndim,
        }
    }

    /// Build from an optional shape, falling back to `ndim` when absent.
    pub fn from_parts(
        shape: Option<Vec<PrimExpr>>,
        ndim: Option<usize>,
        dtype: Option<DataType>,
    ) -> Self {
        match shape {
            Some(s) => TensorStructInfo::new(s, dtype),
            None => TensorStructInfo::with_ndim(ndim, dtype),
        }
    }

    pub fn shape(&self) -> Option<&[PrimExpr]> {
        self.shape.as_deref()
    }

    pub fn dtype(&self) -> Option<DataType> {
        self.dtype
    }

    pub fn ndim(&self) -> Option<usize> {
        self.ndim
    }

    pub fn is_unknown_ndim(&self) -> bool {
        self.ndim.is_none()
    }

    /// Same shape knowledge, different element type.
    pub fn with_dtype(&self, dtype: Option<DataType>) -> Self {
        TensorStructInfo {
            dtype,
            ..self.clone()
        }
    }

    /// Literal dims, when every dim is a literal integer.
    pub fn static_shape(&self) -> Option<Vec<i64>> {
        self.shape.as_ref()?.iter().map(PrimExpr::as_int).collect()
    }
}

impl fmt::Display for TensorStructInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dtype = self.dtype.map(|d| d.name()).unwrap_or("?");
        match (&self.shape, self.ndim) {
            (Some(shape), _) => write!(f, "Tensor[{}, {}]", fmt_shape(shape), dtype),
            (None, Some(n)) => write!(f, "Tensor[ndim={}, {}]", n, dtype),
            (None, None) => write!(f, "Tensor[ndim=?, {}]", dtype),
        }
    }
}

// ── StructInfo ──────────────────────────────────────────────────────────────

/// Structural type of any IR value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructInfo {
    Tensor(TensorStructInfo),
    Tuple(Vec<StructInfo>),
    /// A first-class shape value, e.g. the result of `shape_of`.
    Shape {
        values: Option<Vec<PrimExpr>>,
        ndim: Option<usize>,
    },
    /// Nothing is known; printed as `Object`.
    Unknown,
}

impl StructInfo {
    pub fn tensor(shape: Vec<PrimExpr>, dtype: DataType) -> Self {
        StructInfo::Tensor(TensorStructInfo::new(shape, Some(dtype)))
    }

    /// Tensor with literal dims.
    pub fn tensor_static(dims: &[i64], dtype: DataType) -> Self {
        StructInfo::tensor(dims.iter().copied().map(PrimExpr::Int).collect(), dtype)
    }

    pub fn shape(values: Vec<PrimExpr>) -> Self {
        let ndim = Some(values.len());
        StructInfo::Shape {
            values: Some(values),
            ndim,
        }
    }

    /// Category name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StructInfo::Tensor(_) => "Tensor",
            StructInfo::Tuple(_) => "Tuple",
            StructInfo::Shape { .. } => "Shape",
            StructInfo::Unknown => "Object",
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorStructInfo> {
        match self {
            StructInfo::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Shape values carried by a `Shape` struct info.
    pub fn shape_values(&self) -> Option<&[PrimExpr]> {
        match self {
            StructInfo::Shape {
                values: Some(v), ..
            } => Some(v),
            _ => None,
        }
    }
}

impl From<TensorStructInfo> for StructInfo {
    fn from(t: TensorStructInfo) -> Self {
        StructInfo::Tensor(t)
    }
}

impl fmt::Display for StructInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructInfo::Tensor(t) => write!(f, "{t}"),
            StructInfo::Tuple(fields) => {
                write!(f, "Tuple[")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "]")
            }
            StructInfo::Shape {
                values: Some(v), ..
            } => write!(f, "Shape[{}]", fmt_shape(v)),
            StructInfo::Shape {
                values: None,
                ndim: Some(n),
            } => write!(f, "Shape[ndim={n}]"),
            StructInfo::Shape {
                values: None,
                ndim: None,
            } => write!(f, "Shape[ndim=?]"),
            StructInfo::Unknown => write!(f, "Object"),
        }
    }
}
